/// 资源用量与统计数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Instance;

/// 资源节点上报的资源用量快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// 物理核心数
    pub cores: u32,
    /// CPU 使用率（百分比）
    pub cpu_usage: f64,
    /// 内存总量（字节）
    pub memory: u64,
    pub memory_available: u64,
    /// 磁盘总量（字节）
    pub disk: u64,
    pub disk_available: u64,

    // 吞吐速率（字节/秒）
    pub read_speed: u64,
    pub write_speed: u64,
    pub receive_speed: u64,
    pub send_speed: u64,

    // 累计流量（字节）
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

impl ResourceUsage {
    /// 按当前 CPU 使用率折算后的可用核心数
    pub fn available_cores(&self) -> f64 {
        let idle = (100.0 - self.cpu_usage).clamp(0.0, 100.0) / 100.0;
        self.cores as f64 * idle
    }
}

/// 云主机状态计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub stopped: u32,
    pub running: u32,
    pub lost: u32,
    pub migrating: u32,
}

impl InstanceStatistics {
    /// 计入一台云主机
    pub fn record(&mut self, instance: &Instance) {
        if instance.lost {
            self.lost += 1;
        } else if instance.migrating {
            self.migrating += 1;
        } else if instance.running {
            self.running += 1;
        } else {
            self.stopped += 1;
        }
    }

    pub fn merge(&mut self, other: &InstanceStatistics) {
        self.stopped += other.stopped;
        self.running += other.running;
        self.lost += other.lost;
        self.migrating += other.migrating;
    }

    pub fn total(&self) -> u32 {
        self.stopped + self.running + self.lost + self.migrating
    }
}

/// 多个资源节点累加后的资源汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub cores: u64,
    /// 已使用核心数（按使用率折算）
    pub used_cores: f64,
    pub memory: u64,
    pub memory_available: u64,
    pub disk: u64,
    pub disk_available: u64,
    pub read_speed: u64,
    pub write_speed: u64,
    pub receive_speed: u64,
    pub send_speed: u64,
}

impl ResourceSummary {
    pub fn fold(&mut self, usage: &ResourceUsage) {
        self.cores += u64::from(usage.cores);
        self.used_cores += usage.cores as f64 - usage.available_cores();
        self.memory += usage.memory;
        self.memory_available += usage.memory_available;
        self.disk += usage.disk;
        self.disk_available += usage.disk_available;
        self.read_speed += usage.read_speed;
        self.write_speed += usage.write_speed;
        self.receive_speed += usage.receive_speed;
        self.send_speed += usage.send_speed;
    }

    pub fn merge(&mut self, other: &ResourceSummary) {
        self.cores += other.cores;
        self.used_cores += other.used_cores;
        self.memory += other.memory;
        self.memory_available += other.memory_available;
        self.disk += other.disk;
        self.disk_available += other.disk_available;
        self.read_speed += other.read_speed;
        self.write_speed += other.write_speed;
        self.receive_speed += other.receive_speed;
        self.send_speed += other.send_speed;
    }

    /// 加权平均 CPU 使用率
    pub fn cpu_usage(&self) -> f64 {
        if self.cores == 0 {
            return 0.0;
        }
        self.used_cores / self.cores as f64 * 100.0
    }
}

/// 计算资源池统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub online_cells: u32,
    pub offline_cells: u32,
    pub instances: InstanceStatistics,
    pub resources: ResourceSummary,
}

impl PoolStatistics {
    pub fn reset(&mut self) {
        *self = PoolStatistics::default();
    }
}

/// 整个可用区的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatistics {
    pub name: String,
    pub enabled_pools: u32,
    pub disabled_pools: u32,
    pub online_cells: u32,
    pub offline_cells: u32,
    pub instances: InstanceStatistics,
    pub resources: ResourceSummary,
    pub start_time: DateTime<Utc>,
}

impl ZoneStatistics {
    pub fn new(name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            enabled_pools: 0,
            disabled_pools: 0,
            online_cells: 0,
            offline_cells: 0,
            instances: InstanceStatistics::default(),
            resources: ResourceSummary::default(),
            start_time,
        }
    }

    /// 清空计数，保留名称和启动时间
    pub fn reset(&mut self) {
        let name = std::mem::take(&mut self.name);
        *self = ZoneStatistics::new(name, self.start_time);
    }

    pub fn merge(&mut self, pool: &PoolStatistics) {
        self.online_cells += pool.online_cells;
        self.offline_cells += pool.offline_cells;
        self.instances.merge(&pool.instances);
        self.resources.merge(&pool.resources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_cores() {
        let usage = ResourceUsage {
            cores: 8,
            cpu_usage: 25.0,
            ..Default::default()
        };
        assert!((usage.available_cores() - 6.0).abs() < f64::EPSILON);

        let overloaded = ResourceUsage {
            cores: 8,
            cpu_usage: 120.0,
            ..Default::default()
        };
        assert_eq!(overloaded.available_cores(), 0.0);
    }

    #[test]
    fn test_summary_cpu_usage() {
        let mut summary = ResourceSummary::default();
        summary.fold(&ResourceUsage { cores: 4, cpu_usage: 50.0, ..Default::default() });
        summary.fold(&ResourceUsage { cores: 4, cpu_usage: 0.0, ..Default::default() });
        assert_eq!(summary.cores, 8);
        assert!((summary.cpu_usage() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zone_reset_keeps_identity() {
        let start = Utc::now();
        let mut zone = ZoneStatistics::new("zone-a", start);
        zone.online_cells = 3;
        zone.enabled_pools = 2;
        zone.reset();
        assert_eq!(zone.name, "zone-a");
        assert_eq!(zone.start_time, start);
        assert_eq!(zone.online_cells, 0);
        assert_eq!(zone.enabled_pools, 0);
    }
}
