/// 云主机数据模型

use chrono::{DateTime, Utc};
use common::models::CpuPriority;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// 云主机 QoS 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceQos {
    pub cpu_priority: CpuPriority,
    /// 磁盘读写限速（字节/秒），0 表示不限制
    pub read_speed: u64,
    pub write_speed: u64,
    pub read_iops: u64,
    pub write_iops: u64,
    /// 网络收发限速（字节/秒），0 表示不限制
    pub receive_speed: u64,
    pub send_speed: u64,
}

/// 云主机网络与监控信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNetwork {
    pub monitor_address: String,
    pub monitor_port: u32,
    pub monitor_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_address: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_address: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethernet_address: Option<String>,
}

/// 创建云主机的请求参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub user: String,
    pub group: String,
    pub cores: u32,
    /// 内存（字节）
    pub memory: u64,
    /// 磁盘容量（字节），首个为系统盘
    pub disks: Vec<u64>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub qos: InstanceQos,
}

/// 云主机
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub pool: String,
    pub cell: String,
    pub user: String,
    pub group: String,
    pub cores: u32,
    pub memory: u64,
    pub disks: Vec<u64>,
    pub auto_start: bool,
    pub template: Option<String>,
    pub created: bool,
    pub running: bool,
    pub lost: bool,
    pub migrating: bool,
    /// 创建进度（0-100）
    pub progress: u32,
    pub network: InstanceNetwork,
    pub qos: InstanceQos,
    pub create_time: DateTime<Utc>,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        pool: impl Into<String>,
        cell: impl Into<String>,
        config: InstanceConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: config.name,
            pool: pool.into(),
            cell: cell.into(),
            user: config.user,
            group: config.group,
            cores: config.cores,
            memory: config.memory,
            disks: config.disks,
            auto_start: config.auto_start,
            template: config.template,
            created: false,
            running: false,
            lost: false,
            migrating: false,
            progress: 0,
            network: InstanceNetwork::default(),
            qos: config.qos,
            create_time: now,
        }
    }

    pub fn total_disk(&self) -> u64 {
        self.disks.iter().sum()
    }
}

/// 节点重新连接后上报的云主机信息，用于重建内存状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    pub id: String,
    pub name: String,
    pub user: String,
    pub group: String,
    pub cores: u32,
    pub memory: u64,
    pub disks: Vec<u64>,
    pub running: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub monitor_port: u32,
    #[serde(default)]
    pub monitor_secret: String,
    #[serde(default)]
    pub internal_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub external_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub ethernet_address: Option<String>,
    #[serde(default)]
    pub qos: InstanceQos,
}

impl InstanceReport {
    /// 转换为已确认的云主机
    pub fn into_instance(self, pool: &str, cell: &str, cell_address: &str, now: DateTime<Utc>) -> Instance {
        let config = InstanceConfig {
            name: self.name,
            user: self.user,
            group: self.group,
            cores: self.cores,
            memory: self.memory,
            disks: self.disks,
            auto_start: self.auto_start,
            template: None,
            qos: self.qos,
        };
        let mut instance = Instance::new(self.id, pool, cell, config, now);
        instance.created = true;
        instance.running = self.running;
        instance.progress = 100;
        instance.network = InstanceNetwork {
            monitor_address: cell_address.to_string(),
            monitor_port: self.monitor_port,
            monitor_secret: self.monitor_secret,
            internal_address: self.internal_address,
            external_address: self.external_address,
            ethernet_address: self.ethernet_address,
        };
        instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InstanceConfig {
        InstanceConfig {
            name: "vm-1".into(),
            user: "admin".into(),
            group: "ops".into(),
            cores: 2,
            memory: 2 << 30,
            disks: vec![10 << 30, 20 << 30],
            auto_start: false,
            template: None,
            qos: InstanceQos::default(),
        }
    }

    #[test]
    fn test_new_instance_is_pending() {
        let instance = Instance::new("id-1", "default", "cell-1", config(), Utc::now());
        assert!(!instance.created);
        assert!(!instance.running);
        assert_eq!(instance.progress, 0);
        assert_eq!(instance.total_disk(), 30 << 30);
        assert_eq!(instance.qos.cpu_priority, CpuPriority::Medium);
    }

    #[test]
    fn test_report_into_instance() {
        let report = InstanceReport {
            id: "id-2".into(),
            name: "vm-2".into(),
            user: "admin".into(),
            group: "ops".into(),
            cores: 1,
            memory: 1 << 30,
            disks: vec![5 << 30],
            running: true,
            auto_start: false,
            monitor_port: 5901,
            monitor_secret: "secret".into(),
            internal_address: Some(Ipv4Addr::new(10, 0, 0, 5)),
            external_address: None,
            ethernet_address: None,
            qos: InstanceQos::default(),
        };
        let instance = report.into_instance("default", "cell-1", "192.168.1.10", Utc::now());
        assert!(instance.created);
        assert!(instance.running);
        assert_eq!(instance.network.monitor_address, "192.168.1.10");
        assert_eq!(instance.network.monitor_port, 5901);
    }
}
