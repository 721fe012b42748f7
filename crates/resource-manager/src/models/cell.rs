/// 资源节点数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{InstanceStatistics, ResourceUsage};

/// 资源节点（宿主机）
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: String,
    /// 节点通信地址
    pub address: String,
    pub enabled: bool,
    pub alive: bool,
    /// 已禁用，等待迁出全部云主机
    pub purge_appending: bool,
    /// 所属计算资源池，空字符串表示未分配
    pub pool: String,
    pub latest_update: DateTime<Utc>,
    /// 已确认的云主机 ID
    pub instances: BTreeSet<String>,
    /// 已分配但尚未确认的云主机 ID
    pub pending_instances: BTreeSet<String>,
    pub usage: ResourceUsage,
}

impl Cell {
    pub fn new(name: impl Into<String>, address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            enabled: true,
            alive: true,
            purge_appending: false,
            pool: String::new(),
            latest_update: now,
            instances: BTreeSet::new(),
            pending_instances: BTreeSet::new(),
            usage: ResourceUsage::default(),
        }
    }

    /// 从持久化数据恢复的节点，等待节点重新注册后才在线
    pub fn restored(name: impl Into<String>, pool: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut cell = Cell::new(name, String::new(), now);
        cell.alive = false;
        cell.pool = pool.into();
        cell
    }

    pub fn is_allocated(&self) -> bool {
        !self.pool.is_empty()
    }

    /// 在线且已启用，可承载新的云主机
    pub fn is_available(&self) -> bool {
        self.alive && self.enabled
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.pending_instances.is_empty()
    }

    pub fn hosts(&self, instance_id: &str) -> bool {
        self.instances.contains(instance_id) || self.pending_instances.contains(instance_id)
    }

    /// 从节点上移除云主机（无论是否已确认）
    pub fn detach(&mut self, instance_id: &str) -> bool {
        let confirmed = self.instances.remove(instance_id);
        let pending = self.pending_instances.remove(instance_id);
        confirmed || pending
    }

    /// 节点上的全部云主机 ID（已确认在前）
    pub fn all_instances(&self) -> Vec<String> {
        self.instances
            .iter()
            .chain(self.pending_instances.iter())
            .cloned()
            .collect()
    }
}

/// 节点状态上报
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellStatusReport {
    pub name: String,
    #[serde(flatten)]
    pub usage: ResourceUsage,
}

/// 节点状态视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellStatus {
    pub name: String,
    pub address: String,
    pub pool: String,
    pub enabled: bool,
    pub alive: bool,
    pub purge_appending: bool,
    pub latest_update: DateTime<Utc>,
    pub instances: InstanceStatistics,
    pub pending_instances: usize,
    pub usage: ResourceUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cell_is_unallocated() {
        let cell = Cell::new("cell-1", "192.168.1.10", Utc::now());
        assert!(!cell.is_allocated());
        assert!(cell.is_available());
        assert!(cell.is_empty());
    }

    #[test]
    fn test_restored_cell_waits_for_registration() {
        let cell = Cell::restored("cell-1", "default", Utc::now());
        assert!(cell.is_allocated());
        assert!(!cell.alive);
        assert!(!cell.is_available());
    }

    #[test]
    fn test_detach() {
        let mut cell = Cell::new("cell-1", "", Utc::now());
        cell.instances.insert("a".into());
        cell.pending_instances.insert("b".into());
        assert_eq!(cell.all_instances(), vec!["a".to_string(), "b".to_string()]);
        assert!(cell.detach("b"));
        assert!(!cell.detach("b"));
        assert!(cell.hosts("a"));
        assert!(!cell.hosts("b"));
    }
}
