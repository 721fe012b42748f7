/// 计算资源池数据模型

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::PoolStatistics;

/// 创建/修改计算资源池的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputePoolConfig {
    pub name: String,
    /// 绑定的共享存储池
    #[serde(default)]
    pub storage: Option<String>,
    /// 绑定的地址池
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub failover: bool,
}

/// 计算资源池
#[derive(Debug, Clone)]
pub struct ComputePool {
    pub name: String,
    pub enabled: bool,
    pub storage: Option<String>,
    pub network: Option<String>,
    pub failover: bool,
    /// 成员节点名称
    pub cells: BTreeSet<String>,
    /// 云主机名称 -> 云主机 ID
    pub instance_names: HashMap<String, String>,
    pub statistics: PoolStatistics,
}

impl ComputePool {
    pub fn new(config: ComputePoolConfig) -> Self {
        Self {
            name: config.name,
            enabled: true,
            storage: config.storage,
            network: config.network,
            failover: config.failover,
            cells: BTreeSet::new(),
            instance_names: HashMap::new(),
            statistics: PoolStatistics::default(),
        }
    }

    pub fn config(&self) -> ComputePoolConfig {
        ComputePoolConfig {
            name: self.name.clone(),
            storage: self.storage.clone(),
            network: self.network.clone(),
            failover: self.failover,
        }
    }

    pub fn info(&self) -> ComputePoolInfo {
        ComputePoolInfo {
            name: self.name.clone(),
            enabled: self.enabled,
            storage: self.storage.clone(),
            network: self.network.clone(),
            failover: self.failover,
            cells: self.cells.len(),
            instances: self.instance_names.len(),
        }
    }
}

/// 计算资源池视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputePoolInfo {
    pub name: String,
    pub enabled: bool,
    pub storage: Option<String>,
    pub network: Option<String>,
    pub failover: bool,
    pub cells: usize,
    pub instances: usize,
}

/// 计算资源池状态（含统计）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputePoolStatus {
    #[serde(flatten)]
    pub info: ComputePoolInfo,
    pub statistics: PoolStatistics,
}
