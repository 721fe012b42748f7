/// 迁移任务数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 创建迁移任务的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationParameter {
    pub source_pool: String,
    pub source_cell: String,
    pub target_pool: String,
    pub target_cell: String,
    /// 为空时迁移源节点上的全部云主机
    #[serde(default)]
    pub instances: Vec<String>,
}

/// 迁移任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    pub source_pool: String,
    pub source_cell: String,
    pub target_pool: String,
    pub target_cell: String,
    pub instances: Vec<String>,
    pub finished: bool,
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub create_time: DateTime<Utc>,
    pub latest_update: DateTime<Utc>,
}

/// 节点失联后的故障切换计划
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverPlan {
    pub cell: String,
    pub pool: String,
    /// 目标节点 -> 待迁入的云主机 ID
    pub targets: BTreeMap<String, Vec<String>>,
    /// 未启用故障切换时被标记为丢失的云主机
    pub lost: Vec<String>,
}

impl FailoverPlan {
    pub fn planned_instances(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }
}
