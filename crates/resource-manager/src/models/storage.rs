/// 共享存储池数据模型

use common::models::StorageType;
use serde::{Deserialize, Serialize};

/// 共享存储池
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub host: String,
    /// 远端导出路径
    pub target: String,
}
