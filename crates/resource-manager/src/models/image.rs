/// 镜像服务器数据模型

use serde::{Deserialize, Serialize};

/// 镜像服务器（由镜像服务启动时注册，不持久化）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageServer {
    pub name: String,
    pub host: String,
    pub port: u16,
}
