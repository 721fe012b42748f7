/// Zone Resource Manager
///
/// 可用区资源管理核心：计算资源池、资源节点、云主机、地址池、存储池、
/// 迁移与批量任务的状态管理和调度

pub mod config;
pub mod manager;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod state;

mod ipam;
mod services;

pub use config::Config;
pub use manager::{ResourceManager, ResourceManagerHandle};
pub use persistence::Persistence;
pub use state::ResourceState;
