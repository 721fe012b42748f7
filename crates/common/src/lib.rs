/// Zone Resource Manager - 公共库
/// 
/// 提供资源管理器与外部执行组件共享的类型、错误处理、工具函数等

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
