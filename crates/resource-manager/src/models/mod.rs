/// 资源管理器数据模型

mod address;
mod batch;
mod cell;
mod image;
mod instance;
mod migration;
mod pool;
mod statistics;
mod storage;
mod template;

pub use address::*;
pub use batch::*;
pub use cell::*;
pub use image::*;
pub use instance::*;
pub use migration::*;
pub use pool::*;
pub use statistics::*;
pub use storage::*;
pub use template::*;
