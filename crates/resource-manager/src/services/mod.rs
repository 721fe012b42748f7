/// 资源管理业务逻辑
///
/// 每个模块为 ResourceState 实现一组操作，由命令处理协程串行调用

mod batch_service;
mod cell_service;
mod image_service;
mod instance_service;
mod migration_service;
mod network_service;
mod pool_service;
mod status_service;
mod storage_service;
mod template_service;
