/// 资源管理器命令
///
/// 每个命令携带请求参数和一个用于返回结果的 oneshot 通道

use common::models::{AddressRangeType, CpuPriority};
use common::Result;
use std::net::Ipv4Addr;
use tokio::sync::oneshot;

use crate::models::*;
use crate::scheduler::ResourceRequirement;

pub type Reply<T> = oneshot::Sender<Result<T>>;

pub enum Command {
    // 计算资源池
    CreatePool { config: ComputePoolConfig, reply: Reply<()> },
    ModifyPool { config: ComputePoolConfig, reply: Reply<()> },
    DeletePool { name: String, reply: Reply<()> },
    EnablePool { name: String, reply: Reply<()> },
    DisablePool { name: String, reply: Reply<()> },
    QueryPools { reply: Reply<Vec<ComputePoolInfo>> },
    GetPool { name: String, reply: Reply<ComputePoolInfo> },
    QueryPoolStatus { reply: Reply<Vec<ComputePoolStatus>> },
    GetPoolStatus { name: String, reply: Reply<ComputePoolStatus> },

    // 存储池
    CreateStoragePool { config: StoragePool, reply: Reply<()> },
    ModifyStoragePool { config: StoragePool, reply: Reply<()> },
    DeleteStoragePool { name: String, reply: Reply<()> },
    QueryStoragePools { reply: Reply<Vec<StoragePool>> },
    GetStoragePool { name: String, reply: Reply<StoragePool> },

    // 地址池
    CreateAddressPool { name: String, config: AddressPoolConfig, reply: Reply<()> },
    ModifyAddressPool { name: String, config: AddressPoolConfig, reply: Reply<()> },
    DeleteAddressPool { name: String, reply: Reply<()> },
    QueryAddressPools { reply: Reply<Vec<AddressPoolStatus>> },
    GetAddressPool { name: String, reply: Reply<AddressPoolDetail> },
    QueryAddressRanges { pool: String, range_type: AddressRangeType, reply: Reply<Vec<AddressRangeStatus>> },
    GetAddressRange { pool: String, range_type: AddressRangeType, start: Ipv4Addr, reply: Reply<AddressRangeStatus> },
    AddAddressRange { pool: String, range_type: AddressRangeType, config: AddressRangeConfig, reply: Reply<()> },
    RemoveAddressRange { pool: String, range_type: AddressRangeType, start: Ipv4Addr, reply: Reply<()> },

    // 资源节点
    RegisterCell { name: String, address: String, reply: Reply<()> },
    QueryUnallocatedCells { reply: Reply<Vec<CellStatus>> },
    AddCell { pool: String, cell: String, reply: Reply<()> },
    RemoveCell { pool: String, cell: String, reply: Reply<()> },
    QueryCells { pool: String, reply: Reply<Vec<CellStatus>> },
    GetCellStatus { name: String, reply: Reply<CellStatus> },
    EnableCell { name: String, reply: Reply<()> },
    DisableCell { name: String, purge: bool, reply: Reply<()> },
    FinishPurgeCell { name: String, reply: Reply<()> },
    SetCellDead { name: String, reply: Reply<()> },
    UpdateCellStatus { report: CellStatusReport, reply: Reply<()> },
    SyncCellInstances { cell: String, reports: Vec<InstanceReport>, reply: Reply<usize> },
    SelectCell { pool: String, requirement: ResourceRequirement, must_fulfill: bool, reply: Reply<String> },

    // 云主机
    AllocateInstance { pool: String, config: InstanceConfig, reply: Reply<Instance> },
    ConfirmInstance {
        id: String,
        monitor_port: u32,
        monitor_secret: String,
        ethernet_address: Option<String>,
        reply: Reply<()>,
    },
    DeallocateInstance { id: String, error: Option<String>, reply: Reply<Instance> },
    UpdateInstanceStatus { id: String, running: bool, reply: Reply<()> },
    UpdateInstanceProgress { id: String, progress: u32, reply: Reply<()> },
    RenameInstance { id: String, name: String, reply: Reply<()> },
    UpdateInstancePriority { id: String, priority: CpuPriority, reply: Reply<()> },
    UpdateInstanceDiskThreshold {
        id: String,
        read_speed: u64,
        read_iops: u64,
        write_speed: u64,
        write_iops: u64,
        reply: Reply<()>,
    },
    UpdateInstanceNetworkThreshold { id: String, receive_speed: u64, send_speed: u64, reply: Reply<()> },
    UpdateInstanceMonitorSecret { id: String, secret: String, reply: Reply<()> },
    GetInstance { id: String, reply: Reply<Instance> },
    GetInstanceByName { pool: String, name: String, reply: Reply<Instance> },
    QueryInstancesInPool { pool: String, reply: Reply<Vec<Instance>> },
    QueryInstancesInCell { cell: String, reply: Reply<Vec<Instance>> },

    // 迁移与故障切换
    CreateMigration { param: MigrationParameter, reply: Reply<String> },
    FinishMigration { id: String, ports: Vec<u32>, reply: Reply<()> },
    CancelMigration { id: String, reason: Option<String>, reply: Reply<()> },
    UpdateMigrationProgress { id: String, progress: u32, reply: Reply<()> },
    GetMigration { id: String, reply: Reply<Migration> },
    QueryMigrations { reply: Reply<Vec<Migration>> },
    BuildFailoverPlan { cell: String, reply: Reply<FailoverPlan> },
    ExecuteFailover { source: String, target: String, instances: Vec<String>, ports: Vec<u32>, reply: Reply<()> },
    PurgeLostInstances { cell: String, reply: Reply<usize> },

    // 批量任务
    StartBatchCreate { pool: String, names: Vec<String>, reply: Reply<String> },
    SetBatchCreateGuestStart { batch: String, name: String, instance: String, reply: Reply<()> },
    SetBatchCreateGuestFail { batch: String, name: String, error: String, reply: Reply<()> },
    GetBatchCreateStatus { batch: String, reply: Reply<BatchTask> },
    StartBatchDelete { targets: Vec<BatchTarget>, reply: Reply<String> },
    SetBatchDeleteGuestSuccess { batch: String, instance: String, reply: Reply<()> },
    SetBatchDeleteGuestFail { batch: String, instance: String, error: String, reply: Reply<()> },
    GetBatchDeleteStatus { batch: String, reply: Reply<BatchTask> },
    StartBatchStop { targets: Vec<BatchTarget>, reply: Reply<String> },
    SetBatchStopGuestSuccess { batch: String, instance: String, reply: Reply<()> },
    SetBatchStopGuestFail { batch: String, instance: String, error: String, reply: Reply<()> },
    GetBatchStopStatus { batch: String, reply: Reply<BatchTask> },

    // 系统模板
    CreateTemplate { config: SystemTemplateConfig, reply: Reply<String> },
    ModifyTemplate { id: String, config: SystemTemplateConfig, reply: Reply<()> },
    DeleteTemplate { id: String, reply: Reply<()> },
    GetTemplate { id: String, reply: Reply<SystemTemplate> },
    QueryTemplates { reply: Reply<Vec<SystemTemplate>> },

    // 镜像服务器
    AddImageServer { name: String, host: String, port: u16, reply: Reply<()> },
    RemoveImageServer { name: String, reply: Reply<()> },
    GetImageServer { reply: Reply<ImageServer> },

    // 状态汇总
    GetZoneStatus { reply: Reply<ZoneStatistics> },
    UpdateStatistics { reply: Reply<Vec<String>> },
    SweepBatchTasks { reply: Reply<()> },
}

impl Command {
    /// 用于日志的命令名称
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreatePool { .. } => "create_pool",
            Command::ModifyPool { .. } => "modify_pool",
            Command::DeletePool { .. } => "delete_pool",
            Command::EnablePool { .. } => "enable_pool",
            Command::DisablePool { .. } => "disable_pool",
            Command::QueryPools { .. } => "query_pools",
            Command::GetPool { .. } => "get_pool",
            Command::QueryPoolStatus { .. } => "query_pool_status",
            Command::GetPoolStatus { .. } => "get_pool_status",
            Command::CreateStoragePool { .. } => "create_storage_pool",
            Command::ModifyStoragePool { .. } => "modify_storage_pool",
            Command::DeleteStoragePool { .. } => "delete_storage_pool",
            Command::QueryStoragePools { .. } => "query_storage_pools",
            Command::GetStoragePool { .. } => "get_storage_pool",
            Command::CreateAddressPool { .. } => "create_address_pool",
            Command::ModifyAddressPool { .. } => "modify_address_pool",
            Command::DeleteAddressPool { .. } => "delete_address_pool",
            Command::QueryAddressPools { .. } => "query_address_pools",
            Command::GetAddressPool { .. } => "get_address_pool",
            Command::QueryAddressRanges { .. } => "query_address_ranges",
            Command::GetAddressRange { .. } => "get_address_range",
            Command::AddAddressRange { .. } => "add_address_range",
            Command::RemoveAddressRange { .. } => "remove_address_range",
            Command::RegisterCell { .. } => "register_cell",
            Command::QueryUnallocatedCells { .. } => "query_unallocated_cells",
            Command::AddCell { .. } => "add_cell",
            Command::RemoveCell { .. } => "remove_cell",
            Command::QueryCells { .. } => "query_cells",
            Command::GetCellStatus { .. } => "get_cell_status",
            Command::EnableCell { .. } => "enable_cell",
            Command::DisableCell { .. } => "disable_cell",
            Command::FinishPurgeCell { .. } => "finish_purge_cell",
            Command::SetCellDead { .. } => "set_cell_dead",
            Command::UpdateCellStatus { .. } => "update_cell_status",
            Command::SyncCellInstances { .. } => "sync_cell_instances",
            Command::SelectCell { .. } => "select_cell",
            Command::AllocateInstance { .. } => "allocate_instance",
            Command::ConfirmInstance { .. } => "confirm_instance",
            Command::DeallocateInstance { .. } => "deallocate_instance",
            Command::UpdateInstanceStatus { .. } => "update_instance_status",
            Command::UpdateInstanceProgress { .. } => "update_instance_progress",
            Command::RenameInstance { .. } => "rename_instance",
            Command::UpdateInstancePriority { .. } => "update_instance_priority",
            Command::UpdateInstanceDiskThreshold { .. } => "update_instance_disk_threshold",
            Command::UpdateInstanceNetworkThreshold { .. } => "update_instance_network_threshold",
            Command::UpdateInstanceMonitorSecret { .. } => "update_instance_monitor_secret",
            Command::GetInstance { .. } => "get_instance",
            Command::GetInstanceByName { .. } => "get_instance_by_name",
            Command::QueryInstancesInPool { .. } => "query_instances_in_pool",
            Command::QueryInstancesInCell { .. } => "query_instances_in_cell",
            Command::CreateMigration { .. } => "create_migration",
            Command::FinishMigration { .. } => "finish_migration",
            Command::CancelMigration { .. } => "cancel_migration",
            Command::UpdateMigrationProgress { .. } => "update_migration_progress",
            Command::GetMigration { .. } => "get_migration",
            Command::QueryMigrations { .. } => "query_migrations",
            Command::BuildFailoverPlan { .. } => "build_failover_plan",
            Command::ExecuteFailover { .. } => "execute_failover",
            Command::PurgeLostInstances { .. } => "purge_lost_instances",
            Command::StartBatchCreate { .. } => "start_batch_create",
            Command::SetBatchCreateGuestStart { .. } => "set_batch_create_guest_start",
            Command::SetBatchCreateGuestFail { .. } => "set_batch_create_guest_fail",
            Command::GetBatchCreateStatus { .. } => "get_batch_create_status",
            Command::StartBatchDelete { .. } => "start_batch_delete",
            Command::SetBatchDeleteGuestSuccess { .. } => "set_batch_delete_guest_success",
            Command::SetBatchDeleteGuestFail { .. } => "set_batch_delete_guest_fail",
            Command::GetBatchDeleteStatus { .. } => "get_batch_delete_status",
            Command::StartBatchStop { .. } => "start_batch_stop",
            Command::SetBatchStopGuestSuccess { .. } => "set_batch_stop_guest_success",
            Command::SetBatchStopGuestFail { .. } => "set_batch_stop_guest_fail",
            Command::GetBatchStopStatus { .. } => "get_batch_stop_status",
            Command::CreateTemplate { .. } => "create_template",
            Command::ModifyTemplate { .. } => "modify_template",
            Command::DeleteTemplate { .. } => "delete_template",
            Command::GetTemplate { .. } => "get_template",
            Command::QueryTemplates { .. } => "query_templates",
            Command::AddImageServer { .. } => "add_image_server",
            Command::RemoveImageServer { .. } => "remove_image_server",
            Command::GetImageServer { .. } => "get_image_server",
            Command::GetZoneStatus { .. } => "get_zone_status",
            Command::UpdateStatistics { .. } => "update_statistics",
            Command::SweepBatchTasks { .. } => "sweep_batch_tasks",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        let (reply, _rx) = oneshot::channel();
        let command = Command::DisableCell {
            name: "cell-1".into(),
            purge: true,
            reply,
        };
        assert_eq!(command.name(), "disable_cell");

        let (reply, _rx) = oneshot::channel();
        assert_eq!(Command::QueryTemplates { reply }.name(), "query_templates");
    }
}
