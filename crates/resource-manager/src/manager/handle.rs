/// 资源管理器调用句柄
///
/// 句柄可以任意克隆，每次调用把命令放入队列并等待处理结果

use common::models::{AddressRangeType, CpuPriority};
use common::{Error, Result};
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, oneshot};

use super::command::{Command, Reply};
use crate::models::*;
use crate::scheduler::ResourceRequirement;

#[derive(Clone)]
pub struct ResourceManagerHandle {
    sender: mpsc::Sender<Command>,
}

impl ResourceManagerHandle {
    pub(crate) fn new(sender: mpsc::Sender<Command>) -> Self {
        Self { sender }
    }

    /// 发送命令并等待结果，队列已满时等待空位
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(build(tx)).await.is_err() {
            return Err(Error::Unavailable("资源管理器已停止".to_string()));
        }
        rx.await
            .map_err(|_| Error::Unavailable("资源管理器未返回结果".to_string()))?
    }

    // 计算资源池

    pub async fn create_pool(&self, config: ComputePoolConfig) -> Result<()> {
        self.call(|reply| Command::CreatePool { config, reply }).await
    }

    pub async fn modify_pool(&self, config: ComputePoolConfig) -> Result<()> {
        self.call(|reply| Command::ModifyPool { config, reply }).await
    }

    pub async fn delete_pool(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::DeletePool { name, reply }).await
    }

    pub async fn enable_pool(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::EnablePool { name, reply }).await
    }

    pub async fn disable_pool(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::DisablePool { name, reply }).await
    }

    pub async fn query_pools(&self) -> Result<Vec<ComputePoolInfo>> {
        self.call(|reply| Command::QueryPools { reply }).await
    }

    pub async fn get_pool(&self, name: impl Into<String>) -> Result<ComputePoolInfo> {
        let name = name.into();
        self.call(|reply| Command::GetPool { name, reply }).await
    }

    pub async fn query_pool_status(&self) -> Result<Vec<ComputePoolStatus>> {
        self.call(|reply| Command::QueryPoolStatus { reply }).await
    }

    pub async fn get_pool_status(&self, name: impl Into<String>) -> Result<ComputePoolStatus> {
        let name = name.into();
        self.call(|reply| Command::GetPoolStatus { name, reply }).await
    }

    // 存储池

    pub async fn create_storage_pool(&self, config: StoragePool) -> Result<()> {
        self.call(|reply| Command::CreateStoragePool { config, reply }).await
    }

    pub async fn modify_storage_pool(&self, config: StoragePool) -> Result<()> {
        self.call(|reply| Command::ModifyStoragePool { config, reply }).await
    }

    pub async fn delete_storage_pool(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::DeleteStoragePool { name, reply }).await
    }

    pub async fn query_storage_pools(&self) -> Result<Vec<StoragePool>> {
        self.call(|reply| Command::QueryStoragePools { reply }).await
    }

    pub async fn get_storage_pool(&self, name: impl Into<String>) -> Result<StoragePool> {
        let name = name.into();
        self.call(|reply| Command::GetStoragePool { name, reply }).await
    }

    // 地址池

    pub async fn create_address_pool(&self, name: impl Into<String>, config: AddressPoolConfig) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::CreateAddressPool { name, config, reply }).await
    }

    pub async fn modify_address_pool(&self, name: impl Into<String>, config: AddressPoolConfig) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::ModifyAddressPool { name, config, reply }).await
    }

    pub async fn delete_address_pool(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::DeleteAddressPool { name, reply }).await
    }

    pub async fn query_address_pools(&self) -> Result<Vec<AddressPoolStatus>> {
        self.call(|reply| Command::QueryAddressPools { reply }).await
    }

    pub async fn get_address_pool(&self, name: impl Into<String>) -> Result<AddressPoolDetail> {
        let name = name.into();
        self.call(|reply| Command::GetAddressPool { name, reply }).await
    }

    pub async fn query_address_ranges(
        &self,
        pool: impl Into<String>,
        range_type: AddressRangeType,
    ) -> Result<Vec<AddressRangeStatus>> {
        let pool = pool.into();
        self.call(|reply| Command::QueryAddressRanges { pool, range_type, reply }).await
    }

    pub async fn get_address_range(
        &self,
        pool: impl Into<String>,
        range_type: AddressRangeType,
        start: Ipv4Addr,
    ) -> Result<AddressRangeStatus> {
        let pool = pool.into();
        self.call(|reply| Command::GetAddressRange { pool, range_type, start, reply }).await
    }

    pub async fn add_address_range(
        &self,
        pool: impl Into<String>,
        range_type: AddressRangeType,
        config: AddressRangeConfig,
    ) -> Result<()> {
        let pool = pool.into();
        self.call(|reply| Command::AddAddressRange { pool, range_type, config, reply }).await
    }

    pub async fn remove_address_range(
        &self,
        pool: impl Into<String>,
        range_type: AddressRangeType,
        start: Ipv4Addr,
    ) -> Result<()> {
        let pool = pool.into();
        self.call(|reply| Command::RemoveAddressRange { pool, range_type, start, reply }).await
    }

    // 资源节点

    pub async fn register_cell(&self, name: impl Into<String>, address: impl Into<String>) -> Result<()> {
        let (name, address) = (name.into(), address.into());
        self.call(|reply| Command::RegisterCell { name, address, reply }).await
    }

    pub async fn query_unallocated_cells(&self) -> Result<Vec<CellStatus>> {
        self.call(|reply| Command::QueryUnallocatedCells { reply }).await
    }

    pub async fn add_cell(&self, pool: impl Into<String>, cell: impl Into<String>) -> Result<()> {
        let (pool, cell) = (pool.into(), cell.into());
        self.call(|reply| Command::AddCell { pool, cell, reply }).await
    }

    pub async fn remove_cell(&self, pool: impl Into<String>, cell: impl Into<String>) -> Result<()> {
        let (pool, cell) = (pool.into(), cell.into());
        self.call(|reply| Command::RemoveCell { pool, cell, reply }).await
    }

    pub async fn query_cells(&self, pool: impl Into<String>) -> Result<Vec<CellStatus>> {
        let pool = pool.into();
        self.call(|reply| Command::QueryCells { pool, reply }).await
    }

    pub async fn get_cell_status(&self, name: impl Into<String>) -> Result<CellStatus> {
        let name = name.into();
        self.call(|reply| Command::GetCellStatus { name, reply }).await
    }

    pub async fn enable_cell(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::EnableCell { name, reply }).await
    }

    pub async fn disable_cell(&self, name: impl Into<String>, purge: bool) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::DisableCell { name, purge, reply }).await
    }

    pub async fn finish_purge_cell(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::FinishPurgeCell { name, reply }).await
    }

    pub async fn set_cell_dead(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::SetCellDead { name, reply }).await
    }

    pub async fn update_cell_status(&self, report: CellStatusReport) -> Result<()> {
        self.call(|reply| Command::UpdateCellStatus { report, reply }).await
    }

    pub async fn sync_cell_instances(&self, cell: impl Into<String>, reports: Vec<InstanceReport>) -> Result<usize> {
        let cell = cell.into();
        self.call(|reply| Command::SyncCellInstances { cell, reports, reply }).await
    }

    pub async fn select_cell(
        &self,
        pool: impl Into<String>,
        requirement: ResourceRequirement,
        must_fulfill: bool,
    ) -> Result<String> {
        let pool = pool.into();
        self.call(|reply| Command::SelectCell { pool, requirement, must_fulfill, reply }).await
    }

    // 云主机

    pub async fn allocate_instance(&self, pool: impl Into<String>, config: InstanceConfig) -> Result<Instance> {
        let pool = pool.into();
        self.call(|reply| Command::AllocateInstance { pool, config, reply }).await
    }

    pub async fn confirm_instance(
        &self,
        id: impl Into<String>,
        monitor_port: u32,
        monitor_secret: String,
        ethernet_address: Option<String>,
    ) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::ConfirmInstance {
            id,
            monitor_port,
            monitor_secret,
            ethernet_address,
            reply,
        })
        .await
    }

    pub async fn deallocate_instance(&self, id: impl Into<String>, error: Option<String>) -> Result<Instance> {
        let id = id.into();
        self.call(|reply| Command::DeallocateInstance { id, error, reply }).await
    }

    pub async fn update_instance_status(&self, id: impl Into<String>, running: bool) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstanceStatus { id, running, reply }).await
    }

    pub async fn update_instance_progress(&self, id: impl Into<String>, progress: u32) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstanceProgress { id, progress, reply }).await
    }

    pub async fn rename_instance(&self, id: impl Into<String>, name: impl Into<String>) -> Result<()> {
        let (id, name) = (id.into(), name.into());
        self.call(|reply| Command::RenameInstance { id, name, reply }).await
    }

    pub async fn update_instance_priority(&self, id: impl Into<String>, priority: CpuPriority) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstancePriority { id, priority, reply }).await
    }

    pub async fn update_instance_disk_threshold(
        &self,
        id: impl Into<String>,
        read_speed: u64,
        read_iops: u64,
        write_speed: u64,
        write_iops: u64,
    ) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstanceDiskThreshold {
            id,
            read_speed,
            read_iops,
            write_speed,
            write_iops,
            reply,
        })
        .await
    }

    pub async fn update_instance_network_threshold(
        &self,
        id: impl Into<String>,
        receive_speed: u64,
        send_speed: u64,
    ) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstanceNetworkThreshold { id, receive_speed, send_speed, reply })
            .await
    }

    pub async fn update_instance_monitor_secret(&self, id: impl Into<String>, secret: String) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateInstanceMonitorSecret { id, secret, reply }).await
    }

    pub async fn get_instance(&self, id: impl Into<String>) -> Result<Instance> {
        let id = id.into();
        self.call(|reply| Command::GetInstance { id, reply }).await
    }

    pub async fn get_instance_by_name(&self, pool: impl Into<String>, name: impl Into<String>) -> Result<Instance> {
        let (pool, name) = (pool.into(), name.into());
        self.call(|reply| Command::GetInstanceByName { pool, name, reply }).await
    }

    pub async fn query_instances_in_pool(&self, pool: impl Into<String>) -> Result<Vec<Instance>> {
        let pool = pool.into();
        self.call(|reply| Command::QueryInstancesInPool { pool, reply }).await
    }

    pub async fn query_instances_in_cell(&self, cell: impl Into<String>) -> Result<Vec<Instance>> {
        let cell = cell.into();
        self.call(|reply| Command::QueryInstancesInCell { cell, reply }).await
    }

    // 迁移与故障切换

    pub async fn create_migration(&self, param: MigrationParameter) -> Result<String> {
        self.call(|reply| Command::CreateMigration { param, reply }).await
    }

    pub async fn finish_migration(&self, id: impl Into<String>, ports: Vec<u32>) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::FinishMigration { id, ports, reply }).await
    }

    pub async fn cancel_migration(&self, id: impl Into<String>, reason: Option<String>) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::CancelMigration { id, reason, reply }).await
    }

    pub async fn update_migration_progress(&self, id: impl Into<String>, progress: u32) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::UpdateMigrationProgress { id, progress, reply }).await
    }

    pub async fn get_migration(&self, id: impl Into<String>) -> Result<Migration> {
        let id = id.into();
        self.call(|reply| Command::GetMigration { id, reply }).await
    }

    pub async fn query_migrations(&self) -> Result<Vec<Migration>> {
        self.call(|reply| Command::QueryMigrations { reply }).await
    }

    pub async fn build_failover_plan(&self, cell: impl Into<String>) -> Result<FailoverPlan> {
        let cell = cell.into();
        self.call(|reply| Command::BuildFailoverPlan { cell, reply }).await
    }

    pub async fn execute_failover(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
        instances: Vec<String>,
        ports: Vec<u32>,
    ) -> Result<()> {
        let (source, target) = (source.into(), target.into());
        self.call(|reply| Command::ExecuteFailover { source, target, instances, ports, reply })
            .await
    }

    pub async fn purge_lost_instances(&self, cell: impl Into<String>) -> Result<usize> {
        let cell = cell.into();
        self.call(|reply| Command::PurgeLostInstances { cell, reply }).await
    }

    // 批量任务

    pub async fn start_batch_create(&self, pool: impl Into<String>, names: Vec<String>) -> Result<String> {
        let pool = pool.into();
        self.call(|reply| Command::StartBatchCreate { pool, names, reply }).await
    }

    pub async fn set_batch_create_guest_start(
        &self,
        batch: impl Into<String>,
        name: impl Into<String>,
        instance: impl Into<String>,
    ) -> Result<()> {
        let (batch, name, instance) = (batch.into(), name.into(), instance.into());
        self.call(|reply| Command::SetBatchCreateGuestStart { batch, name, instance, reply })
            .await
    }

    pub async fn set_batch_create_guest_fail(
        &self,
        batch: impl Into<String>,
        name: impl Into<String>,
        error: String,
    ) -> Result<()> {
        let (batch, name) = (batch.into(), name.into());
        self.call(|reply| Command::SetBatchCreateGuestFail { batch, name, error, reply }).await
    }

    pub async fn get_batch_create_status(&self, batch: impl Into<String>) -> Result<BatchTask> {
        let batch = batch.into();
        self.call(|reply| Command::GetBatchCreateStatus { batch, reply }).await
    }

    pub async fn start_batch_delete(&self, targets: Vec<BatchTarget>) -> Result<String> {
        self.call(|reply| Command::StartBatchDelete { targets, reply }).await
    }

    pub async fn set_batch_delete_guest_success(
        &self,
        batch: impl Into<String>,
        instance: impl Into<String>,
    ) -> Result<()> {
        let (batch, instance) = (batch.into(), instance.into());
        self.call(|reply| Command::SetBatchDeleteGuestSuccess { batch, instance, reply }).await
    }

    pub async fn set_batch_delete_guest_fail(
        &self,
        batch: impl Into<String>,
        instance: impl Into<String>,
        error: String,
    ) -> Result<()> {
        let (batch, instance) = (batch.into(), instance.into());
        self.call(|reply| Command::SetBatchDeleteGuestFail { batch, instance, error, reply })
            .await
    }

    pub async fn get_batch_delete_status(&self, batch: impl Into<String>) -> Result<BatchTask> {
        let batch = batch.into();
        self.call(|reply| Command::GetBatchDeleteStatus { batch, reply }).await
    }

    pub async fn start_batch_stop(&self, targets: Vec<BatchTarget>) -> Result<String> {
        self.call(|reply| Command::StartBatchStop { targets, reply }).await
    }

    pub async fn set_batch_stop_guest_success(
        &self,
        batch: impl Into<String>,
        instance: impl Into<String>,
    ) -> Result<()> {
        let (batch, instance) = (batch.into(), instance.into());
        self.call(|reply| Command::SetBatchStopGuestSuccess { batch, instance, reply }).await
    }

    pub async fn set_batch_stop_guest_fail(
        &self,
        batch: impl Into<String>,
        instance: impl Into<String>,
        error: String,
    ) -> Result<()> {
        let (batch, instance) = (batch.into(), instance.into());
        self.call(|reply| Command::SetBatchStopGuestFail { batch, instance, error, reply }).await
    }

    pub async fn get_batch_stop_status(&self, batch: impl Into<String>) -> Result<BatchTask> {
        let batch = batch.into();
        self.call(|reply| Command::GetBatchStopStatus { batch, reply }).await
    }

    // 系统模板

    pub async fn create_template(&self, config: SystemTemplateConfig) -> Result<String> {
        self.call(|reply| Command::CreateTemplate { config, reply }).await
    }

    pub async fn modify_template(&self, id: impl Into<String>, config: SystemTemplateConfig) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::ModifyTemplate { id, config, reply }).await
    }

    pub async fn delete_template(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.call(|reply| Command::DeleteTemplate { id, reply }).await
    }

    pub async fn get_template(&self, id: impl Into<String>) -> Result<SystemTemplate> {
        let id = id.into();
        self.call(|reply| Command::GetTemplate { id, reply }).await
    }

    pub async fn query_templates(&self) -> Result<Vec<SystemTemplate>> {
        self.call(|reply| Command::QueryTemplates { reply }).await
    }

    // 镜像服务器

    pub async fn add_image_server(&self, name: impl Into<String>, host: impl Into<String>, port: u16) -> Result<()> {
        let (name, host) = (name.into(), host.into());
        self.call(|reply| Command::AddImageServer { name, host, port, reply }).await
    }

    pub async fn remove_image_server(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::RemoveImageServer { name, reply }).await
    }

    pub async fn get_image_server(&self) -> Result<ImageServer> {
        self.call(|reply| Command::GetImageServer { reply }).await
    }

    // 状态汇总

    pub async fn get_zone_status(&self) -> Result<ZoneStatistics> {
        self.call(|reply| Command::GetZoneStatus { reply }).await
    }

    /// 立即汇总统计，返回新发现的失联节点
    pub async fn update_statistics(&self) -> Result<Vec<String>> {
        self.call(|reply| Command::UpdateStatistics { reply }).await
    }

    pub async fn sweep_batch_tasks(&self) -> Result<()> {
        self.call(|reply| Command::SweepBatchTasks { reply }).await
    }
}
