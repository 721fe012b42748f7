/// 资源管理器
///
/// 单个协程持有全部资源状态，从有界队列中逐条取出命令并执行到底，
/// 修改持久化数据的命令在返回结果前保存快照。统计汇总和批量任务清理
/// 由同一个循环中的定时器驱动，不会与调用方的命令交错执行。

mod command;
mod handle;

pub use command::{Command, Reply};
pub use handle::ResourceManagerHandle;

use chrono::Utc;
use common::models::constants::{BATCH_SWEEP_INTERVAL, STATISTICS_INTERVAL};
use common::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::persistence::Persistence;
use crate::state::ResourceState;

pub struct ResourceManager {
    state: ResourceState,
    persistence: Persistence,
}

impl ResourceManager {
    pub fn new(state: ResourceState, persistence: Persistence) -> Self {
        Self { state, persistence }
    }

    /// 加载持久化数据并启动命令处理协程
    pub fn start(config: &Config, shutdown: CancellationToken) -> Result<(ResourceManagerHandle, JoinHandle<()>)> {
        let persistence = Persistence::new(&config.data_path);
        let state = persistence.load_or_init(&config.zone_name, Utc::now())?;
        Ok(ResourceManager::new(state, persistence).spawn(config.queue_size, shutdown))
    }

    pub fn spawn(self, queue_size: usize, shutdown: CancellationToken) -> (ResourceManagerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue_size);
        let task = tokio::spawn(self.run(receiver, shutdown));
        (ResourceManagerHandle::new(sender), task)
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        let mut statistics = tokio::time::interval(Duration::from_secs(STATISTICS_INTERVAL));
        let mut sweep = tokio::time::interval(Duration::from_secs(BATCH_SWEEP_INTERVAL));
        info!("资源管理器已启动: zone={}", self.state.zone());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("资源管理器收到停止信号");
                    break;
                }
                command = receiver.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        info!("命令队列已关闭");
                        break;
                    }
                },
                _ = statistics.tick() => {
                    self.update_statistics();
                }
                _ = sweep.tick() => {
                    self.state.sweep_batch_tasks(Utc::now());
                }
            }
        }

        if let Err(e) = self.persistence.save(&self.state) {
            error!("停止前保存资源数据失败: {}", e);
        }
        info!("资源管理器已停止");
    }

    fn update_statistics(&mut self) -> Vec<String> {
        let lost = self.state.update_statistics(Utc::now());
        if !lost.is_empty() {
            warn!("状态汇总: {} 个资源节点失联: {:?}", lost.len(), lost);
        }
        lost
    }

    /// 修改持久化数据，成功后保存快照
    fn mutate<T, F>(&mut self, name: &'static str, reply: Reply<T>, handler: F)
    where
        F: FnOnce(&mut ResourceState) -> Result<T>,
    {
        let result = handler(&mut self.state).and_then(|value| {
            self.persistence.save(&self.state)?;
            Ok(value)
        });
        respond(name, reply, result);
    }

    /// 只修改运行时数据，不需要保存
    fn update<T, F>(&mut self, name: &'static str, reply: Reply<T>, handler: F)
    where
        F: FnOnce(&mut ResourceState) -> Result<T>,
    {
        let result = handler(&mut self.state);
        respond(name, reply, result);
    }

    fn query<T, F>(&self, name: &'static str, reply: Reply<T>, handler: F)
    where
        F: FnOnce(&ResourceState) -> Result<T>,
    {
        respond(name, reply, handler(&self.state));
    }

    fn handle(&mut self, command: Command) {
        let name = command.name();
        debug!("处理命令: {}", name);

        match command {
            Command::CreatePool { config, reply } => self.mutate(name, reply, |s| s.create_pool(config)),
            Command::ModifyPool { config, reply } => self.mutate(name, reply, |s| s.modify_pool(config)),
            Command::DeletePool { name: pool, reply } => self.mutate(name, reply, |s| s.delete_pool(&pool)),
            Command::EnablePool { name: pool, reply } => self.mutate(name, reply, |s| s.enable_pool(&pool)),
            Command::DisablePool { name: pool, reply } => self.mutate(name, reply, |s| s.disable_pool(&pool)),
            Command::QueryPools { reply } => self.query(name, reply, |s| Ok(s.query_pools())),
            Command::GetPool { name: pool, reply } => self.query(name, reply, |s| s.get_pool(&pool)),
            Command::QueryPoolStatus { reply } => self.query(name, reply, |s| Ok(s.query_pool_status())),
            Command::GetPoolStatus { name: pool, reply } => self.query(name, reply, |s| s.get_pool_status(&pool)),

            Command::CreateStoragePool { config, reply } => {
                self.mutate(name, reply, |s| s.create_storage_pool(config))
            }
            Command::ModifyStoragePool { config, reply } => {
                self.mutate(name, reply, |s| s.modify_storage_pool(config))
            }
            Command::DeleteStoragePool { name: pool, reply } => {
                self.mutate(name, reply, |s| s.delete_storage_pool(&pool))
            }
            Command::QueryStoragePools { reply } => self.query(name, reply, |s| Ok(s.query_storage_pools())),
            Command::GetStoragePool { name: pool, reply } => {
                self.query(name, reply, |s| s.get_storage_pool(&pool))
            }

            Command::CreateAddressPool { name: pool, config, reply } => {
                self.mutate(name, reply, |s| s.create_address_pool(&pool, config))
            }
            Command::ModifyAddressPool { name: pool, config, reply } => {
                self.mutate(name, reply, |s| s.modify_address_pool(&pool, config))
            }
            Command::DeleteAddressPool { name: pool, reply } => {
                self.mutate(name, reply, |s| s.delete_address_pool(&pool))
            }
            Command::QueryAddressPools { reply } => self.query(name, reply, |s| Ok(s.query_address_pools())),
            Command::GetAddressPool { name: pool, reply } => {
                self.query(name, reply, |s| s.get_address_pool(&pool))
            }
            Command::QueryAddressRanges { pool, range_type, reply } => {
                self.query(name, reply, |s| s.query_address_ranges(&pool, range_type))
            }
            Command::GetAddressRange { pool, range_type, start, reply } => {
                self.query(name, reply, |s| s.get_address_range(&pool, range_type, start))
            }
            Command::AddAddressRange { pool, range_type, config, reply } => {
                self.mutate(name, reply, |s| s.add_address_range(&pool, range_type, config))
            }
            Command::RemoveAddressRange { pool, range_type, start, reply } => {
                self.mutate(name, reply, |s| s.remove_address_range(&pool, range_type, start))
            }

            Command::RegisterCell { name: cell, address, reply } => {
                self.update(name, reply, |s| s.register_cell(&cell, address, Utc::now()))
            }
            Command::QueryUnallocatedCells { reply } => {
                self.query(name, reply, |s| Ok(s.query_unallocated_cells()))
            }
            Command::AddCell { pool, cell, reply } => self.mutate(name, reply, |s| s.add_cell(&pool, &cell)),
            Command::RemoveCell { pool, cell, reply } => self.mutate(name, reply, |s| s.remove_cell(&pool, &cell)),
            Command::QueryCells { pool, reply } => self.query(name, reply, |s| s.query_cells(&pool)),
            Command::GetCellStatus { name: cell, reply } => self.query(name, reply, |s| s.get_cell_status(&cell)),
            Command::EnableCell { name: cell, reply } => self.mutate(name, reply, |s| s.enable_cell(&cell)),
            Command::DisableCell { name: cell, purge, reply } => {
                self.mutate(name, reply, |s| s.disable_cell(&cell, purge))
            }
            Command::FinishPurgeCell { name: cell, reply } => {
                self.mutate(name, reply, |s| s.finish_purge_cell(&cell))
            }
            Command::SetCellDead { name: cell, reply } => self.update(name, reply, |s| s.set_cell_dead(&cell)),
            Command::UpdateCellStatus { report, reply } => {
                self.update(name, reply, |s| s.update_cell_status(report, Utc::now()))
            }
            Command::SyncCellInstances { cell, reports, reply } => {
                self.mutate(name, reply, |s| s.sync_cell_instances(&cell, reports, Utc::now()))
            }
            Command::SelectCell { pool, requirement, must_fulfill, reply } => {
                self.query(name, reply, |s| s.select_cell(&pool, &requirement, must_fulfill))
            }

            Command::AllocateInstance { pool, config, reply } => {
                self.mutate(name, reply, |s| s.allocate_instance(&pool, config, Utc::now()))
            }
            Command::ConfirmInstance { id, monitor_port, monitor_secret, ethernet_address, reply } => {
                self.update(name, reply, |s| {
                    s.confirm_instance(&id, monitor_port, monitor_secret, ethernet_address)
                })
            }
            Command::DeallocateInstance { id, error, reply } => {
                self.mutate(name, reply, |s| s.deallocate_instance(&id, error, Utc::now()))
            }
            Command::UpdateInstanceStatus { id, running, reply } => {
                self.update(name, reply, |s| s.update_instance_status(&id, running))
            }
            Command::UpdateInstanceProgress { id, progress, reply } => {
                self.update(name, reply, |s| s.update_instance_progress(&id, progress))
            }
            Command::RenameInstance { id, name: new_name, reply } => {
                self.update(name, reply, |s| s.rename_instance(&id, &new_name))
            }
            Command::UpdateInstancePriority { id, priority, reply } => {
                self.update(name, reply, |s| s.update_instance_priority(&id, priority))
            }
            Command::UpdateInstanceDiskThreshold { id, read_speed, read_iops, write_speed, write_iops, reply } => {
                self.update(name, reply, |s| {
                    s.update_instance_disk_threshold(&id, read_speed, read_iops, write_speed, write_iops)
                })
            }
            Command::UpdateInstanceNetworkThreshold { id, receive_speed, send_speed, reply } => {
                self.update(name, reply, |s| s.update_instance_network_threshold(&id, receive_speed, send_speed))
            }
            Command::UpdateInstanceMonitorSecret { id, secret, reply } => {
                self.update(name, reply, |s| s.update_instance_monitor_secret(&id, secret))
            }
            Command::GetInstance { id, reply } => self.query(name, reply, |s| s.get_instance(&id)),
            Command::GetInstanceByName { pool, name: instance, reply } => {
                self.query(name, reply, |s| s.get_instance_by_name(&pool, &instance))
            }
            Command::QueryInstancesInPool { pool, reply } => {
                self.query(name, reply, |s| s.query_instances_in_pool(&pool))
            }
            Command::QueryInstancesInCell { cell, reply } => {
                self.query(name, reply, |s| s.query_instances_in_cell(&cell))
            }

            Command::CreateMigration { param, reply } => {
                self.update(name, reply, |s| s.create_migration(param, Utc::now()))
            }
            Command::FinishMigration { id, ports, reply } => {
                self.mutate(name, reply, |s| s.finish_migration(&id, ports, Utc::now()))
            }
            Command::CancelMigration { id, reason, reply } => {
                self.update(name, reply, |s| s.cancel_migration(&id, reason, Utc::now()))
            }
            Command::UpdateMigrationProgress { id, progress, reply } => {
                self.update(name, reply, |s| s.update_migration_progress(&id, progress, Utc::now()))
            }
            Command::GetMigration { id, reply } => self.query(name, reply, |s| s.get_migration(&id)),
            Command::QueryMigrations { reply } => self.query(name, reply, |s| Ok(s.query_migrations())),
            Command::BuildFailoverPlan { cell, reply } => {
                self.mutate(name, reply, |s| s.build_failover_plan(&cell))
            }
            Command::ExecuteFailover { source, target, instances, ports, reply } => {
                self.mutate(name, reply, |s| s.execute_failover(&source, &target, instances, ports))
            }
            Command::PurgeLostInstances { cell, reply } => {
                self.mutate(name, reply, |s| s.purge_lost_instances(&cell, Utc::now()))
            }

            Command::StartBatchCreate { pool, names, reply } => {
                self.update(name, reply, |s| s.start_batch_create(&pool, names, Utc::now()))
            }
            Command::SetBatchCreateGuestStart { batch, name: guest, instance, reply } => {
                self.update(name, reply, |s| s.set_batch_create_guest_start(&batch, &guest, &instance, Utc::now()))
            }
            Command::SetBatchCreateGuestFail { batch, name: guest, error, reply } => {
                self.update(name, reply, |s| s.set_batch_create_guest_fail(&batch, &guest, error, Utc::now()))
            }
            Command::GetBatchCreateStatus { batch, reply } => {
                self.query(name, reply, |s| s.get_batch_create_status(&batch))
            }
            Command::StartBatchDelete { targets, reply } => {
                self.update(name, reply, |s| s.start_batch_delete(targets, Utc::now()))
            }
            Command::SetBatchDeleteGuestSuccess { batch, instance, reply } => {
                self.update(name, reply, |s| s.set_batch_delete_guest_success(&batch, &instance, Utc::now()))
            }
            Command::SetBatchDeleteGuestFail { batch, instance, error, reply } => {
                self.update(name, reply, |s| s.set_batch_delete_guest_fail(&batch, &instance, error, Utc::now()))
            }
            Command::GetBatchDeleteStatus { batch, reply } => {
                self.query(name, reply, |s| s.get_batch_delete_status(&batch))
            }
            Command::StartBatchStop { targets, reply } => {
                self.update(name, reply, |s| s.start_batch_stop(targets, Utc::now()))
            }
            Command::SetBatchStopGuestSuccess { batch, instance, reply } => {
                self.update(name, reply, |s| s.set_batch_stop_guest_success(&batch, &instance, Utc::now()))
            }
            Command::SetBatchStopGuestFail { batch, instance, error, reply } => {
                self.update(name, reply, |s| s.set_batch_stop_guest_fail(&batch, &instance, error, Utc::now()))
            }
            Command::GetBatchStopStatus { batch, reply } => {
                self.query(name, reply, |s| s.get_batch_stop_status(&batch))
            }

            Command::CreateTemplate { config, reply } => {
                self.mutate(name, reply, |s| s.create_template(config, Utc::now()))
            }
            Command::ModifyTemplate { id, config, reply } => {
                self.mutate(name, reply, |s| s.modify_template(&id, config, Utc::now()))
            }
            Command::DeleteTemplate { id, reply } => self.mutate(name, reply, |s| s.delete_template(&id)),
            Command::GetTemplate { id, reply } => self.query(name, reply, |s| s.get_template(&id)),
            Command::QueryTemplates { reply } => self.query(name, reply, |s| Ok(s.query_templates())),

            Command::AddImageServer { name: server, host, port, reply } => {
                self.update(name, reply, |s| s.add_image_server(&server, &host, port))
            }
            Command::RemoveImageServer { name: server, reply } => {
                self.update(name, reply, |s| s.remove_image_server(&server))
            }
            Command::GetImageServer { reply } => self.query(name, reply, |s| s.get_image_server()),

            Command::GetZoneStatus { reply } => self.query(name, reply, |s| Ok(s.get_zone_status())),
            Command::UpdateStatistics { reply } => {
                let lost = self.update_statistics();
                respond(name, reply, Ok(lost));
            }
            Command::SweepBatchTasks { reply } => self.update(name, reply, |s| {
                s.sweep_batch_tasks(Utc::now());
                Ok(())
            }),
        }
    }
}

fn respond<T>(name: &'static str, reply: Reply<T>, result: Result<T>) {
    if let Err(e) = &result {
        if e.is_no_change() {
            debug!("命令 {} 无需修改: {}", name, e);
        } else if e.is_not_found() || e.is_precondition() {
            warn!("命令 {} 处理失败: {}", name, e);
        } else {
            error!("命令 {} 处理失败: {}", name, e);
        }
    }
    if reply.send(result).is_err() {
        debug!("命令 {} 的调用方已不再等待结果", name);
    }
}
