/// 迁移与故障切换服务
///
/// 迁移任务：创建时标记云主机迁移中，完成时将云主机挂到目标节点，取消时恢复标记。
/// 故障切换：节点失联后，开启故障切换的计算资源池为节点上的云主机重新调度，
/// 未开启的只将云主机标记为丢失。

use chrono::{DateTime, Utc};
use common::models::StorageType;
use common::utils::generate_id;
use common::{Error, Result};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::{FailoverPlan, Migration, MigrationParameter};
use crate::scheduler::{ConfiguredLoad, ResourceRequirement};
use crate::state::{corrupted, ResourceState};

impl ResourceState {
    /// 迁移依赖 NFS 共享存储
    fn ensure_shared_storage(&self, pool: &str) -> Result<()> {
        let compute = self.pool(pool)?;
        let storage = compute.storage.as_deref().ok_or_else(|| {
            Error::InvalidState(format!("计算资源池 {} 没有共享存储，不能迁移", pool))
        })?;
        match self.storage_pools.get(storage) {
            Some(storage) if storage.storage_type == StorageType::Nfs => Ok(()),
            Some(storage) => Err(Error::InvalidState(format!(
                "存储池 {} 的类型 {} 不支持迁移",
                storage.name,
                storage.storage_type.as_str()
            ))),
            None => Err(corrupted(format!("计算资源池 {} 引用了不存在的存储池 {}", pool, storage))),
        }
    }

    fn migration_mut(&mut self, id: &str) -> Result<&mut Migration> {
        self.migrations
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("迁移任务 {}", id)))
    }

    /// 创建迁移任务，返回任务 ID
    pub fn create_migration(&mut self, param: MigrationParameter, now: DateTime<Utc>) -> Result<String> {
        if param.source_pool != param.target_pool {
            return Err(Error::InvalidArgument("只支持同一计算资源池内的迁移".to_string()));
        }
        if param.source_cell == param.target_cell {
            return Err(Error::InvalidArgument(format!(
                "源节点与目标节点相同: {}",
                param.source_cell
            )));
        }
        self.ensure_shared_storage(&param.source_pool)?;

        let source = self.cell(&param.source_cell)?;
        if source.pool != param.source_pool {
            return Err(Error::InvalidArgument(format!(
                "资源节点 {} 不属于计算资源池 {}",
                source.name, param.source_pool
            )));
        }
        if !source.alive {
            return Err(Error::InvalidState(format!("源节点 {} 已离线", source.name)));
        }
        let target = self.cell(&param.target_cell)?;
        if target.pool != param.target_pool {
            return Err(Error::InvalidArgument(format!(
                "资源节点 {} 不属于计算资源池 {}",
                target.name, param.target_pool
            )));
        }
        if !target.is_available() {
            return Err(Error::InvalidState(format!("目标节点 {} 不可用", target.name)));
        }

        let instances = if param.instances.is_empty() {
            source.all_instances()
        } else {
            param.instances.clone()
        };
        if instances.is_empty() {
            return Err(Error::InvalidArgument(format!("源节点 {} 上没有云主机", source.name)));
        }
        for id in &instances {
            let instance = self.instance(id)?;
            if instance.cell == param.target_cell {
                return Err(Error::InvalidArgument(format!("云主机 {} 已在目标节点上", id)));
            }
            if instance.cell != param.source_cell {
                return Err(Error::InvalidArgument(format!(
                    "云主机 {} 不在源节点 {} 上",
                    id, param.source_cell
                )));
            }
            if instance.running {
                return Err(Error::InvalidState(format!("云主机 {} 正在运行", id)));
            }
            if instance.migrating {
                return Err(Error::InvalidState(format!("云主机 {} 正在迁移", id)));
            }
        }

        for id in &instances {
            self.instance_mut(id)?.migrating = true;
        }
        let migration = Migration {
            id: generate_id(),
            source_pool: param.source_pool,
            source_cell: param.source_cell,
            target_pool: param.target_pool,
            target_cell: param.target_cell,
            instances,
            finished: false,
            progress: 0,
            error: None,
            create_time: now,
            latest_update: now,
        };
        info!(
            "迁移任务已创建: id={}, {} -> {}, instances={}",
            migration.id,
            migration.source_cell,
            migration.target_cell,
            migration.instances.len()
        );
        let id = migration.id.clone();
        self.migrations.insert(id.clone(), migration);
        Ok(id)
    }

    /// 迁移完成，ports 为各云主机在目标节点上的监控端口（为空时保持不变）
    pub fn finish_migration(&mut self, id: &str, ports: Vec<u32>, now: DateTime<Utc>) -> Result<()> {
        let migration = self
            .migrations
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("迁移任务 {}", id)))?;
        if migration.finished {
            return Err(Error::InvalidState(format!("迁移任务 {} 已结束", id)));
        }
        if !ports.is_empty() && ports.len() != migration.instances.len() {
            return Err(Error::InvalidArgument(format!(
                "监控端口数量 {} 与云主机数量 {} 不一致",
                ports.len(),
                migration.instances.len()
            )));
        }
        let source = migration.source_cell.clone();
        let target = migration.target_cell.clone();
        let instances = migration.instances.clone();

        self.move_instances(&source, &target, &instances, &ports)?;

        let migration = self.migration_mut(id)?;
        migration.finished = true;
        migration.progress = 100;
        migration.latest_update = now;
        info!("迁移任务已完成: id={}, {} -> {}", id, source, target);
        Ok(())
    }

    pub fn cancel_migration(&mut self, id: &str, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        let migration = self.migration_mut(id)?;
        if migration.finished {
            return Err(Error::InvalidState(format!("迁移任务 {} 已结束", id)));
        }
        migration.finished = true;
        migration.error = reason;
        migration.latest_update = now;
        let instances = migration.instances.clone();
        match &migration.error {
            Some(reason) => warn!("迁移任务已取消: id={}, reason={}", id, reason),
            None => info!("迁移任务已取消: id={}", id),
        }

        for instance in &instances {
            match self.instances.get_mut(instance) {
                Some(instance) => instance.migrating = false,
                None => warn!("迁移任务 {} 中的云主机 {} 已不存在", id, instance),
            }
        }
        Ok(())
    }

    pub fn update_migration_progress(&mut self, id: &str, progress: u32, now: DateTime<Utc>) -> Result<()> {
        let migration = self.migration_mut(id)?;
        if migration.finished {
            return Err(Error::InvalidState(format!("迁移任务 {} 已结束", id)));
        }
        migration.progress = progress.min(100);
        migration.latest_update = now;
        Ok(())
    }

    pub fn get_migration(&self, id: &str) -> Result<Migration> {
        self.migrations
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("迁移任务 {}", id)))
    }

    /// 全部迁移任务（按创建时间排序）
    pub fn query_migrations(&self) -> Vec<Migration> {
        let mut migrations: Vec<Migration> = self.migrations.values().cloned().collect();
        migrations.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.id.cmp(&b.id)));
        migrations
    }

    /// 为失联节点生成故障切换计划
    pub fn build_failover_plan(&mut self, cell: &str) -> Result<FailoverPlan> {
        let lost = self.cell(cell)?;
        if !lost.is_allocated() {
            return Err(Error::InvalidState(format!("资源节点 {} 未加入计算资源池", cell)));
        }
        if lost.alive {
            return Err(Error::InvalidState(format!("资源节点 {} 仍在线", cell)));
        }
        let pool = self.pool(&lost.pool)?;
        let instances = lost.all_instances();
        let mut plan = FailoverPlan {
            cell: cell.to_string(),
            pool: pool.name.clone(),
            ..Default::default()
        };

        if !pool.failover {
            for id in &instances {
                match self.instances.get_mut(id) {
                    Some(instance) => instance.lost = true,
                    None => {
                        corrupted(format!("资源节点 {} 引用了不存在的云主机 {}", cell, id));
                    }
                }
            }
            warn!("资源节点 {} 失联，{} 台云主机已标记为丢失", cell, instances.len());
            plan.lost = instances;
            return Ok(plan);
        }

        // 先完成全部调度再修改状态，调度失败时状态保持不变
        let mut reserved: HashMap<String, ConfiguredLoad> = HashMap::new();
        for id in &instances {
            let requirement = ResourceRequirement::from(self.instance(id)?);
            let target = self.select_cell_with(&plan.pool, &requirement, false, &reserved)?;
            reserved.entry(target.clone()).or_default().add(&requirement);
            plan.targets.entry(target).or_default().push(id.clone());
        }

        let lost = self.cell_mut(cell)?;
        lost.enabled = false;
        lost.purge_appending = !instances.is_empty();
        for id in &instances {
            self.instance_mut(id)?.migrating = true;
        }
        for (target, ids) in &plan.targets {
            info!("故障切换计划: {} -> {}, instances={}", cell, target, ids.len());
        }
        warn!(
            "资源节点 {} 失联，{} 台云主机将切换到 {} 个节点",
            cell,
            plan.planned_instances(),
            plan.targets.len()
        );
        Ok(plan)
    }

    /// 云主机已在目标节点上启动后，将其转移到目标节点
    pub fn execute_failover(
        &mut self,
        source: &str,
        target: &str,
        instances: Vec<String>,
        ports: Vec<u32>,
    ) -> Result<()> {
        if source == target {
            return Err(Error::InvalidArgument(format!("源节点与目标节点相同: {}", source)));
        }
        let source_cell = self.cell(source)?;
        let target_cell = self.cell(target)?;
        if source_cell.pool != target_cell.pool {
            return Err(Error::InvalidArgument(format!(
                "资源节点 {} 与 {} 不在同一计算资源池",
                source, target
            )));
        }
        if !target_cell.is_available() {
            return Err(Error::InvalidState(format!("目标节点 {} 不可用", target)));
        }
        if !ports.is_empty() && ports.len() != instances.len() {
            return Err(Error::InvalidArgument(format!(
                "监控端口数量 {} 与云主机数量 {} 不一致",
                ports.len(),
                instances.len()
            )));
        }
        for id in &instances {
            if !source_cell.hosts(id) {
                return Err(Error::InvalidArgument(format!("云主机 {} 不在资源节点 {} 上", id, source)));
            }
        }

        self.move_instances(source, target, &instances, &ports)?;
        for id in &instances {
            self.instance_mut(id)?.lost = false;
        }
        info!("故障切换已执行: {} -> {}, instances={}", source, target, instances.len());
        Ok(())
    }

    /// 删除失联节点上的全部云主机（计算资源池未开启故障切换）
    pub fn purge_lost_instances(&mut self, cell: &str, now: DateTime<Utc>) -> Result<usize> {
        let lost = self.cell(cell)?;
        if lost.alive {
            return Err(Error::InvalidState(format!("资源节点 {} 仍在线", cell)));
        }
        if lost.is_allocated() && self.pool(&lost.pool)?.failover {
            return Err(Error::InvalidState(format!(
                "计算资源池 {} 已开启故障切换，请执行切换计划",
                lost.pool
            )));
        }
        let instances = lost.all_instances();
        for id in &instances {
            self.deallocate_instance(id, None, now)?;
        }
        info!("已清除失联节点 {} 上的 {} 台云主机", cell, instances.len());
        Ok(instances.len())
    }

    /// 将云主机从源节点转移到目标节点，清除迁移标记
    fn move_instances(&mut self, source: &str, target: &str, instances: &[String], ports: &[u32]) -> Result<()> {
        let target_address = self.cell(target)?.address.clone();
        for (index, id) in instances.iter().enumerate() {
            let pending = match self.cells.get_mut(source) {
                Some(cell) => {
                    let pending = cell.pending_instances.contains(id);
                    cell.detach(id);
                    pending
                }
                None => return Err(corrupted(format!("资源节点 {} 不存在", source))),
            };
            let instance = match self.instances.get_mut(id) {
                Some(instance) => instance,
                None => {
                    warn!("云主机 {} 已不存在，跳过转移", id);
                    continue;
                }
            };
            instance.cell = target.to_string();
            instance.migrating = false;
            instance.network.monitor_address = target_address.clone();
            if let Some(port) = ports.get(index) {
                instance.network.monitor_port = *port;
            }

            let cell = self.cell_mut(target)?;
            if pending {
                cell.pending_instances.insert(id.clone());
            } else {
                cell.instances.insert(id.clone());
            }
        }

        let source_cell = self.cell_mut(source)?;
        if source_cell.purge_appending && source_cell.is_empty() {
            source_cell.purge_appending = false;
            info!("资源节点 {} 上的云主机已全部迁出", source);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComputePoolConfig, StoragePool};
    use crate::state::testing::*;

    /// 计算资源池绑定 NFS 存储
    fn shared_pool(failover: bool) -> ResourceState {
        let mut state = state_with_pool("p1");
        state
            .create_storage_pool(StoragePool {
                name: "nfs-1".into(),
                storage_type: StorageType::Nfs,
                host: "192.168.1.200".into(),
                target: "/export/vm".into(),
            })
            .unwrap();
        state
            .modify_pool(ComputePoolConfig {
                name: "p1".into(),
                storage: Some("nfs-1".into()),
                network: None,
                failover,
            })
            .unwrap();
        state
    }

    /// 在 cell-a 上创建并确认 count 台云主机，再加入 cell-b、cell-c
    fn populate(state: &mut ResourceState, count: usize) -> Vec<String> {
        join_cell(state, "p1", "cell-a", usage(16, 10.0, 64, 1000));
        let mut ids = Vec::new();
        for i in 0..count {
            let instance = state
                .allocate_instance("p1", instance_config(&format!("vm-{}", i), 2, 4, &[40]), Utc::now())
                .unwrap();
            state.confirm_instance(&instance.id, 5900 + i as u32, String::new(), None).unwrap();
            ids.push(instance.id);
        }
        join_cell(state, "p1", "cell-b", usage(16, 10.0, 64, 1000));
        join_cell(state, "p1", "cell-c", usage(16, 10.0, 64, 1000));
        ids
    }

    fn parameter(instances: Vec<String>) -> MigrationParameter {
        MigrationParameter {
            source_pool: "p1".into(),
            source_cell: "cell-a".into(),
            target_pool: "p1".into(),
            target_cell: "cell-b".into(),
            instances,
        }
    }

    #[test]
    fn test_migration_requires_shared_storage() {
        let mut state = state_with_pool("p1");
        populate(&mut state, 1);
        let err = state.create_migration(parameter(vec![]), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_migration_preconditions() {
        let mut state = shared_pool(false);
        let ids = populate(&mut state, 2);

        let mut same_cell = parameter(vec![]);
        same_cell.target_cell = "cell-a".into();
        assert!(matches!(state.create_migration(same_cell, Utc::now()), Err(Error::InvalidArgument(_))));

        state.update_instance_status(&ids[0], true).unwrap();
        assert!(matches!(
            state.create_migration(parameter(vec![ids[0].clone()]), Utc::now()),
            Err(Error::InvalidState(_))
        ));

        state.disable_cell("cell-b", false).unwrap();
        assert!(matches!(
            state.create_migration(parameter(vec![ids[1].clone()]), Utc::now()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_finish_migration() {
        let mut state = shared_pool(false);
        let ids = populate(&mut state, 2);

        let id = state.create_migration(parameter(vec![]), Utc::now()).unwrap();
        assert!(ids.iter().all(|i| state.get_instance(i).unwrap().migrating));
        // 同一台云主机不能同时参与两个迁移任务
        assert!(state.create_migration(parameter(vec![ids[0].clone()]), Utc::now()).is_err());

        state.update_migration_progress(&id, 60, Utc::now()).unwrap();
        assert!(state.finish_migration(&id, vec![5990], Utc::now()).is_err());
        state.finish_migration(&id, vec![5990, 5991], Utc::now()).unwrap();

        let migration = state.get_migration(&id).unwrap();
        assert!(migration.finished);
        assert_eq!(migration.progress, 100);
        let instance = state.get_instance(&ids[1]).unwrap();
        assert_eq!(instance.cell, "cell-b");
        assert!(!instance.migrating);
        assert_eq!(instance.network.monitor_port, 5991);
        assert_eq!(instance.network.monitor_address, state.get_cell_status("cell-b").unwrap().address);
        assert!(state.query_instances_in_cell("cell-a").unwrap().is_empty());
        assert_eq!(state.get_cell_status("cell-b").unwrap().instances.stopped, 2);

        assert!(state.finish_migration(&id, vec![], Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_migration() {
        let mut state = shared_pool(false);
        let ids = populate(&mut state, 1);
        let id = state.create_migration(parameter(vec![]), Utc::now()).unwrap();
        state.cancel_migration(&id, Some("目标节点磁盘不足".into()), Utc::now()).unwrap();

        let migration = state.get_migration(&id).unwrap();
        assert!(migration.finished);
        assert_eq!(migration.error.as_deref(), Some("目标节点磁盘不足"));
        let instance = state.get_instance(&ids[0]).unwrap();
        assert!(!instance.migrating);
        assert_eq!(instance.cell, "cell-a");
        assert_eq!(state.query_migrations().len(), 1);
    }

    #[test]
    fn test_failover_plan_covers_all_instances() {
        let mut state = shared_pool(true);
        let ids = populate(&mut state, 4);
        state.set_cell_dead("cell-a").unwrap();

        let plan = state.build_failover_plan("cell-a").unwrap();
        assert_eq!(plan.planned_instances(), ids.len());
        assert!(plan.lost.is_empty());
        // 同等容量的节点分摊云主机
        assert_eq!(plan.targets.len(), 2);
        for target in plan.targets.keys() {
            let cell = state.get_cell_status(target).unwrap();
            assert!(cell.alive && cell.enabled);
            assert_eq!(cell.pool, "p1");
        }

        let lost = state.get_cell_status("cell-a").unwrap();
        assert!(!lost.enabled);
        assert!(lost.purge_appending);
        assert!(ids.iter().all(|i| state.get_instance(i).unwrap().migrating));

        for (target, instances) in plan.targets.clone() {
            state.execute_failover("cell-a", &target, instances, vec![]).unwrap();
        }
        let lost = state.get_cell_status("cell-a").unwrap();
        assert!(!lost.purge_appending);
        assert!(state.query_instances_in_cell("cell-a").unwrap().is_empty());
        assert!(ids.iter().all(|i| !state.get_instance(i).unwrap().migrating));
    }

    #[test]
    fn test_failover_plan_failure_leaves_state() {
        let mut state = shared_pool(true);
        populate(&mut state, 2);
        state.set_cell_dead("cell-a").unwrap();
        state.disable_cell("cell-b", false).unwrap();
        state.disable_cell("cell-c", false).unwrap();

        assert!(state.build_failover_plan("cell-a").is_err());
        let cell = state.get_cell_status("cell-a").unwrap();
        assert!(cell.enabled);
        assert!(!cell.purge_appending);
    }

    #[test]
    fn test_lost_without_failover() {
        let mut state = shared_pool(false);
        let ids = populate(&mut state, 3);
        assert!(state.build_failover_plan("cell-a").is_err());

        state.set_cell_dead("cell-a").unwrap();
        let plan = state.build_failover_plan("cell-a").unwrap();
        assert!(plan.targets.is_empty());
        assert_eq!(plan.lost.len(), 3);
        assert_eq!(state.get_cell_status("cell-a").unwrap().instances.lost, 3);

        assert_eq!(state.purge_lost_instances("cell-a", Utc::now()).unwrap(), 3);
        assert!(ids.iter().all(|i| state.get_instance(i).is_err()));
        assert_eq!(state.get_pool("p1").unwrap().instances, 0);
    }
}
