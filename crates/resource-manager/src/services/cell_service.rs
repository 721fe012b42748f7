/// 资源节点管理服务

use chrono::{DateTime, Utc};
use common::utils::format_bytes;
use common::{Error, Result};
use tracing::{debug, info, warn};

use crate::models::{Cell, CellStatus, CellStatusReport};
use crate::state::{corrupted, ResourceState};

impl ResourceState {
    /// 注册资源节点，新节点处于未分配状态
    pub fn register_cell(&mut self, name: &str, address: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("资源节点名称不能为空".to_string()));
        }
        let address = address.into();
        match self.cells.get_mut(name) {
            Some(cell) => {
                if cell.address != address {
                    info!("资源节点地址已更新: name={}, {} -> {}", name, cell.address, address);
                    cell.address = address;
                }
                let recovered = !cell.alive;
                cell.alive = true;
                cell.latest_update = now;
                if recovered {
                    info!("资源节点重新上线: {}", name);
                    self.recover_lost_instances(name);
                }
            }
            None => {
                info!("发现新的资源节点: name={}, address={}", name, address);
                self.cells.insert(name.to_string(), Cell::new(name, address, now));
            }
        }
        Ok(())
    }

    /// 获取未分配的资源节点
    pub fn query_unallocated_cells(&self) -> Vec<CellStatus> {
        let mut cells: Vec<CellStatus> = self
            .cells
            .values()
            .filter(|cell| !cell.is_allocated())
            .map(|cell| self.cell_status(cell))
            .collect();
        cells.sort_by(|a, b| a.name.cmp(&b.name));
        cells
    }

    /// 将未分配的节点加入计算资源池
    pub fn add_cell(&mut self, pool: &str, cell: &str) -> Result<()> {
        self.pool(pool)?;
        let target = self.cell_mut(cell)?;
        if target.is_allocated() {
            return Err(Error::InUse(format!("资源节点 {} 已属于计算资源池 {}", cell, target.pool)));
        }
        target.pool = pool.to_string();
        self.pool_mut(pool)?.cells.insert(cell.to_string());
        info!("资源节点 {} 已加入计算资源池 {}", cell, pool);
        Ok(())
    }

    /// 将节点移出计算资源池，节点上不能有云主机
    pub fn remove_cell(&mut self, pool: &str, cell: &str) -> Result<()> {
        if !self.pool(pool)?.cells.contains(cell) {
            return Err(Error::NotFound(format!("计算资源池 {} 中的资源节点 {}", pool, cell)));
        }
        let target = match self.cells.get_mut(cell) {
            Some(target) => target,
            None => {
                return Err(corrupted(format!("计算资源池 {} 引用了不存在的资源节点 {}", pool, cell)));
            }
        };
        if !target.is_empty() {
            return Err(Error::InUse(format!(
                "资源节点 {} 上仍有 {} 台云主机",
                cell,
                target.instances.len() + target.pending_instances.len()
            )));
        }
        target.pool.clear();
        target.purge_appending = false;
        self.pool_mut(pool)?.cells.remove(cell);
        info!("资源节点 {} 已移出计算资源池 {}", cell, pool);
        Ok(())
    }

    /// 获取计算资源池中的节点
    pub fn query_cells(&self, pool: &str) -> Result<Vec<CellStatus>> {
        let pool = self.pool(pool)?;
        let mut cells = Vec::with_capacity(pool.cells.len());
        for name in &pool.cells {
            match self.cells.get(name) {
                Some(cell) => cells.push(self.cell_status(cell)),
                None => {
                    return Err(corrupted(format!("计算资源池 {} 引用了不存在的资源节点 {}", pool.name, name)));
                }
            }
        }
        Ok(cells)
    }

    pub fn get_cell_status(&self, name: &str) -> Result<CellStatus> {
        Ok(self.cell_status(self.cell(name)?))
    }

    pub fn enable_cell(&mut self, name: &str) -> Result<()> {
        let cell = self.cell_mut(name)?;
        if cell.enabled {
            return Err(Error::NoChange(format!("资源节点 {} 已启用", name)));
        }
        cell.enabled = true;
        cell.purge_appending = false;
        info!("资源节点已启用: {}", name);
        Ok(())
    }

    /// 禁用节点；purge 表示需要迁出节点上的全部云主机，要求计算资源池使用共享存储
    pub fn disable_cell(&mut self, name: &str, purge: bool) -> Result<()> {
        let cell = self.cell(name)?;
        if !cell.enabled && cell.purge_appending == purge {
            return Err(Error::NoChange(format!("资源节点 {} 已禁用", name)));
        }
        if purge {
            if !cell.is_allocated() {
                return Err(Error::InvalidState(format!("资源节点 {} 未加入计算资源池", name)));
            }
            let pool = self.pool(&cell.pool)?;
            if pool.storage.is_none() {
                return Err(Error::InvalidState(format!(
                    "计算资源池 {} 没有共享存储，无法迁出节点 {}",
                    pool.name, name
                )));
            }
        }
        let cell = self.cell_mut(name)?;
        cell.enabled = false;
        cell.purge_appending = purge;
        info!("资源节点已禁用: name={}, purge={}", name, purge);
        Ok(())
    }

    /// 迁出完成，清除待清理标记
    pub fn finish_purge_cell(&mut self, name: &str) -> Result<()> {
        let cell = self.cell_mut(name)?;
        if !cell.purge_appending {
            return Err(Error::InvalidState(format!("资源节点 {} 没有待完成的迁出", name)));
        }
        if !cell.is_empty() {
            return Err(Error::InUse(format!("资源节点 {} 上仍有云主机", name)));
        }
        cell.purge_appending = false;
        info!("资源节点迁出已完成: {}", name);
        Ok(())
    }

    /// 节点连接断开，立即标记为离线
    pub fn set_cell_dead(&mut self, name: &str) -> Result<()> {
        let cell = self.cell_mut(name)?;
        if !cell.alive {
            return Err(Error::NoChange(format!("资源节点 {} 已离线", name)));
        }
        cell.alive = false;
        warn!("资源节点已离线: {}", name);
        Ok(())
    }

    /// 处理节点状态上报
    pub fn update_cell_status(&mut self, report: CellStatusReport, now: DateTime<Utc>) -> Result<()> {
        let cell = self.cell_mut(&report.name)?;
        // 重启后恢复的节点需要重新注册后才有监控地址
        if cell.address.is_empty() {
            return Err(Error::InvalidState(format!("资源节点 {} 尚未注册", report.name)));
        }
        let recovered = !cell.alive;
        if recovered {
            info!("资源节点恢复上报: {}", cell.name);
        }
        debug!(
            "资源节点状态: name={}, cpu={:.1}%, memory={}/{}, disk={}/{}",
            cell.name,
            report.usage.cpu_usage,
            format_bytes(report.usage.memory_available),
            format_bytes(report.usage.memory),
            format_bytes(report.usage.disk_available),
            format_bytes(report.usage.disk)
        );
        cell.usage = report.usage;
        cell.alive = true;
        cell.latest_update = now;
        if recovered {
            self.recover_lost_instances(&report.name);
        }
        Ok(())
    }

    /// 节点重新上线后清除其云主机的丢失标记
    fn recover_lost_instances(&mut self, name: &str) {
        let ids = match self.cells.get(name) {
            Some(cell) => cell.all_instances(),
            None => return,
        };
        let mut recovered = 0;
        for id in ids {
            if let Some(instance) = self.instances.get_mut(&id) {
                if instance.lost {
                    instance.lost = false;
                    recovered += 1;
                }
            }
        }
        if recovered > 0 {
            info!("资源节点 {} 上 {} 台云主机已恢复", name, recovered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::*;

    #[test]
    fn test_register_and_add_cell() {
        let mut state = state_with_pool("p1");
        state.register_cell("cell-1", "192.168.1.10", Utc::now()).unwrap();
        assert_eq!(state.query_unallocated_cells().len(), 1);

        state.add_cell("p1", "cell-1").unwrap();
        assert!(state.query_unallocated_cells().is_empty());
        assert_eq!(state.query_cells("p1").unwrap().len(), 1);
        assert_eq!(state.get_cell_status("cell-1").unwrap().pool, "p1");

        // 节点只能属于一个计算资源池
        state.create_pool(crate::models::ComputePoolConfig {
            name: "p2".into(),
            storage: None,
            network: None,
            failover: false,
        }).unwrap();
        assert!(matches!(state.add_cell("p2", "cell-1"), Err(Error::InUse(_))));
    }

    #[test]
    fn test_register_updates_address() {
        let mut state = state_with_pool("p1");
        state.register_cell("cell-1", "192.168.1.10", Utc::now()).unwrap();
        state.set_cell_dead("cell-1").unwrap();
        state.register_cell("cell-1", "192.168.1.11", Utc::now()).unwrap();
        let cell = state.get_cell_status("cell-1").unwrap();
        assert_eq!(cell.address, "192.168.1.11");
        assert!(cell.alive);
    }

    #[test]
    fn test_remove_cell_with_instances() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        let instance = state
            .allocate_instance("p1", instance_config("vm-1", 1, 1, &[10]), Utc::now())
            .unwrap();
        assert!(matches!(state.remove_cell("p1", "cell-1"), Err(Error::InUse(_))));

        state.deallocate_instance(&instance.id, None, Utc::now()).unwrap();
        state.remove_cell("p1", "cell-1").unwrap();
        assert_eq!(state.query_unallocated_cells().len(), 1);
    }

    #[test]
    fn test_disable_with_purge_requires_storage() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        assert!(matches!(state.disable_cell("cell-1", true), Err(Error::InvalidState(_))));

        state.disable_cell("cell-1", false).unwrap();
        assert!(state.disable_cell("cell-1", false).unwrap_err().is_no_change());
        state.enable_cell("cell-1").unwrap();
        assert!(state.enable_cell("cell-1").unwrap_err().is_no_change());
    }

    #[test]
    fn test_update_cell_status() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        state.set_cell_dead("cell-1").unwrap();
        assert!(!state.get_cell_status("cell-1").unwrap().alive);

        let report = CellStatusReport {
            name: "cell-1".into(),
            usage: usage(16, 35.0, 64, 1000),
        };
        state.update_cell_status(report, Utc::now()).unwrap();
        let cell = state.get_cell_status("cell-1").unwrap();
        assert!(cell.alive);
        assert_eq!(cell.usage.cores, 16);

        let unknown = CellStatusReport {
            name: "cell-x".into(),
            usage: usage(1, 0.0, 1, 1),
        };
        assert!(state.update_cell_status(unknown, Utc::now()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_status_requires_registration() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        state.set_cell_dead("cell-1").unwrap();
        // 从快照恢复的节点没有地址
        state.cells.get_mut("cell-1").unwrap().address.clear();

        let report = CellStatusReport {
            name: "cell-1".into(),
            usage: usage(8, 0.0, 32, 500),
        };
        let err = state.update_cell_status(report.clone(), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(!state.get_cell_status("cell-1").unwrap().alive);

        state.register_cell("cell-1", "192.168.1.10", Utc::now()).unwrap();
        state.update_cell_status(report, Utc::now()).unwrap();
        assert!(state.get_cell_status("cell-1").unwrap().alive);
    }

    #[test]
    fn test_lost_instances_recover_with_cell() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        let instance = state
            .allocate_instance("p1", instance_config("vm-1", 1, 1, &[10]), Utc::now())
            .unwrap();
        state.confirm_instance(&instance.id, 5901, String::new(), None).unwrap();
        state.set_cell_dead("cell-1").unwrap();
        let plan = state.build_failover_plan("cell-1").unwrap();
        assert_eq!(plan.lost, vec![instance.id.clone()]);
        assert_eq!(state.get_cell_status("cell-1").unwrap().instances.lost, 1);

        state.register_cell("cell-1", "192.168.0.10", Utc::now()).unwrap();
        assert!(!state.get_instance(&instance.id).unwrap().lost);
        assert_eq!(state.get_cell_status("cell-1").unwrap().instances.lost, 0);

        // 节点直接恢复上报同样清除丢失标记
        state.set_cell_dead("cell-1").unwrap();
        state.build_failover_plan("cell-1").unwrap();
        let report = CellStatusReport {
            name: "cell-1".into(),
            usage: usage(8, 0.0, 32, 500),
        };
        state.update_cell_status(report, Utc::now()).unwrap();
        state.update_statistics(Utc::now());
        assert_eq!(state.get_cell_status("cell-1").unwrap().instances.lost, 0);
        assert!(!state.get_instance(&instance.id).unwrap().lost);
    }
}
