/// 计算资源池管理

use common::{Error, Result};
use tracing::info;

use crate::models::{ComputePool, ComputePoolConfig, ComputePoolInfo, ComputePoolStatus};
use crate::state::ResourceState;

impl ResourceState {
    /// 检查计算资源池绑定的存储池、地址池是否存在，故障切换必须依赖共享存储
    fn validate_pool_config(&self, config: &ComputePoolConfig) -> Result<()> {
        if config.name.is_empty() {
            return Err(Error::InvalidArgument("计算资源池名称不能为空".to_string()));
        }
        if let Some(storage) = &config.storage {
            if !self.storage_pools.contains_key(storage) {
                return Err(Error::NotFound(format!("存储池 {}", storage)));
            }
        }
        if let Some(network) = &config.network {
            if !self.address_pools.contains_key(network) {
                return Err(Error::NotFound(format!("地址池 {}", network)));
            }
        }
        if config.failover && config.storage.is_none() {
            return Err(Error::InvalidArgument(format!(
                "计算资源池 {} 开启故障切换需要共享存储",
                config.name
            )));
        }
        Ok(())
    }

    /// 创建计算资源池
    pub fn create_pool(&mut self, config: ComputePoolConfig) -> Result<()> {
        if self.pools.contains_key(&config.name) {
            return Err(Error::AlreadyExists(format!("计算资源池 {}", config.name)));
        }
        self.validate_pool_config(&config)?;

        info!(
            "计算资源池已创建: name={}, storage={:?}, network={:?}, failover={}",
            config.name, config.storage, config.network, config.failover
        );
        let pool = ComputePool::new(config);
        self.pools.insert(pool.name.clone(), pool);
        Ok(())
    }

    /// 修改计算资源池
    pub fn modify_pool(&mut self, config: ComputePoolConfig) -> Result<()> {
        let pool = self.pool(&config.name)?;
        if pool.config() == config {
            return Err(Error::NoChange(format!("计算资源池 {}", config.name)));
        }
        let binding_changed = pool.storage != config.storage || pool.network != config.network;
        if binding_changed && !pool.instance_names.is_empty() {
            return Err(Error::InvalidState(format!(
                "计算资源池 {} 中仍有 {} 台云主机，不能修改存储或网络",
                config.name,
                pool.instance_names.len()
            )));
        }
        self.validate_pool_config(&config)?;

        let pool = self.pool_mut(&config.name)?;
        pool.storage = config.storage;
        pool.network = config.network;
        pool.failover = config.failover;
        info!(
            "计算资源池已修改: name={}, storage={:?}, network={:?}, failover={}",
            pool.name, pool.storage, pool.network, pool.failover
        );
        Ok(())
    }

    /// 删除计算资源池，池内不能有资源节点
    pub fn delete_pool(&mut self, name: &str) -> Result<()> {
        let pool = self.pool(name)?;
        if !pool.cells.is_empty() {
            return Err(Error::InUse(format!(
                "计算资源池 {} 中仍有 {} 个资源节点",
                name,
                pool.cells.len()
            )));
        }
        if !pool.instance_names.is_empty() {
            return Err(Error::InUse(format!("计算资源池 {} 中仍有云主机", name)));
        }
        self.pools.remove(name);
        info!("计算资源池已删除: {}", name);
        Ok(())
    }

    pub fn enable_pool(&mut self, name: &str) -> Result<()> {
        self.set_pool_enabled(name, true)
    }

    pub fn disable_pool(&mut self, name: &str) -> Result<()> {
        self.set_pool_enabled(name, false)
    }

    fn set_pool_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let pool = self.pool_mut(name)?;
        if pool.enabled == enabled {
            return Err(Error::NoChange(format!("计算资源池 {}", name)));
        }
        pool.enabled = enabled;
        info!("计算资源池 {} 已{}", name, if enabled { "启用" } else { "禁用" });
        Ok(())
    }

    /// 获取计算资源池列表（按名称排序）
    pub fn query_pools(&self) -> Vec<ComputePoolInfo> {
        let mut pools: Vec<ComputePoolInfo> = self.pools.values().map(ComputePool::info).collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
    }

    pub fn get_pool(&self, name: &str) -> Result<ComputePoolInfo> {
        Ok(self.pool(name)?.info())
    }

    /// 获取计算资源池状态（统计数据来自最近一次汇总）
    pub fn query_pool_status(&self) -> Vec<ComputePoolStatus> {
        let mut pools: Vec<ComputePoolStatus> = self
            .pools
            .values()
            .map(|pool| ComputePoolStatus {
                info: pool.info(),
                statistics: pool.statistics.clone(),
            })
            .collect();
        pools.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        pools
    }

    pub fn get_pool_status(&self, name: &str) -> Result<ComputePoolStatus> {
        let pool = self.pool(name)?;
        Ok(ComputePoolStatus {
            info: pool.info(),
            statistics: pool.statistics.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoragePool;
    use crate::state::testing::*;
    use common::models::StorageType;

    fn config(name: &str, storage: Option<&str>, failover: bool) -> ComputePoolConfig {
        ComputePoolConfig {
            name: name.to_string(),
            storage: storage.map(String::from),
            network: None,
            failover,
        }
    }

    fn add_storage(state: &mut ResourceState, name: &str) {
        state
            .create_storage_pool(StoragePool {
                name: name.to_string(),
                storage_type: StorageType::Nfs,
                host: "192.168.1.200".into(),
                target: "/export/vm".into(),
            })
            .unwrap();
    }

    #[test]
    fn test_failover_requires_shared_storage() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        let err = state.create_pool(config("p1", None, true)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        add_storage(&mut state, "s1");
        state.create_pool(config("p1", Some("s1"), true)).unwrap();
        assert!(state.get_pool("p1").unwrap().failover);
    }

    #[test]
    fn test_create_duplicate_and_unknown_reference() {
        let mut state = state_with_pool("p1");
        assert!(matches!(
            state.create_pool(config("p1", None, false)),
            Err(Error::AlreadyExists(_))
        ));
        assert!(state.create_pool(config("p2", Some("missing"), false)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_modify_pool() {
        let mut state = state_with_pool("p1");
        assert!(state.modify_pool(config("p1", None, false)).unwrap_err().is_no_change());

        add_storage(&mut state, "s1");
        state.modify_pool(config("p1", Some("s1"), true)).unwrap();
        let pool = state.get_pool("p1").unwrap();
        assert_eq!(pool.storage.as_deref(), Some("s1"));
        assert!(pool.failover);
    }

    #[test]
    fn test_modify_binding_with_instances() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        state
            .allocate_instance("p1", instance_config("vm-1", 1, 1, &[10]), chrono::Utc::now())
            .unwrap();
        add_storage(&mut state, "s1");
        assert!(matches!(
            state.modify_pool(config("p1", Some("s1"), false)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_delete_pool_with_cells() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        assert!(matches!(state.delete_pool("p1"), Err(Error::InUse(_))));

        state.remove_cell("p1", "cell-1").unwrap();
        state.delete_pool("p1").unwrap();
        assert!(state.query_pools().is_empty());
    }

    #[test]
    fn test_enable_disable() {
        let mut state = state_with_pool("p1");
        assert!(state.enable_pool("p1").unwrap_err().is_no_change());
        state.disable_pool("p1").unwrap();
        assert!(!state.get_pool("p1").unwrap().enabled);
        state.enable_pool("p1").unwrap();
        assert!(state.get_pool("p1").unwrap().enabled);
    }
}
