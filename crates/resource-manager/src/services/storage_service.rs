/// 共享存储池管理服务

use common::{Error, Result};
use tracing::info;

use crate::models::StoragePool;
use crate::state::ResourceState;

impl ResourceState {
    /// 创建存储池
    pub fn create_storage_pool(&mut self, config: StoragePool) -> Result<()> {
        if config.name.is_empty() {
            return Err(Error::InvalidArgument("存储池名称不能为空".to_string()));
        }
        if self.storage_pools.contains_key(&config.name) {
            return Err(Error::AlreadyExists(format!("存储池 {}", config.name)));
        }
        info!(
            "存储池已创建: name={}, type={}, host={}, target={}",
            config.name,
            config.storage_type.as_str(),
            config.host,
            config.target
        );
        self.storage_pools.insert(config.name.clone(), config);
        Ok(())
    }

    /// 修改存储池
    pub fn modify_storage_pool(&mut self, config: StoragePool) -> Result<()> {
        let current = self
            .storage_pools
            .get_mut(&config.name)
            .ok_or_else(|| Error::NotFound(format!("存储池 {}", config.name)))?;
        if *current == config {
            return Err(Error::NoChange(format!("存储池 {}", config.name)));
        }
        info!("存储池已修改: name={}, host={}, target={}", config.name, config.host, config.target);
        *current = config;
        Ok(())
    }

    /// 删除存储池，不能有计算资源池仍在使用
    pub fn delete_storage_pool(&mut self, name: &str) -> Result<()> {
        if !self.storage_pools.contains_key(name) {
            return Err(Error::NotFound(format!("存储池 {}", name)));
        }
        if let Some(pool) = self
            .pools
            .values()
            .find(|pool| pool.storage.as_deref() == Some(name))
        {
            return Err(Error::InUse(format!("存储池 {} 正被计算资源池 {} 使用", name, pool.name)));
        }
        self.storage_pools.remove(name);
        info!("存储池已删除: {}", name);
        Ok(())
    }

    pub fn query_storage_pools(&self) -> Vec<StoragePool> {
        let mut pools: Vec<StoragePool> = self.storage_pools.values().cloned().collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
    }

    pub fn get_storage_pool(&self, name: &str) -> Result<StoragePool> {
        self.storage_pools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("存储池 {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComputePoolConfig;
    use common::models::StorageType;

    fn nfs(name: &str, target: &str) -> StoragePool {
        StoragePool {
            name: name.to_string(),
            storage_type: StorageType::Nfs,
            host: "192.168.1.200".into(),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_storage_pool_lifecycle() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_storage_pool(nfs("s1", "/export/a")).unwrap();
        assert!(matches!(
            state.create_storage_pool(nfs("s1", "/export/a")),
            Err(Error::AlreadyExists(_))
        ));

        assert!(state.modify_storage_pool(nfs("s1", "/export/a")).unwrap_err().is_no_change());
        state.modify_storage_pool(nfs("s1", "/export/b")).unwrap();
        assert_eq!(state.get_storage_pool("s1").unwrap().target, "/export/b");

        state.delete_storage_pool("s1").unwrap();
        assert!(state.query_storage_pools().is_empty());
        assert!(state.delete_storage_pool("s1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_referenced_storage_pool() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_storage_pool(nfs("s1", "/export/a")).unwrap();
        state
            .create_pool(ComputePoolConfig {
                name: "p1".into(),
                storage: Some("s1".into()),
                network: None,
                failover: true,
            })
            .unwrap();
        assert!(matches!(state.delete_storage_pool("s1"), Err(Error::InUse(_))));

        state.delete_pool("p1").unwrap();
        state.delete_storage_pool("s1").unwrap();
    }
}
