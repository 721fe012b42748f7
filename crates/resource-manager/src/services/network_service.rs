/// 地址池管理服务

use common::models::AddressRangeType;
use common::{Error, Result};
use std::net::Ipv4Addr;
use tracing::info;

use crate::models::{
    AddressPool, AddressPoolConfig, AddressPoolDetail, AddressPoolStatus, AddressRangeConfig,
    AddressRangeStatus,
};
use crate::state::ResourceState;

/// 目前只支持内部地址段
fn ensure_internal(range_type: AddressRangeType) -> Result<()> {
    match range_type {
        AddressRangeType::Internal => Ok(()),
        AddressRangeType::External => Err(Error::InvalidArgument(format!(
            "不支持的地址段类型: {}",
            range_type.as_str()
        ))),
    }
}

impl ResourceState {
    fn address_pool(&self, name: &str) -> Result<&AddressPool> {
        self.address_pools
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("地址池 {}", name)))
    }

    /// 创建地址池
    pub fn create_address_pool(&mut self, name: &str, config: AddressPoolConfig) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("地址池名称不能为空".to_string()));
        }
        if self.address_pools.contains_key(name) {
            return Err(Error::AlreadyExists(format!("地址池 {}", name)));
        }
        info!("地址池已创建: name={}, gateway={}, dns={:?}", name, config.gateway, config.dns);
        self.address_pools
            .insert(name.to_string(), AddressPool::new(name, config));
        Ok(())
    }

    /// 修改地址池网关和 DNS
    pub fn modify_address_pool(&mut self, name: &str, config: AddressPoolConfig) -> Result<()> {
        let pool = self.address_pool_mut(name)?;
        if pool.gateway == config.gateway && pool.dns == config.dns {
            return Err(Error::NoChange(format!("地址池 {}", name)));
        }
        pool.gateway = config.gateway;
        pool.dns = config.dns;
        info!("地址池已修改: name={}, gateway={}, dns={:?}", name, pool.gateway, pool.dns);
        Ok(())
    }

    /// 删除地址池，不能有计算资源池引用且没有已分配地址
    pub fn delete_address_pool(&mut self, name: &str) -> Result<()> {
        let pool = self.address_pool(name)?;
        if let Some(compute) = self
            .pools
            .values()
            .find(|p| p.network.as_deref() == Some(name))
        {
            return Err(Error::InUse(format!("地址池 {} 正被计算资源池 {} 使用", name, compute.name)));
        }
        let allocated = pool.allocated_count();
        if allocated > 0 {
            return Err(Error::InUse(format!("地址池 {} 仍有 {} 个已分配地址", name, allocated)));
        }
        self.address_pools.remove(name);
        info!("地址池已删除: {}", name);
        Ok(())
    }

    pub fn query_address_pools(&self) -> Vec<AddressPoolStatus> {
        let mut pools: Vec<AddressPoolStatus> =
            self.address_pools.values().map(AddressPool::status).collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
    }

    pub fn get_address_pool(&self, name: &str) -> Result<AddressPoolDetail> {
        Ok(self.address_pool(name)?.detail())
    }

    pub fn query_address_ranges(
        &self,
        pool: &str,
        range_type: AddressRangeType,
    ) -> Result<Vec<AddressRangeStatus>> {
        ensure_internal(range_type)?;
        let pool = self.address_pool(pool)?;
        Ok(pool
            .ranges
            .iter()
            .map(|range| {
                let mut status = range.status();
                // 列表中只返回概要，分配明细通过 get_address_range 获取
                status.allocated.clear();
                status
            })
            .collect())
    }

    pub fn get_address_range(
        &self,
        pool: &str,
        range_type: AddressRangeType,
        start: Ipv4Addr,
    ) -> Result<AddressRangeStatus> {
        ensure_internal(range_type)?;
        Ok(self.address_pool(pool)?.range(start)?.status())
    }

    /// 添加地址段
    pub fn add_address_range(
        &mut self,
        pool: &str,
        range_type: AddressRangeType,
        config: AddressRangeConfig,
    ) -> Result<()> {
        ensure_internal(range_type)?;
        let address_pool = self.address_pool_mut(pool)?;
        let range = address_pool.add_range(config)?;
        info!(
            "地址段已添加: pool={}, range={}-{}, netmask={}, capacity={}",
            pool, range.start, range.end, range.netmask, range.capacity
        );
        Ok(())
    }

    /// 删除地址段
    pub fn remove_address_range(
        &mut self,
        pool: &str,
        range_type: AddressRangeType,
        start: Ipv4Addr,
    ) -> Result<()> {
        ensure_internal(range_type)?;
        let range = self.address_pool_mut(pool)?.remove_range(start)?;
        info!("地址段已删除: pool={}, range={}-{}", pool, range.start, range.end);
        Ok(())
    }

    /// 为云主机分配内部地址
    pub(crate) fn allocate_address(&mut self, pool: &str, instance: &str) -> Result<Ipv4Addr> {
        let address_pool = self
            .address_pools
            .get_mut(pool)
            .ok_or_else(|| Error::NotFound(format!("地址池 {}", pool)))?;
        let address = address_pool.allocate(&mut self.rng, instance)?;
        info!("地址已分配: pool={}, address={}, instance={}", pool, address, instance);
        Ok(address)
    }

    /// 释放云主机地址
    pub(crate) fn release_address(&mut self, pool: &str, address: Ipv4Addr, instance: &str) -> Result<()> {
        let address_pool = self.address_pool_mut(pool)?;
        if let Some(owner) = address_pool.owner(address) {
            if owner != instance {
                return Err(Error::InUse(format!(
                    "地址 {} 已分配给云主机 {}，不能由 {} 释放",
                    address, owner, instance
                )));
            }
        }
        address_pool.release(address)?;
        info!("地址已释放: pool={}, address={}", pool, address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComputePoolConfig;

    fn ip(value: &str) -> Ipv4Addr {
        value.parse().unwrap()
    }

    fn pool_config() -> AddressPoolConfig {
        AddressPoolConfig {
            gateway: ip("10.0.0.1"),
            dns: vec![ip("114.114.114.114")],
        }
    }

    fn range_config() -> AddressRangeConfig {
        AddressRangeConfig {
            start: ip("10.0.0.10"),
            end: ip("10.0.0.12"),
            netmask: ip("255.255.255.0"),
        }
    }

    #[test]
    fn test_external_range_rejected() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_address_pool("net-1", pool_config()).unwrap();
        let err = state
            .add_address_range("net-1", AddressRangeType::External, range_config())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_range_queries() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_address_pool("net-1", pool_config()).unwrap();
        state
            .add_address_range("net-1", AddressRangeType::Internal, range_config())
            .unwrap();
        let address = state.allocate_address("net-1", "vm-1").unwrap();

        let ranges = state.query_address_ranges("net-1", AddressRangeType::Internal).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].capacity, 3);

        let detail = state
            .get_address_range("net-1", AddressRangeType::Internal, ip("10.0.0.10"))
            .unwrap();
        assert_eq!(detail.allocated.len(), 1);
        assert_eq!(detail.allocated[0].address, address);

        let status = state.query_address_pools();
        assert_eq!(status[0].allocated, 1);
        assert_eq!(status[0].capacity, 3);
    }

    #[test]
    fn test_release_requires_owner() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_address_pool("net-1", pool_config()).unwrap();
        state
            .add_address_range("net-1", AddressRangeType::Internal, range_config())
            .unwrap();
        let address = state.allocate_address("net-1", "vm-1").unwrap();

        let err = state.release_address("net-1", address, "vm-2").unwrap_err();
        assert!(matches!(err, Error::InUse(_)));
        assert_eq!(state.address_pools["net-1"].owner(address), Some("vm-1"));

        state.release_address("net-1", address, "vm-1").unwrap();
        assert_eq!(state.address_pools["net-1"].owner(address), None);
    }

    #[test]
    fn test_delete_address_pool_dependents() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_address_pool("net-1", pool_config()).unwrap();
        state
            .add_address_range("net-1", AddressRangeType::Internal, range_config())
            .unwrap();
        state
            .create_pool(ComputePoolConfig {
                name: "p1".into(),
                storage: None,
                network: Some("net-1".into()),
                failover: false,
            })
            .unwrap();
        assert!(matches!(state.delete_address_pool("net-1"), Err(Error::InUse(_))));

        state.delete_pool("p1").unwrap();
        let address = state.allocate_address("net-1", "vm-1").unwrap();
        assert!(matches!(state.delete_address_pool("net-1"), Err(Error::InUse(_))));

        state.release_address("net-1", address, "vm-1").unwrap();
        state.delete_address_pool("net-1").unwrap();
        assert!(state.query_address_pools().is_empty());
    }

    #[test]
    fn test_modify_address_pool() {
        let mut state = ResourceState::new("zone", chrono::Utc::now());
        state.create_address_pool("net-1", pool_config()).unwrap();
        assert!(state.modify_address_pool("net-1", pool_config()).unwrap_err().is_no_change());

        let mut changed = pool_config();
        changed.dns.push(ip("8.8.8.8"));
        state.modify_address_pool("net-1", changed).unwrap();
        assert_eq!(state.get_address_pool("net-1").unwrap().dns.len(), 2);
    }
}
