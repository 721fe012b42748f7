/// 地址分配（IPAM）
///
/// 地址池由若干互不重叠的内部地址段组成，分配时按添加顺序遍历地址段，
/// 在段内从随机偏移开始向后探测空闲地址，避免总是返回最小的空闲地址

use common::utils::same_subnet;
use common::{Error, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::models::{AddressPool, AddressRange, AddressRangeConfig};

impl AddressRange {
    pub fn new(config: AddressRangeConfig) -> Result<Self> {
        let start = u32::from(config.start);
        let end = u32::from(config.end);
        if start > end {
            return Err(Error::InvalidArgument(format!(
                "起始地址 {} 大于结束地址 {}",
                config.start, config.end
            )));
        }
        if !same_subnet(config.start, config.end, config.netmask) {
            return Err(Error::InvalidArgument(format!(
                "结束地址 {} 不在网段 {}/{} 内",
                config.end, config.start, config.netmask
            )));
        }
        let capacity = (end - start)
            .checked_add(1)
            .ok_or_else(|| Error::InvalidArgument("地址段过大".to_string()))?;
        Ok(Self {
            start: config.start,
            end: config.end,
            netmask: config.netmask,
            capacity,
            allocated: BTreeMap::new(),
        })
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        let value = u32::from(address);
        u32::from(self.start) <= value && value <= u32::from(self.end)
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        u32::from(self.start) <= u32::from(other.end) && u32::from(other.start) <= u32::from(self.end)
    }

    pub fn is_full(&self) -> bool {
        self.allocated.len() as u64 >= u64::from(self.capacity)
    }

    /// 从 offset 开始向后（回绕）探测第一个空闲地址
    fn probe(&self, offset: u32) -> Option<Ipv4Addr> {
        let base = u32::from(self.start);
        let capacity = u64::from(self.capacity);
        (0..capacity)
            .map(|step| Ipv4Addr::from(base + ((u64::from(offset) + step) % capacity) as u32))
            .find(|address| !self.allocated.contains_key(address))
    }
}

impl AddressPool {
    /// 新增地址段，不能与已有地址段重叠
    pub fn add_range(&mut self, config: AddressRangeConfig) -> Result<&AddressRange> {
        let range = AddressRange::new(config)?;
        if let Some(existing) = self.ranges.iter().find(|r| r.overlaps(&range)) {
            return Err(Error::InvalidArgument(format!(
                "地址段 {}-{} 与已有地址段 {}-{} 重叠",
                range.start, range.end, existing.start, existing.end
            )));
        }
        self.ranges.push(range);
        Ok(&self.ranges[self.ranges.len() - 1])
    }

    /// 删除地址段，段内不能有已分配地址
    pub fn remove_range(&mut self, start: Ipv4Addr) -> Result<AddressRange> {
        let index = self
            .ranges
            .iter()
            .position(|r| r.start == start)
            .ok_or_else(|| Error::NotFound(format!("地址池 {} 中的地址段 {}", self.name, start)))?;
        let range = &self.ranges[index];
        if !range.allocated.is_empty() {
            return Err(Error::InUse(format!(
                "地址段 {} 仍有 {} 个已分配地址",
                start,
                range.allocated.len()
            )));
        }
        Ok(self.ranges.remove(index))
    }

    pub fn range(&self, start: Ipv4Addr) -> Result<&AddressRange> {
        self.ranges
            .iter()
            .find(|r| r.start == start)
            .ok_or_else(|| Error::NotFound(format!("地址池 {} 中的地址段 {}", self.name, start)))
    }

    /// 为云主机分配一个地址
    pub fn allocate<R: Rng>(&mut self, rng: &mut R, instance: &str) -> Result<Ipv4Addr> {
        for range in self.ranges.iter_mut() {
            if range.is_full() {
                continue;
            }
            let offset = rng.gen_range(0..range.capacity);
            if let Some(address) = range.probe(offset) {
                range.allocated.insert(address, instance.to_string());
                return Ok(address);
            }
        }
        Err(Error::InsufficientResource(format!("地址池 {} 没有可用的地址", self.name)))
    }

    /// 释放地址，返回原先占用该地址的云主机 ID
    pub fn release(&mut self, address: Ipv4Addr) -> Result<String> {
        self.ranges
            .iter_mut()
            .find_map(|range| range.allocated.remove(&address))
            .ok_or_else(|| Error::NotFound(format!("地址池 {} 中未分配地址 {}", self.name, address)))
    }

    /// 占用指定地址（节点上报已有云主机时恢复分配记录）
    pub fn reserve(&mut self, address: Ipv4Addr, instance: &str) -> Result<()> {
        let range = self
            .ranges
            .iter_mut()
            .find(|r| r.contains(address))
            .ok_or_else(|| Error::NotFound(format!("地址 {} 不属于地址池 {}", address, self.name)))?;
        match range.allocated.get(&address) {
            Some(owner) if owner == instance => Ok(()),
            Some(owner) => Err(Error::InUse(format!("地址 {} 已分配给云主机 {}", address, owner))),
            None => {
                range.allocated.insert(address, instance.to_string());
                Ok(())
            }
        }
    }

    /// 查找地址的占用者
    pub fn owner(&self, address: Ipv4Addr) -> Option<&str> {
        self.ranges
            .iter()
            .find_map(|range| range.allocated.get(&address))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressPoolConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn ip(value: &str) -> Ipv4Addr {
        value.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> AddressRangeConfig {
        AddressRangeConfig {
            start: ip(start),
            end: ip(end),
            netmask: ip("255.255.255.0"),
        }
    }

    fn pool() -> AddressPool {
        AddressPool::new(
            "net-1",
            AddressPoolConfig {
                gateway: ip("10.0.0.1"),
                dns: vec![ip("8.8.8.8")],
            },
        )
    }

    #[test]
    fn test_range_validation() {
        let mut pool = pool();
        assert!(pool.add_range(range("10.0.0.20", "10.0.0.10")).is_err());
        assert!(pool.add_range(range("10.0.0.10", "10.0.1.10")).is_err());

        let added = pool.add_range(range("10.0.0.10", "10.0.0.12")).unwrap();
        assert_eq!(added.capacity, 3);

        // 与已有地址段重叠
        assert!(pool.add_range(range("10.0.0.12", "10.0.0.20")).is_err());
        assert!(pool.add_range(range("10.0.0.5", "10.0.0.10")).is_err());
        assert!(pool.add_range(range("10.0.0.13", "10.0.0.20")).is_ok());
        assert_eq!(pool.capacity(), 11);
    }

    #[test]
    fn test_allocate_until_exhausted_then_reuse() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut pool = pool();
        pool.add_range(range("10.0.0.10", "10.0.0.12")).unwrap();

        let mut allocated = HashSet::new();
        for i in 0..3 {
            let address = pool.allocate(&mut rng, &format!("vm-{}", i)).unwrap();
            assert!(allocated.insert(address));
        }
        assert_eq!(pool.allocated_count(), 3);

        let err = pool.allocate(&mut rng, "vm-3").unwrap_err();
        assert!(matches!(err, Error::InsufficientResource(_)));

        let freed = ip("10.0.0.11");
        let owner = pool.release(freed).unwrap();
        assert!(owner.starts_with("vm-"));
        assert_eq!(pool.allocate(&mut rng, "vm-3").unwrap(), freed);
        assert_eq!(pool.owner(freed), Some("vm-3"));
    }

    #[test]
    fn test_allocate_skips_full_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = pool();
        pool.add_range(range("10.0.0.10", "10.0.0.10")).unwrap();
        pool.add_range(range("10.0.0.50", "10.0.0.59")).unwrap();

        assert_eq!(pool.allocate(&mut rng, "vm-0").unwrap(), ip("10.0.0.10"));
        let second = pool.allocate(&mut rng, "vm-1").unwrap();
        assert!(pool.ranges[1].contains(second));
    }

    #[test]
    fn test_allocation_conservation() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut pool = pool();
        pool.add_range(range("10.0.0.100", "10.0.0.199")).unwrap();
        pool.allocate(&mut rng, "vm-a").unwrap();

        let before = pool.allocated_count();
        let address = pool.allocate(&mut rng, "vm-b").unwrap();
        pool.release(address).unwrap();
        assert_eq!(pool.allocated_count(), before);
    }

    #[test]
    fn test_release_unknown_address() {
        let mut pool = pool();
        pool.add_range(range("10.0.0.10", "10.0.0.12")).unwrap();
        assert!(pool.release(ip("10.0.0.11")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_reserve() {
        let mut pool = pool();
        pool.add_range(range("10.0.0.10", "10.0.0.12")).unwrap();
        pool.reserve(ip("10.0.0.12"), "vm-1").unwrap();
        pool.reserve(ip("10.0.0.12"), "vm-1").unwrap();
        assert!(matches!(pool.reserve(ip("10.0.0.12"), "vm-2"), Err(Error::InUse(_))));
        assert!(pool.reserve(ip("10.0.1.1"), "vm-2").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_range_with_allocations() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = pool();
        pool.add_range(range("10.0.0.10", "10.0.0.12")).unwrap();
        let address = pool.allocate(&mut rng, "vm-1").unwrap();
        assert!(matches!(pool.remove_range(ip("10.0.0.10")), Err(Error::InUse(_))));
        pool.release(address).unwrap();
        assert!(pool.remove_range(ip("10.0.0.10")).is_ok());
        assert!(pool.ranges.is_empty());
    }
}
