/// 地址池数据模型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// 创建/修改地址池的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoolConfig {
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
}

/// 新增地址段的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRangeConfig {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// 地址段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub capacity: u32,
    /// 已分配地址 -> 云主机 ID
    pub allocated: BTreeMap<Ipv4Addr, String>,
}

/// 地址池
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    pub name: String,
    pub gateway: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    /// 按添加顺序排列的内部地址段
    pub ranges: Vec<AddressRange>,
}

impl AddressPool {
    pub fn new(name: impl Into<String>, config: AddressPoolConfig) -> Self {
        Self {
            name: name.into(),
            gateway: config.gateway,
            dns: config.dns,
            ranges: Vec::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.ranges.iter().map(|r| u64::from(r.capacity)).sum()
    }

    pub fn allocated_count(&self) -> u64 {
        self.ranges.iter().map(|r| r.allocated.len() as u64).sum()
    }

    pub fn status(&self) -> AddressPoolStatus {
        AddressPoolStatus {
            name: self.name.clone(),
            gateway: self.gateway,
            dns: self.dns.clone(),
            ranges: self.ranges.len(),
            capacity: self.capacity(),
            allocated: self.allocated_count(),
        }
    }

    pub fn detail(&self) -> AddressPoolDetail {
        AddressPoolDetail {
            name: self.name.clone(),
            gateway: self.gateway,
            dns: self.dns.clone(),
            ranges: self.ranges.iter().map(AddressRange::status).collect(),
        }
    }
}

impl AddressRange {
    pub fn status(&self) -> AddressRangeStatus {
        AddressRangeStatus {
            start: self.start,
            end: self.end,
            netmask: self.netmask,
            capacity: self.capacity,
            allocated: self
                .allocated
                .iter()
                .map(|(address, instance)| AllocatedAddress {
                    address: *address,
                    instance: instance.clone(),
                })
                .collect(),
        }
    }
}

/// 已分配地址记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedAddress {
    pub address: Ipv4Addr,
    pub instance: String,
}

/// 地址池概要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoolStatus {
    pub name: String,
    pub gateway: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    pub ranges: usize,
    pub capacity: u64,
    pub allocated: u64,
}

/// 地址池详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoolDetail {
    pub name: String,
    pub gateway: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    pub ranges: Vec<AddressRangeStatus>,
}

/// 地址段视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRangeStatus {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub capacity: u32,
    pub allocated: Vec<AllocatedAddress>,
}
