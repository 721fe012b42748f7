/// 资源状态持久化
///
/// 每次修改成功后将计算资源池、存储池、地址池和系统模板写入一个 JSON 文件，
/// 启动时完整加载。云主机不写入文件，由资源节点重新连接后上报重建。

use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::{
    AddressPool, AddressPoolConfig, AddressRangeConfig, AllocatedAddress, Cell, ComputePool,
    ComputePoolConfig, StoragePool, SystemTemplate,
};
use crate::state::ResourceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub enabled: bool,
    #[serde(default)]
    pub purge_appending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default)]
    pub failover: bool,
    #[serde(default)]
    pub cells: BTreeMap<String, CellSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub capacity: u32,
    #[serde(default)]
    pub allocated: Vec<AllocatedAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoolSnapshot {
    pub name: String,
    pub gateway: Ipv4Addr,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    #[serde(default)]
    pub ranges: Vec<RangeSnapshot>,
}

/// 持久化文件内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zone: String,
    #[serde(default)]
    pub pools: Vec<PoolSnapshot>,
    #[serde(default)]
    pub storage_pools: Vec<StoragePool>,
    #[serde(default)]
    pub address_pools: Vec<AddressPoolSnapshot>,
    #[serde(default)]
    pub system_templates: Vec<SystemTemplate>,
}

fn invalid(detail: String) -> Error {
    Error::Config(format!("持久化数据无效: {}", detail))
}

impl ZoneSnapshot {
    /// 从内存状态生成快照，列表按名称排序以保证输出稳定
    pub fn capture(state: &ResourceState) -> Self {
        let mut pools: Vec<PoolSnapshot> = state
            .pools
            .values()
            .map(|pool| PoolSnapshot {
                name: pool.name.clone(),
                enabled: pool.enabled,
                network: pool.network.clone(),
                storage: pool.storage.clone(),
                failover: pool.failover,
                cells: pool
                    .cells
                    .iter()
                    .filter_map(|name| state.cells.get(name))
                    .map(|cell| {
                        (
                            cell.name.clone(),
                            CellSnapshot {
                                enabled: cell.enabled,
                                purge_appending: cell.purge_appending,
                            },
                        )
                    })
                    .collect(),
            })
            .collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));

        let mut storage_pools: Vec<StoragePool> = state.storage_pools.values().cloned().collect();
        storage_pools.sort_by(|a, b| a.name.cmp(&b.name));

        let mut address_pools: Vec<AddressPoolSnapshot> = state
            .address_pools
            .values()
            .map(|pool| AddressPoolSnapshot {
                name: pool.name.clone(),
                gateway: pool.gateway,
                dns: pool.dns.clone(),
                ranges: pool
                    .ranges
                    .iter()
                    .map(|range| {
                        let status = range.status();
                        RangeSnapshot {
                            start: status.start,
                            end: status.end,
                            netmask: status.netmask,
                            capacity: status.capacity,
                            allocated: status.allocated,
                        }
                    })
                    .collect(),
            })
            .collect();
        address_pools.sort_by(|a, b| a.name.cmp(&b.name));

        let mut system_templates: Vec<SystemTemplate> = state.templates.values().cloned().collect();
        system_templates.sort_by(|a, b| a.config.name.cmp(&b.config.name));

        Self {
            zone: state.zone.clone(),
            pools,
            storage_pools,
            address_pools,
            system_templates,
        }
    }

    /// 重建内存状态并检查引用关系，节点在重新注册前处于离线状态
    pub fn restore(self, now: DateTime<Utc>) -> Result<ResourceState> {
        let mut state = ResourceState::new(self.zone, now);

        for storage in self.storage_pools {
            if state.storage_pools.contains_key(&storage.name) {
                return Err(invalid(format!("存储池 {} 重复", storage.name)));
            }
            state.storage_pools.insert(storage.name.clone(), storage);
        }

        for snapshot in self.address_pools {
            if state.address_pools.contains_key(&snapshot.name) {
                return Err(invalid(format!("地址池 {} 重复", snapshot.name)));
            }
            let mut pool = AddressPool::new(
                snapshot.name.clone(),
                AddressPoolConfig {
                    gateway: snapshot.gateway,
                    dns: snapshot.dns,
                },
            );
            for range in snapshot.ranges {
                let config = AddressRangeConfig {
                    start: range.start,
                    end: range.end,
                    netmask: range.netmask,
                };
                pool.add_range(config)
                    .map_err(|err| invalid(format!("地址池 {}: {}", snapshot.name, err)))?;
                let restored = pool
                    .ranges
                    .last_mut()
                    .ok_or_else(|| invalid(format!("地址池 {} 的地址段 {}", snapshot.name, range.start)))?;
                if restored.capacity != range.capacity {
                    warn!(
                        "地址段 {}-{} 的容量 {} 与记录 {} 不一致，已重新计算",
                        range.start, range.end, restored.capacity, range.capacity
                    );
                }
                for entry in range.allocated {
                    if !restored.contains(entry.address) {
                        return Err(invalid(format!(
                            "已分配地址 {} 不在地址段 {}-{} 内",
                            entry.address, range.start, range.end
                        )));
                    }
                    restored.allocated.insert(entry.address, entry.instance);
                }
            }
            state.address_pools.insert(pool.name.clone(), pool);
        }

        for snapshot in self.pools {
            if state.pools.contains_key(&snapshot.name) {
                return Err(invalid(format!("计算资源池 {} 重复", snapshot.name)));
            }
            if let Some(storage) = &snapshot.storage {
                if !state.storage_pools.contains_key(storage) {
                    return Err(invalid(format!(
                        "计算资源池 {} 引用了不存在的存储池 {}",
                        snapshot.name, storage
                    )));
                }
            }
            if let Some(network) = &snapshot.network {
                if !state.address_pools.contains_key(network) {
                    return Err(invalid(format!(
                        "计算资源池 {} 引用了不存在的地址池 {}",
                        snapshot.name, network
                    )));
                }
            }
            if snapshot.failover && snapshot.storage.is_none() {
                return Err(invalid(format!("计算资源池 {} 开启故障切换但没有共享存储", snapshot.name)));
            }

            let mut pool = ComputePool::new(ComputePoolConfig {
                name: snapshot.name.clone(),
                storage: snapshot.storage,
                network: snapshot.network,
                failover: snapshot.failover,
            });
            pool.enabled = snapshot.enabled;
            for (name, flags) in snapshot.cells {
                if let Some(existing) = state.cells.get(&name) {
                    return Err(invalid(format!(
                        "资源节点 {} 同时属于 {} 和 {}",
                        name, existing.pool, snapshot.name
                    )));
                }
                let mut cell = Cell::restored(name.clone(), snapshot.name.clone(), now);
                cell.enabled = flags.enabled;
                cell.purge_appending = flags.purge_appending;
                state.cells.insert(name.clone(), cell);
                pool.cells.insert(name);
            }
            state.pools.insert(pool.name.clone(), pool);
        }

        for template in self.system_templates {
            if state.templates.values().any(|t| t.config.name == template.config.name) {
                return Err(invalid(format!("系统模板 {} 重复", template.config.name)));
            }
            state.templates.insert(template.id.clone(), template);
        }
        Ok(state)
    }
}

/// 持久化文件读写
#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temporary_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }

    /// 加载持久化数据，文件不存在时生成默认数据并立即保存
    pub fn load_or_init(&self, zone: &str, now: DateTime<Utc>) -> Result<ResourceState> {
        if !self.path.exists() {
            let state = ResourceState::with_defaults(zone, now);
            self.save(&state)?;
            info!("未找到持久化数据，已生成默认配置: {}", self.path.display());
            return Ok(state);
        }

        let data = fs::read(&self.path)
            .map_err(|e| Error::Storage(format!("读取 {} 失败: {}", self.path.display(), e)))?;
        let snapshot: ZoneSnapshot = serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("解析 {} 失败: {}", self.path.display(), e)))?;
        if snapshot.zone != zone {
            warn!("持久化数据的可用区 {} 与配置 {} 不一致，以持久化数据为准", snapshot.zone, zone);
        }
        let state = snapshot.restore(now)?;
        info!(
            "已加载持久化数据: pools={}, cells={}, storage_pools={}, address_pools={}, templates={}",
            state.pools.len(),
            state.cells.len(),
            state.storage_pools.len(),
            state.address_pools.len(),
            state.templates.len()
        );
        Ok(state)
    }

    /// 写入临时文件后替换，避免留下不完整的文件
    pub fn save(&self, state: &ResourceState) -> Result<()> {
        let snapshot = ZoneSnapshot::capture(state);
        let data = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("创建目录 {} 失败: {}", parent.display(), e)))?;
            }
        }
        let temporary = self.temporary_path();
        fs::write(&temporary, data)
            .map_err(|e| Error::Storage(format!("写入 {} 失败: {}", temporary.display(), e)))?;
        fs::rename(&temporary, &self.path)
            .map_err(|e| Error::Storage(format!("保存 {} 失败: {}", self.path.display(), e)))?;
        Ok(())
    }
}
