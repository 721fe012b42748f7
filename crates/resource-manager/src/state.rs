/// 资源管理器内存状态
///
/// 仅由命令处理协程持有和修改，所有实体之间只通过名称或 ID 相互引用

use chrono::{DateTime, Utc};
use common::models::constants::DEFAULT_POOL_NAME;
use common::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use tracing::error;

use crate::models::*;

/// 云主机创建失败时记录的错误，供批量创建任务查询
#[derive(Debug, Clone)]
pub struct PendingError {
    pub message: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResourceState {
    pub(crate) zone: String,
    pub(crate) pools: HashMap<String, ComputePool>,
    pub(crate) cells: HashMap<String, Cell>,
    pub(crate) instances: HashMap<String, Instance>,
    pub(crate) storage_pools: HashMap<String, StoragePool>,
    pub(crate) address_pools: HashMap<String, AddressPool>,
    pub(crate) migrations: HashMap<String, Migration>,
    pub(crate) batch_tasks: HashMap<String, BatchTask>,
    pub(crate) templates: HashMap<String, SystemTemplate>,
    pub(crate) image_servers: BTreeMap<String, ImageServer>,
    pub(crate) pending_errors: HashMap<String, PendingError>,
    pub(crate) zone_statistics: ZoneStatistics,
    pub(crate) rng: StdRng,
}

impl ResourceState {
    /// 创建空状态
    pub fn new(zone: impl Into<String>, now: DateTime<Utc>) -> Self {
        let zone = zone.into();
        Self {
            zone_statistics: ZoneStatistics::new(zone.clone(), now),
            zone,
            pools: HashMap::new(),
            cells: HashMap::new(),
            instances: HashMap::new(),
            storage_pools: HashMap::new(),
            address_pools: HashMap::new(),
            migrations: HashMap::new(),
            batch_tasks: HashMap::new(),
            templates: HashMap::new(),
            image_servers: BTreeMap::new(),
            pending_errors: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// 首次启动的默认状态：一个默认计算资源池和内置系统模板
    pub fn with_defaults(zone: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut state = ResourceState::new(zone, now);
        let pool = ComputePool::new(ComputePoolConfig {
            name: DEFAULT_POOL_NAME.to_string(),
            storage: None,
            network: None,
            failover: false,
        });
        state.pools.insert(pool.name.clone(), pool);
        for template in builtin_templates(now) {
            state.templates.insert(template.id.clone(), template);
        }
        state
    }

    /// 替换地址探测使用的随机数发生器
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub(crate) fn pool(&self, name: &str) -> Result<&ComputePool> {
        self.pools
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("计算资源池 {}", name)))
    }

    pub(crate) fn pool_mut(&mut self, name: &str) -> Result<&mut ComputePool> {
        self.pools
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("计算资源池 {}", name)))
    }

    pub(crate) fn cell(&self, name: &str) -> Result<&Cell> {
        self.cells
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("资源节点 {}", name)))
    }

    pub(crate) fn cell_mut(&mut self, name: &str) -> Result<&mut Cell> {
        self.cells
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("资源节点 {}", name)))
    }

    pub(crate) fn instance(&self, id: &str) -> Result<&Instance> {
        self.instances
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("云主机 {}", id)))
    }

    pub(crate) fn instance_mut(&mut self, id: &str) -> Result<&mut Instance> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("云主机 {}", id)))
    }

    pub(crate) fn address_pool_mut(&mut self, name: &str) -> Result<&mut AddressPool> {
        self.address_pools
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("地址池 {}", name)))
    }

    /// 节点上已确认云主机的状态计数
    pub(crate) fn cell_instance_statistics(&self, cell: &Cell) -> InstanceStatistics {
        let mut statistics = InstanceStatistics::default();
        for id in &cell.instances {
            match self.instances.get(id) {
                Some(instance) => statistics.record(instance),
                None => {
                    corrupted(format!("节点 {} 引用了不存在的云主机 {}", cell.name, id));
                }
            }
        }
        statistics
    }

    pub(crate) fn cell_status(&self, cell: &Cell) -> CellStatus {
        CellStatus {
            name: cell.name.clone(),
            address: cell.address.clone(),
            pool: cell.pool.clone(),
            enabled: cell.enabled,
            alive: cell.alive,
            purge_appending: cell.purge_appending,
            latest_update: cell.latest_update,
            instances: self.cell_instance_statistics(cell),
            pending_instances: cell.pending_instances.len(),
            usage: cell.usage.clone(),
        }
    }
}

/// 记录内部状态不一致，返回内部错误
pub(crate) fn corrupted(detail: String) -> Error {
    error!("状态不一致: {}", detail);
    Error::Internal(detail)
}
