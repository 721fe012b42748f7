/// 云主机调度
///
/// 每个候选节点计算两项得分并取平均值：
/// - 实时容量：节点上报的可用核心、内存、磁盘与需求的比值
/// - 配置容量：按节点额定资源的超分上限，扣除节点上全部云主机已配置的资源
///
/// 两项得分均按 核心 2 : 内存 1.5 : 磁盘 1 加权，得分相同时选择名称最小的节点

use common::models::constants::{MAX_CPU_USAGE_PERCENT, OVERCOMMIT_FACTOR};
use common::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{Cell, Instance, InstanceConfig};
use crate::state::{corrupted, ResourceState};

const CORE_WEIGHT: f64 = 2.0;
const MEMORY_WEIGHT: f64 = 1.5;
const DISK_WEIGHT: f64 = 1.0;

/// 调度需求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequirement {
    pub cores: u32,
    pub memory: u64,
    pub disks: Vec<u64>,
}

impl ResourceRequirement {
    pub fn total_disk(&self) -> u64 {
        self.disks.iter().sum()
    }
}

impl From<&InstanceConfig> for ResourceRequirement {
    fn from(config: &InstanceConfig) -> Self {
        Self {
            cores: config.cores,
            memory: config.memory,
            disks: config.disks.clone(),
        }
    }
}

impl From<&Instance> for ResourceRequirement {
    fn from(instance: &Instance) -> Self {
        Self {
            cores: instance.cores,
            memory: instance.memory,
            disks: instance.disks.clone(),
        }
    }
}

/// 节点上已配置（而非实际使用）的资源总量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfiguredLoad {
    pub cores: u64,
    pub memory: u64,
    pub disk: u64,
}

impl ConfiguredLoad {
    pub fn add(&mut self, requirement: &ResourceRequirement) {
        self.cores += u64::from(requirement.cores);
        self.memory += requirement.memory;
        self.disk += requirement.total_disk();
    }

    fn merge(&self, other: &ConfiguredLoad) -> ConfiguredLoad {
        ConfiguredLoad {
            cores: self.cores + other.cores,
            memory: self.memory + other.memory,
            disk: self.disk + other.disk,
        }
    }
}

/// 需求为 0 时该项对所有节点取相同的值 1
fn ratio(available: f64, required: f64) -> f64 {
    if required > 0.0 {
        available / required
    } else {
        1.0
    }
}

fn weighted_score(cores: f64, memory: f64, disk: f64, requirement: &ResourceRequirement) -> f64 {
    CORE_WEIGHT * ratio(cores, requirement.cores as f64)
        + MEMORY_WEIGHT * ratio(memory, requirement.memory as f64)
        + DISK_WEIGHT * ratio(disk, requirement.total_disk() as f64)
}

/// 节点是否满足需求的硬性条件
fn fulfills(cell: &Cell, requirement: &ResourceRequirement) -> bool {
    cell.usage.cpu_usage <= MAX_CPU_USAGE_PERCENT
        && cell.usage.disk_available >= requirement.total_disk()
        && cell.usage.memory_available >= requirement.memory
}

fn realtime_score(cell: &Cell, requirement: &ResourceRequirement) -> f64 {
    weighted_score(
        cell.usage.available_cores(),
        cell.usage.memory_available as f64,
        cell.usage.disk_available as f64,
        requirement,
    )
}

fn configured_score(cell: &Cell, load: &ConfiguredLoad, requirement: &ResourceRequirement) -> f64 {
    let cores = (u64::from(cell.usage.cores) * OVERCOMMIT_FACTOR).saturating_sub(load.cores);
    let memory = cell.usage.memory.saturating_mul(OVERCOMMIT_FACTOR).saturating_sub(load.memory);
    let disk = cell.usage.disk.saturating_mul(OVERCOMMIT_FACTOR).saturating_sub(load.disk);
    weighted_score(cores as f64, memory as f64, disk as f64, requirement)
}

impl ResourceState {
    /// 节点上全部云主机（含待确认）的配置资源
    pub(crate) fn configured_load(&self, cell: &Cell) -> ConfiguredLoad {
        let mut load = ConfiguredLoad::default();
        for id in cell.instances.iter().chain(cell.pending_instances.iter()) {
            if let Some(instance) = self.instances.get(id) {
                load.add(&ResourceRequirement::from(instance));
            }
        }
        load
    }

    /// 在计算资源池中为需求选择最合适的节点
    pub fn select_cell(
        &self,
        pool: &str,
        requirement: &ResourceRequirement,
        must_fulfill: bool,
    ) -> Result<String> {
        self.select_cell_with(pool, requirement, must_fulfill, &HashMap::new())
    }

    /// reserved 记录本轮调度中已计划但尚未落到节点上的资源
    pub(crate) fn select_cell_with(
        &self,
        pool: &str,
        requirement: &ResourceRequirement,
        must_fulfill: bool,
        reserved: &HashMap<String, ConfiguredLoad>,
    ) -> Result<String> {
        let pool = self.pool(pool)?;
        let mut best: Option<(&str, f64)> = None;

        for name in &pool.cells {
            let cell = match self.cells.get(name) {
                Some(cell) => cell,
                None => {
                    return Err(corrupted(format!(
                        "计算资源池 {} 引用了不存在的资源节点 {}",
                        pool.name, name
                    )));
                }
            };
            if !cell.is_available() {
                continue;
            }
            if must_fulfill && !fulfills(cell, requirement) {
                debug!("资源节点 {} 不满足调度需求", name);
                continue;
            }

            let mut load = self.configured_load(cell);
            if let Some(extra) = reserved.get(name) {
                load = load.merge(extra);
            }
            let score = (realtime_score(cell, requirement) + configured_score(cell, &load, requirement)) / 2.0;
            debug!("调度评分: cell={}, score={:.3}", name, score);

            // 节点名称有序，只有更高的得分才替换当前选择
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((name.as_str(), score)),
            }
        }

        match best {
            Some((name, score)) if score > 0.0 => Ok(name.to_string()),
            _ => Err(Error::InsufficientResource(format!(
                "计算资源池 {} 中没有满足需求的资源节点",
                pool.name
            ))),
        }
    }
}
