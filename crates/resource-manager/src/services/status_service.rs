/// 状态汇总服务

use chrono::{DateTime, Duration, Utc};
use common::models::constants::CELL_LOST_TIMEOUT;
use tracing::{debug, warn};

use crate::models::{PoolStatistics, ZoneStatistics};
use crate::state::{corrupted, ResourceState};

impl ResourceState {
    /// 重新汇总计算资源池和可用区统计，返回本轮新发现的失联节点
    pub fn update_statistics(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = Duration::seconds(CELL_LOST_TIMEOUT);
        let mut lost = Vec::new();
        for cell in self.cells.values_mut() {
            if cell.alive && now - cell.latest_update > timeout {
                cell.alive = false;
                warn!(
                    "资源节点失联: name={}, 最后上报时间={}",
                    cell.name,
                    cell.latest_update.format("%Y-%m-%d %H:%M:%S")
                );
                lost.push(cell.name.clone());
            }
        }
        lost.sort();

        self.zone_statistics.reset();
        let mut computed = Vec::with_capacity(self.pools.len());
        for pool in self.pools.values() {
            let mut statistics = PoolStatistics::default();
            for name in &pool.cells {
                let cell = match self.cells.get(name) {
                    Some(cell) => cell,
                    None => {
                        corrupted(format!("计算资源池 {} 引用了不存在的资源节点 {}", pool.name, name));
                        continue;
                    }
                };
                if !cell.alive {
                    statistics.offline_cells += 1;
                    continue;
                }
                statistics.online_cells += 1;
                statistics.resources.fold(&cell.usage);
                statistics.instances.merge(&self.cell_instance_statistics(cell));
            }
            computed.push((pool.name.clone(), pool.enabled, statistics));
        }

        for (name, enabled, statistics) in computed {
            if enabled {
                self.zone_statistics.enabled_pools += 1;
            } else {
                self.zone_statistics.disabled_pools += 1;
            }
            self.zone_statistics.merge(&statistics);
            if let Some(pool) = self.pools.get_mut(&name) {
                pool.statistics = statistics;
            }
        }

        let zone = &self.zone_statistics;
        debug!(
            "统计已更新: pools={}/{}, cells={}/{}, instances={}, cpu={:.1}%",
            zone.enabled_pools,
            zone.enabled_pools + zone.disabled_pools,
            zone.online_cells,
            zone.online_cells + zone.offline_cells,
            zone.instances.total(),
            zone.resources.cpu_usage()
        );
        lost
    }

    pub fn get_zone_status(&self) -> ZoneStatistics {
        self.zone_statistics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellStatusReport, ComputePoolConfig};
    use crate::state::testing::*;

    #[test]
    fn test_lost_cells_detected() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 50.0, 32, 500));
        join_cell(&mut state, "p1", "cell-2", usage(8, 0.0, 32, 500));
        state.register_cell("cell-3", "192.168.0.30", Utc::now()).unwrap();
        let now = Utc::now();

        state
            .update_cell_status(
                CellStatusReport {
                    name: "cell-2".into(),
                    usage: usage(8, 0.0, 32, 500),
                },
                now + Duration::seconds(8),
            )
            .unwrap();

        let lost = state.update_statistics(now + Duration::seconds(11));
        assert_eq!(lost, vec!["cell-1".to_string(), "cell-3".to_string()]);

        let pool = state.get_pool_status("p1").unwrap();
        assert_eq!(pool.statistics.online_cells, 1);
        assert_eq!(pool.statistics.offline_cells, 1);
        assert_eq!(pool.statistics.resources.cores, 8);

        // 已离线的节点不会再次上报为失联
        assert!(state.update_statistics(now + Duration::seconds(12)).is_empty());
    }

    #[test]
    fn test_zone_rollup() {
        let mut state = state_with_pool("p1");
        state
            .create_pool(ComputePoolConfig {
                name: "p2".into(),
                storage: None,
                network: None,
                failover: false,
            })
            .unwrap();
        state.disable_pool("p2").unwrap();
        join_cell(&mut state, "p1", "cell-1", usage(8, 50.0, 32, 500));
        join_cell(&mut state, "p2", "cell-2", usage(8, 0.0, 16, 500));

        let instance = state
            .allocate_instance("p1", instance_config("vm-1", 1, 1, &[10]), Utc::now())
            .unwrap();
        state.confirm_instance(&instance.id, 5901, String::new(), None).unwrap();
        state.update_instance_status(&instance.id, true).unwrap();

        assert!(state.update_statistics(Utc::now()).is_empty());
        let zone = state.get_zone_status();
        assert_eq!(zone.name, "zone-test");
        assert_eq!(zone.enabled_pools, 1);
        assert_eq!(zone.disabled_pools, 1);
        assert_eq!(zone.online_cells, 2);
        assert_eq!(zone.instances.running, 1);
        assert_eq!(zone.resources.cores, 16);
        assert_eq!(zone.resources.memory, 48 * GB);
        assert!((zone.resources.cpu_usage() - 25.0).abs() < 1e-9);

        // 每轮重新计算，不会累加
        state.update_statistics(Utc::now());
        assert_eq!(state.get_zone_status().online_cells, 2);
    }
}
