/// 云主机管理服务

use chrono::{DateTime, Utc};
use common::models::CpuPriority;
use common::utils::{generate_id, validate_mac_address};
use common::{Error, Result};
use tracing::{info, warn};

use crate::models::{Instance, InstanceConfig, InstanceReport};
use crate::scheduler::ResourceRequirement;
use crate::state::{corrupted, PendingError, ResourceState};

fn validate_instance_config(config: &InstanceConfig) -> Result<()> {
    if config.name.is_empty() {
        return Err(Error::InvalidArgument("云主机名称不能为空".to_string()));
    }
    if config.cores == 0 || config.memory == 0 {
        return Err(Error::InvalidArgument(format!("云主机 {} 的核心数和内存必须大于 0", config.name)));
    }
    if config.disks.is_empty() {
        return Err(Error::InvalidArgument(format!("云主机 {} 缺少系统盘", config.name)));
    }
    Ok(())
}

impl ResourceState {
    /// 为新云主机选择节点并分配地址，云主机在节点确认前处于待确认状态
    pub fn allocate_instance(
        &mut self,
        pool: &str,
        config: InstanceConfig,
        now: DateTime<Utc>,
    ) -> Result<Instance> {
        validate_instance_config(&config)?;
        let compute = self.pool(pool)?;
        if !compute.enabled {
            return Err(Error::InvalidState(format!("计算资源池 {} 已禁用", pool)));
        }
        if compute.instance_names.contains_key(&config.name) {
            return Err(Error::AlreadyExists(format!(
                "计算资源池 {} 中的云主机 {}",
                pool, config.name
            )));
        }
        let network = compute.network.clone();
        if let Some(template) = &config.template {
            if !self.templates.contains_key(template) {
                return Err(Error::NotFound(format!("系统模板 {}", template)));
            }
        }

        let requirement = ResourceRequirement::from(&config);
        let cell_name = self.select_cell(pool, &requirement, true)?;
        let monitor_address = self.cell(&cell_name)?.address.clone();

        let id = generate_id();
        let internal_address = match &network {
            Some(network) => Some(self.allocate_address(network, &id)?),
            None => None,
        };

        let mut instance = Instance::new(&id, pool, &cell_name, config, now);
        instance.network.monitor_address = monitor_address;
        instance.network.internal_address = internal_address;

        self.cell_mut(&cell_name)?.pending_instances.insert(id.clone());
        self.pool_mut(pool)?
            .instance_names
            .insert(instance.name.clone(), id.clone());
        self.instances.insert(id.clone(), instance.clone());

        info!(
            "云主机已分配: id={}, name={}, pool={}, cell={}, address={:?}",
            id, instance.name, pool, cell_name, internal_address
        );
        Ok(instance)
    }

    /// 节点创建完成后确认云主机
    pub fn confirm_instance(
        &mut self,
        id: &str,
        monitor_port: u32,
        monitor_secret: String,
        ethernet_address: Option<String>,
    ) -> Result<()> {
        if let Some(mac) = &ethernet_address {
            if !validate_mac_address(mac) {
                return Err(Error::InvalidArgument(format!("无效的 MAC 地址: {}", mac)));
            }
        }
        let cell_name = self.instance(id)?.cell.clone();
        let cell = match self.cells.get_mut(&cell_name) {
            Some(cell) => cell,
            None => return Err(corrupted(format!("云主机 {} 引用了不存在的资源节点 {}", id, cell_name))),
        };
        if !cell.pending_instances.remove(id) {
            return Err(Error::InvalidState(format!("云主机 {} 不是待确认状态", id)));
        }
        cell.instances.insert(id.to_string());
        let monitor_address = cell.address.clone();

        let instance = self.instance_mut(id)?;
        instance.created = true;
        instance.progress = 100;
        instance.network.monitor_address = monitor_address;
        instance.network.monitor_port = monitor_port;
        instance.network.monitor_secret = monitor_secret;
        instance.network.ethernet_address = ethernet_address;
        info!("云主机已确认: id={}, cell={}, monitor_port={}", id, cell_name, monitor_port);
        Ok(())
    }

    /// 释放云主机占用的全部资源，error 用于记录创建失败的原因
    pub fn deallocate_instance(
        &mut self,
        id: &str,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Instance> {
        let instance = self
            .instances
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("云主机 {}", id)))?;

        match self.cells.get_mut(&instance.cell) {
            Some(cell) => {
                if !cell.detach(id) {
                    corrupted(format!("资源节点 {} 上没有云主机 {}", cell.name, id));
                }
            }
            None => {
                corrupted(format!("云主机 {} 引用了不存在的资源节点 {}", id, instance.cell));
            }
        }

        let mut network = None;
        if let Some(pool) = self.pools.get_mut(&instance.pool) {
            if pool.instance_names.get(&instance.name).map(String::as_str) == Some(id) {
                pool.instance_names.remove(&instance.name);
            }
            network = pool.network.clone();
        }
        if let (Some(network), Some(address)) = (network, instance.network.internal_address) {
            if let Err(err) = self.release_address(&network, address, id) {
                warn!("释放云主机 {} 的地址 {} 失败: {}", id, address, err);
            }
        }

        if let Some(message) = error {
            warn!("云主机 {} 创建失败: {}", id, message);
            self.pending_errors
                .insert(id.to_string(), PendingError { message, time: now });
        }
        info!("云主机已释放: id={}, name={}, cell={}", id, instance.name, instance.cell);
        Ok(instance)
    }

    pub fn update_instance_status(&mut self, id: &str, running: bool) -> Result<()> {
        let instance = self.instance_mut(id)?;
        if instance.running == running {
            return Err(Error::NoChange(format!("云主机 {} 运行状态", id)));
        }
        instance.running = running;
        info!("云主机 {} 已{}", id, if running { "启动" } else { "停止" });
        Ok(())
    }

    /// 更新创建进度（0-100）
    pub fn update_instance_progress(&mut self, id: &str, progress: u32) -> Result<()> {
        let instance = self.instance_mut(id)?;
        if instance.created {
            return Err(Error::InvalidState(format!("云主机 {} 已创建完成", id)));
        }
        instance.progress = progress.min(100);
        Ok(())
    }

    /// 节点重新连接后上报其承载的云主机，未知的云主机在该节点上重新登记
    pub fn sync_cell_instances(
        &mut self,
        cell: &str,
        reports: Vec<InstanceReport>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let target = self.cell(cell)?;
        if !target.is_allocated() {
            return Err(Error::InvalidState(format!("资源节点 {} 未加入计算资源池", cell)));
        }
        let pool = target.pool.clone();
        let cell_address = target.address.clone();
        let network = self.pool(&pool)?.network.clone();

        let mut relearned = 0;
        for report in reports {
            if let Some(existing) = self.instances.get_mut(&report.id) {
                if existing.cell == cell {
                    existing.running = report.running;
                    if existing.lost {
                        info!("云主机 {} 已随资源节点 {} 恢复", existing.id, cell);
                        existing.lost = false;
                    }
                } else {
                    warn!(
                        "资源节点 {} 上报的云主机 {} 已登记在节点 {}",
                        cell, report.id, existing.cell
                    );
                }
                continue;
            }
            if let Some(other) = self.pool(&pool)?.instance_names.get(&report.name) {
                warn!(
                    "资源节点 {} 上报的云主机名称 {} 与 {} 冲突，已忽略",
                    cell, report.name, other
                );
                continue;
            }

            let mut instance = report.into_instance(&pool, cell, &cell_address, now);
            if let (Some(network), Some(address)) = (&network, instance.network.internal_address) {
                let reserved = self
                    .address_pool_mut(network)
                    .and_then(|addresses| addresses.reserve(address, &instance.id));
                if let Err(err) = reserved {
                    warn!("无法恢复云主机 {} 的地址 {}，已清除: {}", instance.id, address, err);
                    instance.network.internal_address = None;
                }
            }

            self.pool_mut(&pool)?
                .instance_names
                .insert(instance.name.clone(), instance.id.clone());
            self.cell_mut(cell)?.instances.insert(instance.id.clone());
            info!("云主机已重新登记: id={}, name={}, cell={}", instance.id, instance.name, cell);
            self.instances.insert(instance.id.clone(), instance);
            relearned += 1;
        }
        Ok(relearned)
    }

    /// 修改云主机名称，名称在计算资源池内唯一
    pub fn rename_instance(&mut self, id: &str, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("云主机名称不能为空".to_string()));
        }
        let instance = self.instance(id)?;
        if instance.name == name {
            return Err(Error::NoChange(format!("云主机 {} 名称", id)));
        }
        let old_name = instance.name.clone();
        let pool_name = instance.pool.clone();

        let pool = self.pool_mut(&pool_name)?;
        if pool.instance_names.contains_key(name) {
            return Err(Error::AlreadyExists(format!("计算资源池 {} 中的云主机 {}", pool_name, name)));
        }
        pool.instance_names.remove(&old_name);
        pool.instance_names.insert(name.to_string(), id.to_string());
        self.instance_mut(id)?.name = name.to_string();
        info!("云主机已改名: id={}, {} -> {}", id, old_name, name);
        Ok(())
    }

    pub fn update_instance_priority(&mut self, id: &str, priority: CpuPriority) -> Result<()> {
        let instance = self.instance_mut(id)?;
        if instance.qos.cpu_priority == priority {
            return Err(Error::NoChange(format!("云主机 {} CPU 优先级", id)));
        }
        instance.qos.cpu_priority = priority;
        info!("云主机 {} CPU 优先级已修改: {:?}", id, priority);
        Ok(())
    }

    pub fn update_instance_disk_threshold(
        &mut self,
        id: &str,
        read_speed: u64,
        read_iops: u64,
        write_speed: u64,
        write_iops: u64,
    ) -> Result<()> {
        let qos = &mut self.instance_mut(id)?.qos;
        if (qos.read_speed, qos.read_iops, qos.write_speed, qos.write_iops)
            == (read_speed, read_iops, write_speed, write_iops)
        {
            return Err(Error::NoChange(format!("云主机 {} 磁盘限速", id)));
        }
        qos.read_speed = read_speed;
        qos.read_iops = read_iops;
        qos.write_speed = write_speed;
        qos.write_iops = write_iops;
        info!(
            "云主机 {} 磁盘限速已修改: read={}/{}iops, write={}/{}iops",
            id, read_speed, read_iops, write_speed, write_iops
        );
        Ok(())
    }

    pub fn update_instance_network_threshold(
        &mut self,
        id: &str,
        receive_speed: u64,
        send_speed: u64,
    ) -> Result<()> {
        let qos = &mut self.instance_mut(id)?.qos;
        if qos.receive_speed == receive_speed && qos.send_speed == send_speed {
            return Err(Error::NoChange(format!("云主机 {} 网络限速", id)));
        }
        qos.receive_speed = receive_speed;
        qos.send_speed = send_speed;
        info!("云主机 {} 网络限速已修改: receive={}, send={}", id, receive_speed, send_speed);
        Ok(())
    }

    pub fn update_instance_monitor_secret(&mut self, id: &str, secret: String) -> Result<()> {
        let network = &mut self.instance_mut(id)?.network;
        if network.monitor_secret == secret {
            return Err(Error::NoChange(format!("云主机 {} 监控密码", id)));
        }
        network.monitor_secret = secret;
        info!("云主机 {} 监控密码已修改", id);
        Ok(())
    }

    pub fn get_instance(&self, id: &str) -> Result<Instance> {
        self.instance(id).cloned()
    }

    pub fn get_instance_by_name(&self, pool: &str, name: &str) -> Result<Instance> {
        let id = self
            .pool(pool)?
            .instance_names
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("计算资源池 {} 中的云主机 {}", pool, name)))?;
        self.instance(id).cloned()
    }

    /// 计算资源池中的全部云主机（按名称排序）
    pub fn query_instances_in_pool(&self, pool: &str) -> Result<Vec<Instance>> {
        let pool = self.pool(pool)?;
        let mut instances = Vec::with_capacity(pool.instance_names.len());
        for id in pool.instance_names.values() {
            match self.instances.get(id) {
                Some(instance) => instances.push(instance.clone()),
                None => return Err(corrupted(format!("计算资源池 {} 引用了不存在的云主机 {}", pool.name, id))),
            }
        }
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(instances)
    }

    pub fn query_instances_in_cell(&self, cell: &str) -> Result<Vec<Instance>> {
        let cell = self.cell(cell)?;
        let mut instances = Vec::new();
        for id in cell.all_instances() {
            match self.instances.get(&id) {
                Some(instance) => instances.push(instance.clone()),
                None => return Err(corrupted(format!("资源节点 {} 引用了不存在的云主机 {}", cell.name, id))),
            }
        }
        Ok(instances)
    }
}
