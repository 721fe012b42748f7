/// 批量任务服务
///
/// 批量任务在创建时列出全部云主机，由执行方逐台回报结果，
/// 定时清理负责跟踪批量创建进度、超时结束以及过期删除

use chrono::{DateTime, Duration, Utc};
use common::models::constants::TASK_EXPIRE_TIMEOUT;
use common::models::BatchKind;
use common::utils::generate_id;
use common::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::models::{BatchGuest, BatchTarget, BatchTask};
use crate::state::ResourceState;

impl ResourceState {
    fn start_batch(
        &mut self,
        kind: BatchKind,
        pool: Option<String>,
        guests: Vec<BatchGuest>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if guests.is_empty() {
            return Err(Error::InvalidArgument("批量任务中没有云主机".to_string()));
        }
        let mut names = HashSet::new();
        for guest in &guests {
            if !names.insert(guest.name.as_str()) {
                return Err(Error::InvalidArgument(format!("批量任务中云主机 {} 重复", guest.name)));
            }
        }
        let id = generate_id();
        info!("批量{}任务已开始: id={}, guests={}", kind.as_str(), id, guests.len());
        self.batch_tasks
            .insert(id.clone(), BatchTask::new(&id, kind, pool, guests, now));
        Ok(id)
    }

    fn batch(&self, id: &str, kind: BatchKind) -> Result<&BatchTask> {
        self.batch_tasks
            .get(id)
            .filter(|task| task.kind == kind)
            .ok_or_else(|| Error::NotFound(format!("批量{}任务 {}", kind.as_str(), id)))
    }

    fn batch_mut(&mut self, id: &str, kind: BatchKind) -> Result<&mut BatchTask> {
        self.batch_tasks
            .get_mut(id)
            .filter(|task| task.kind == kind)
            .ok_or_else(|| Error::NotFound(format!("批量{}任务 {}", kind.as_str(), id)))
    }

    /// 更新单台云主机的结果，全部结束后任务完成
    fn update_batch_guest<F>(
        &mut self,
        id: &str,
        kind: BatchKind,
        guest: &str,
        now: DateTime<Utc>,
        update: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut BatchGuest),
    {
        let task = self.batch_mut(id, kind)?;
        if task.finished {
            return Err(Error::InvalidState(format!("批量任务 {} 已结束", id)));
        }
        let entry = match kind {
            BatchKind::Create => task.guest_by_name_mut(guest),
            BatchKind::Delete | BatchKind::Stop => task.guest_by_id_mut(guest),
        }
        .ok_or_else(|| Error::NotFound(format!("批量任务 {} 中的云主机 {}", id, guest)))?;
        if !entry.is_processing() {
            return Err(Error::InvalidState(format!("批量任务 {} 中的云主机 {} 已结束", id, guest)));
        }
        update(entry);

        task.latest_update = now;
        if !task.has_processing() {
            task.finished = true;
            info!("批量{}任务已完成: {}", kind.as_str(), id);
        }
        Ok(())
    }

    /// 批量创建，云主机在分配成功前只有名称
    pub fn start_batch_create(&mut self, pool: &str, names: Vec<String>, now: DateTime<Utc>) -> Result<String> {
        self.pool(pool)?;
        let guests = names
            .into_iter()
            .map(|name| BatchGuest::processing(name, None))
            .collect();
        self.start_batch(BatchKind::Create, Some(pool.to_string()), guests, now)
    }

    /// 记录批量创建中分配到的云主机 ID，之后由定时清理跟踪创建进度
    pub fn set_batch_create_guest_start(
        &mut self,
        batch: &str,
        name: &str,
        instance: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let task = self.batch_mut(batch, BatchKind::Create)?;
        if task.finished {
            return Err(Error::InvalidState(format!("批量任务 {} 已结束", batch)));
        }
        let guest = task
            .guest_by_name_mut(name)
            .ok_or_else(|| Error::NotFound(format!("批量任务 {} 中的云主机 {}", batch, name)))?;
        if !guest.is_processing() {
            return Err(Error::InvalidState(format!("批量任务 {} 中的云主机 {} 已结束", batch, name)));
        }
        guest.id = Some(instance.to_string());
        task.latest_update = now;
        Ok(())
    }

    pub fn set_batch_create_guest_fail(
        &mut self,
        batch: &str,
        name: &str,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.update_batch_guest(batch, BatchKind::Create, name, now, |guest| guest.fail(error))
    }

    pub fn get_batch_create_status(&self, batch: &str) -> Result<BatchTask> {
        self.batch(batch, BatchKind::Create).cloned()
    }

    pub fn start_batch_delete(&mut self, targets: Vec<BatchTarget>, now: DateTime<Utc>) -> Result<String> {
        self.start_batch(BatchKind::Delete, None, targets_to_guests(targets), now)
    }

    pub fn set_batch_delete_guest_success(&mut self, batch: &str, instance: &str, now: DateTime<Utc>) -> Result<()> {
        self.update_batch_guest(batch, BatchKind::Delete, instance, now, BatchGuest::succeed)
    }

    pub fn set_batch_delete_guest_fail(
        &mut self,
        batch: &str,
        instance: &str,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.update_batch_guest(batch, BatchKind::Delete, instance, now, |guest| guest.fail(error))
    }

    pub fn get_batch_delete_status(&self, batch: &str) -> Result<BatchTask> {
        self.batch(batch, BatchKind::Delete).cloned()
    }

    pub fn start_batch_stop(&mut self, targets: Vec<BatchTarget>, now: DateTime<Utc>) -> Result<String> {
        self.start_batch(BatchKind::Stop, None, targets_to_guests(targets), now)
    }

    pub fn set_batch_stop_guest_success(&mut self, batch: &str, instance: &str, now: DateTime<Utc>) -> Result<()> {
        self.update_batch_guest(batch, BatchKind::Stop, instance, now, BatchGuest::succeed)
    }

    pub fn set_batch_stop_guest_fail(
        &mut self,
        batch: &str,
        instance: &str,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.update_batch_guest(batch, BatchKind::Stop, instance, now, |guest| guest.fail(error))
    }

    pub fn get_batch_stop_status(&self, batch: &str) -> Result<BatchTask> {
        self.batch(batch, BatchKind::Stop).cloned()
    }

    /// 定时清理：跟踪批量创建进度，结束超时任务，删除过期的任务、迁移记录和创建错误
    pub fn sweep_batch_tasks(&mut self, now: DateTime<Utc>) {
        let expire = Duration::seconds(TASK_EXPIRE_TIMEOUT);

        for task in self.batch_tasks.values_mut() {
            if task.finished {
                continue;
            }
            let mut changed = false;
            if task.kind == BatchKind::Create {
                for guest in task.guests.iter_mut().filter(|g| g.is_processing()) {
                    let id = match &guest.id {
                        Some(id) => id.clone(),
                        None => continue,
                    };
                    if let Some(error) = self.pending_errors.remove(&id) {
                        guest.fail(error.message);
                        changed = true;
                        continue;
                    }
                    match self.instances.get(&id) {
                        Some(instance) if instance.created => {
                            guest.succeed();
                            changed = true;
                        }
                        Some(instance) => {
                            if guest.progress != instance.progress {
                                guest.progress = instance.progress;
                                changed = true;
                            }
                        }
                        None => {
                            guest.fail(format!("云主机 {} 已不存在", id));
                            changed = true;
                        }
                    }
                }
            }

            if changed {
                task.latest_update = now;
            }
            if !task.has_processing() {
                task.finished = true;
                info!("批量{}任务已完成: {}", task.kind.as_str(), task.id);
            } else if now - task.latest_update > expire {
                for guest in task.guests.iter_mut().filter(|g| g.is_processing()) {
                    guest.fail("任务超时");
                }
                task.finished = true;
                task.latest_update = now;
                warn!("批量{}任务超时结束: {}", task.kind.as_str(), task.id);
            }
        }

        let before = self.batch_tasks.len();
        self.batch_tasks
            .retain(|_, task| !(task.finished && now - task.latest_update > expire));
        let removed = before - self.batch_tasks.len();
        if removed > 0 {
            debug!("已删除 {} 个过期的批量任务", removed);
        }

        self.migrations
            .retain(|_, migration| !(migration.finished && now - migration.latest_update > expire));
        self.pending_errors.retain(|_, error| now - error.time <= expire);
    }
}

fn targets_to_guests(targets: Vec<BatchTarget>) -> Vec<BatchGuest> {
    targets
        .into_iter()
        .map(|target| BatchGuest::processing(target.name, Some(target.id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::*;
    use common::models::GuestTaskStatus;

    fn targets() -> Vec<BatchTarget> {
        vec![
            BatchTarget { id: "id-1".into(), name: "vm-1".into() },
            BatchTarget { id: "id-2".into(), name: "vm-2".into() },
        ]
    }

    #[test]
    fn test_start_batch_validation() {
        let mut state = state_with_pool("p1");
        assert!(state.start_batch_create("p1", vec![], Utc::now()).is_err());
        assert!(state
            .start_batch_create("p1", vec!["vm-1".into(), "vm-1".into()], Utc::now())
            .is_err());
        assert!(state.start_batch_create("p2", vec!["vm-1".into()], Utc::now()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_batch_delete_completes() {
        let mut state = state_with_pool("p1");
        let now = Utc::now();
        let id = state.start_batch_delete(targets(), now).unwrap();

        state.set_batch_delete_guest_success(&id, "id-1", now).unwrap();
        assert!(!state.get_batch_delete_status(&id).unwrap().finished);
        assert!(matches!(
            state.set_batch_delete_guest_success(&id, "id-1", now),
            Err(Error::InvalidState(_))
        ));

        state.set_batch_delete_guest_fail(&id, "id-2", "节点离线".into(), now).unwrap();
        let task = state.get_batch_delete_status(&id).unwrap();
        assert!(task.finished);
        assert_eq!(task.guests[1].status, GuestTaskStatus::Fail);

        // 不同类型的任务互不可见
        assert!(state.get_batch_stop_status(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_batch_create_follows_instances() {
        let mut state = state_with_pool("p1");
        join_cell(&mut state, "p1", "cell-1", usage(8, 0.0, 32, 500));
        let now = Utc::now();
        let batch = state
            .start_batch_create("p1", vec!["vm-1".into(), "vm-2".into(), "vm-3".into()], now)
            .unwrap();

        let first = state.allocate_instance("p1", instance_config("vm-1", 1, 1, &[10]), now).unwrap();
        let second = state.allocate_instance("p1", instance_config("vm-2", 1, 1, &[10]), now).unwrap();
        state.set_batch_create_guest_start(&batch, "vm-1", &first.id, now).unwrap();
        state.set_batch_create_guest_start(&batch, "vm-2", &second.id, now).unwrap();

        state.update_instance_progress(&first.id, 40).unwrap();
        state.sweep_batch_tasks(now);
        let task = state.get_batch_create_status(&batch).unwrap();
        assert_eq!(task.guests[0].progress, 40);
        assert!(!task.finished);

        state.confirm_instance(&first.id, 5901, String::new(), None).unwrap();
        state.deallocate_instance(&second.id, Some("磁盘创建失败".into()), now).unwrap();
        state.set_batch_create_guest_fail(&batch, "vm-3", "调度失败".into(), now).unwrap();
        state.sweep_batch_tasks(now);

        let task = state.get_batch_create_status(&batch).unwrap();
        assert!(task.finished);
        assert_eq!(task.guests[0].status, GuestTaskStatus::Success);
        assert_eq!(task.guests[1].status, GuestTaskStatus::Fail);
        assert_eq!(task.guests[1].error.as_deref(), Some("磁盘创建失败"));
        assert!(state.pending_errors.is_empty());
    }

    #[test]
    fn test_batch_converges_without_reports() {
        let mut state = state_with_pool("p1");
        let now = Utc::now();
        let id = state.start_batch_stop(targets(), now).unwrap();

        state.sweep_batch_tasks(now + Duration::seconds(10));
        assert!(!state.get_batch_stop_status(&id).unwrap().finished);

        let timeout = now + Duration::seconds(TASK_EXPIRE_TIMEOUT + 1);
        state.sweep_batch_tasks(timeout);
        let task = state.get_batch_stop_status(&id).unwrap();
        assert!(task.finished);
        assert!(task.guests.iter().all(|g| g.status == GuestTaskStatus::Fail));

        // 结束后保留一个过期周期
        state.sweep_batch_tasks(timeout + Duration::seconds(TASK_EXPIRE_TIMEOUT + 1));
        assert!(state.get_batch_stop_status(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_sweep_expires_errors_and_migrations() {
        let mut state = state_with_pool("p1");
        let now = Utc::now();
        state.pending_errors.insert(
            "id-1".into(),
            crate::state::PendingError {
                message: "失败".into(),
                time: now,
            },
        );
        state.sweep_batch_tasks(now + Duration::seconds(5));
        assert_eq!(state.pending_errors.len(), 1);
        state.sweep_batch_tasks(now + Duration::seconds(TASK_EXPIRE_TIMEOUT + 1));
        assert!(state.pending_errors.is_empty());
    }
}
