/// 批量任务数据模型

use chrono::{DateTime, Utc};
use common::models::{BatchKind, GuestTaskStatus};
use serde::{Deserialize, Serialize};

/// 批量任务中的单台云主机
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchGuest {
    pub name: String,
    /// 批量创建时在分配成功后才有 ID
    pub id: Option<String>,
    pub status: GuestTaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: u32,
}

impl BatchGuest {
    pub fn processing(name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            name: name.into(),
            id,
            status: GuestTaskStatus::Processing,
            error: None,
            progress: 0,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.status == GuestTaskStatus::Processing
    }

    pub fn succeed(&mut self) {
        self.status = GuestTaskStatus::Success;
        self.progress = 100;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = GuestTaskStatus::Fail;
        self.error = Some(error.into());
    }
}

/// 需要删除/停止的云主机
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTarget {
    pub id: String,
    pub name: String,
}

/// 批量任务（创建/删除/停止）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTask {
    pub id: String,
    pub kind: BatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    pub start_time: DateTime<Utc>,
    pub latest_update: DateTime<Utc>,
    pub finished: bool,
    pub guests: Vec<BatchGuest>,
}

impl BatchTask {
    pub fn new(
        id: impl Into<String>,
        kind: BatchKind,
        pool: Option<String>,
        guests: Vec<BatchGuest>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            pool,
            start_time: now,
            latest_update: now,
            finished: false,
            guests,
        }
    }

    pub fn has_processing(&self) -> bool {
        self.guests.iter().any(BatchGuest::is_processing)
    }

    pub fn guest_by_name_mut(&mut self, name: &str) -> Option<&mut BatchGuest> {
        self.guests.iter_mut().find(|g| g.name == name)
    }

    pub fn guest_by_id_mut(&mut self, id: &str) -> Option<&mut BatchGuest> {
        self.guests.iter_mut().find(|g| g.id.as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_transitions() {
        let mut guest = BatchGuest::processing("vm-1", None);
        assert!(guest.is_processing());
        guest.fail("磁盘不足");
        assert_eq!(guest.status, GuestTaskStatus::Fail);
        assert_eq!(guest.error.as_deref(), Some("磁盘不足"));
        guest.succeed();
        assert_eq!(guest.status, GuestTaskStatus::Success);
        assert!(guest.error.is_none());
    }

    #[test]
    fn test_task_lookup() {
        let guests = vec![
            BatchGuest::processing("vm-1", Some("id-1".into())),
            BatchGuest::processing("vm-2", Some("id-2".into())),
        ];
        let mut task = BatchTask::new("batch-1", BatchKind::Delete, None, guests, Utc::now());
        task.guest_by_id_mut("id-2").unwrap().succeed();
        assert!(task.has_processing());
        task.guest_by_name_mut("vm-1").unwrap().succeed();
        assert!(!task.has_processing());
    }
}
