/// 共享数据模型
///
/// 定义资源管理器与任务执行组件共享的枚举和常量

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// 共享存储类型（目前仅支持 NFS）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Nfs,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Nfs => "nfs",
        }
    }
}

impl FromStr for StorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nfs" => Ok(StorageType::Nfs),
            _ => Err(Error::InvalidArgument(format!("不支持的存储类型: {}", s))),
        }
    }
}

/// 地址段类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AddressRangeType {
    Internal,
    External,
}

impl AddressRangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressRangeType::Internal => "internal",
            AddressRangeType::External => "external",
        }
    }
}

impl FromStr for AddressRangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(AddressRangeType::Internal),
            "external" => Ok(AddressRangeType::External),
            _ => Err(Error::InvalidArgument(format!("无效的地址段类型: {}", s))),
        }
    }
}

/// 云主机 CPU 优先级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CpuPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// 批量任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Create,
    Delete,
    Stop,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Create => "create",
            BatchKind::Delete => "delete",
            BatchKind::Stop => "stop",
        }
    }
}

/// 批量任务中单个云主机的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GuestTaskStatus {
    Processing,
    Success,
    Fail,
}

/// 操作系统类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Windows,
}

/// 磁盘总线
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    Scsi,
    Sata,
    Ide,
}

/// 网卡型号
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkModel {
    Virtio,
    E1000,
    Rtl8139,
}

/// 显示驱动
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayDriver {
    Vga,
    Cirrus,
    Qxl,
}

/// 远程控制协议
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteControl {
    Vnc,
    Spice,
}

/// USB 控制器
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsbModel {
    None,
    Xhci,
}

/// 输入设备模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TabletMode {
    None,
    Usb,
}

/// 常量定义
pub mod constants {
    /// 默认命令队列长度
    pub const DEFAULT_QUEUE_SIZE: usize = 1024;

    /// 统计汇总间隔（秒）
    pub const STATISTICS_INTERVAL: u64 = 5;

    /// 批量任务检查间隔（秒）
    pub const BATCH_SWEEP_INTERVAL: u64 = 2;

    /// 资源节点失联超时（秒）
    pub const CELL_LOST_TIMEOUT: i64 = 10;

    /// 批量任务、迁移任务的保留时长（秒）
    pub const TASK_EXPIRE_TIMEOUT: i64 = 30;

    /// 配置容量的超售倍数
    pub const OVERCOMMIT_FACTOR: u64 = 3;

    /// 强制满足需求时允许的最高 CPU 使用率
    pub const MAX_CPU_USAGE_PERCENT: f64 = 80.0;

    /// 默认计算资源池名称
    pub const DEFAULT_POOL_NAME: &str = "default";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_parse() {
        assert_eq!("nfs".parse::<StorageType>().unwrap(), StorageType::Nfs);
        assert!("ceph".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_range_type_serialization() {
        let json = serde_json::to_string(&AddressRangeType::Internal).unwrap();
        assert_eq!(json, "\"internal\"");
        assert_eq!("external".parse::<AddressRangeType>().unwrap(), AddressRangeType::External);
    }
}
