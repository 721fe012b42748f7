/// 系统模板数据模型

use chrono::{DateTime, Utc};
use common::models::{
    DiskBus, DisplayDriver, NetworkModel, OperatingSystem, RemoteControl, TabletMode, UsbModel,
};
use common::utils::generate_id;
use serde::{Deserialize, Serialize};

/// 创建/修改系统模板的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTemplateConfig {
    pub name: String,
    pub operating_system: OperatingSystem,
    pub disk: DiskBus,
    pub network: NetworkModel,
    pub display: DisplayDriver,
    pub control: RemoteControl,
    pub usb: UsbModel,
    pub tablet: TabletMode,
}

/// 系统模板
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTemplate {
    pub id: String,
    #[serde(flatten)]
    pub config: SystemTemplateConfig,
    pub created_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
}

impl SystemTemplate {
    pub fn new(config: SystemTemplateConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            config,
            created_time: now,
            modified_time: now,
        }
    }
}

/// 首次启动时生成的内置模板
pub fn builtin_templates(now: DateTime<Utc>) -> Vec<SystemTemplate> {
    let presets = [
        ("linux-general", OperatingSystem::Linux, DiskBus::Scsi, NetworkModel::Virtio, DisplayDriver::Vga, UsbModel::Xhci),
        ("linux-legacy", OperatingSystem::Linux, DiskBus::Ide, NetworkModel::E1000, DisplayDriver::Cirrus, UsbModel::None),
        ("windows-general", OperatingSystem::Windows, DiskBus::Sata, NetworkModel::E1000, DisplayDriver::Vga, UsbModel::Xhci),
        ("windows-legacy", OperatingSystem::Windows, DiskBus::Ide, NetworkModel::Rtl8139, DisplayDriver::Cirrus, UsbModel::None),
        ("general", OperatingSystem::Linux, DiskBus::Sata, NetworkModel::Rtl8139, DisplayDriver::Vga, UsbModel::None),
    ];

    presets
        .into_iter()
        .map(|(name, operating_system, disk, network, display, usb)| {
            let config = SystemTemplateConfig {
                name: name.to_string(),
                operating_system,
                disk,
                network,
                display,
                control: RemoteControl::Vnc,
                usb,
                tablet: TabletMode::Usb,
            };
            SystemTemplate::new(config, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_templates() {
        let templates = builtin_templates(Utc::now());
        assert_eq!(templates.len(), 5);
        let names: HashSet<_> = templates.iter().map(|t| t.config.name.as_str()).collect();
        assert_eq!(names.len(), 5);
        assert!(names.contains("linux-general"));
        let ids: HashSet<_> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_template_serialization_is_flat() {
        let template = builtin_templates(Utc::now()).remove(0);
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["name"], "linux-general");
        assert_eq!(value["disk"], "scsi");
        assert!(value.get("config").is_none());
    }
}
