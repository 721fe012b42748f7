/// 系统模板管理服务

use chrono::{DateTime, Utc};
use common::{Error, Result};
use tracing::info;

use crate::models::{SystemTemplate, SystemTemplateConfig};
use crate::state::ResourceState;

impl ResourceState {
    fn template_name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.templates
            .values()
            .any(|t| t.config.name == name && Some(t.id.as_str()) != except)
    }

    /// 创建系统模板，返回模板 ID
    pub fn create_template(&mut self, config: SystemTemplateConfig, now: DateTime<Utc>) -> Result<String> {
        if config.name.is_empty() {
            return Err(Error::InvalidArgument("系统模板名称不能为空".to_string()));
        }
        if self.template_name_taken(&config.name, None) {
            return Err(Error::AlreadyExists(format!("系统模板 {}", config.name)));
        }
        let template = SystemTemplate::new(config, now);
        let id = template.id.clone();
        info!("系统模板已创建: id={}, name={}", id, template.config.name);
        self.templates.insert(id.clone(), template);
        Ok(id)
    }

    pub fn modify_template(&mut self, id: &str, config: SystemTemplateConfig, now: DateTime<Utc>) -> Result<()> {
        if self.template_name_taken(&config.name, Some(id)) {
            return Err(Error::AlreadyExists(format!("系统模板 {}", config.name)));
        }
        let template = self
            .templates
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("系统模板 {}", id)))?;
        if template.config == config {
            return Err(Error::NoChange(format!("系统模板 {}", id)));
        }
        template.config = config;
        template.modified_time = now;
        info!("系统模板已修改: id={}, name={}", id, template.config.name);
        Ok(())
    }

    pub fn delete_template(&mut self, id: &str) -> Result<()> {
        let template = self
            .templates
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("系统模板 {}", id)))?;
        info!("系统模板已删除: id={}, name={}", id, template.config.name);
        Ok(())
    }

    pub fn get_template(&self, id: &str) -> Result<SystemTemplate> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("系统模板 {}", id)))
    }

    /// 全部系统模板（按名称排序）
    pub fn query_templates(&self) -> Vec<SystemTemplate> {
        let mut templates: Vec<SystemTemplate> = self.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{DisplayDriver, NetworkModel};

    #[test]
    fn test_template_lifecycle() {
        let mut state = ResourceState::with_defaults("zone", Utc::now());
        let base = state.query_templates().remove(0);

        let mut config = base.config.clone();
        assert!(matches!(
            state.create_template(config.clone(), Utc::now()),
            Err(Error::AlreadyExists(_))
        ));

        config.name = "ubuntu-desktop".into();
        config.display = DisplayDriver::Qxl;
        let id = state.create_template(config.clone(), Utc::now()).unwrap();
        assert_eq!(state.query_templates().len(), 6);

        assert!(state.modify_template(&id, config.clone(), Utc::now()).unwrap_err().is_no_change());
        config.network = NetworkModel::Virtio;
        config.name = base.config.name.clone();
        assert!(matches!(
            state.modify_template(&id, config.clone(), Utc::now()),
            Err(Error::AlreadyExists(_))
        ));

        config.name = "ubuntu-server".into();
        state.modify_template(&id, config, Utc::now()).unwrap();
        assert_eq!(state.get_template(&id).unwrap().config.name, "ubuntu-server");

        state.delete_template(&id).unwrap();
        assert!(state.get_template(&id).unwrap_err().is_not_found());
    }
}
