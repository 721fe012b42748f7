/// 配置管理

use common::models::constants::DEFAULT_QUEUE_SIZE;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 可用区名称
    pub zone_name: String,
    /// 持久化文件路径
    pub data_path: PathBuf,
    pub log_level: String,
    /// 命令队列长度
    pub queue_size: usize,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let zone_name = std::env::var("ZONE_NAME")
            .unwrap_or_else(|_| "default".to_string());

        let data_path = std::env::var("DATA_PATH")
            .unwrap_or_else(|_| "data/resource.json".to_string())
            .into();

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let queue_size = match std::env::var("QUEUE_SIZE") {
            Ok(value) => value.parse()?,
            Err(_) => DEFAULT_QUEUE_SIZE,
        };
        if queue_size == 0 {
            anyhow::bail!("QUEUE_SIZE 必须大于 0");
        }

        Ok(Self {
            zone_name,
            data_path,
            log_level,
            queue_size,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_name: "default".to_string(),
            data_path: PathBuf::from("data/resource.json"),
            log_level: "info".to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 环境变量是进程级的，所有读取环境变量的断言放在同一个测试里
    #[test]
    fn test_from_env() {
        std::env::remove_var("ZONE_NAME");
        std::env::remove_var("DATA_PATH");
        std::env::set_var("QUEUE_SIZE", "16");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.zone_name, "default");
        assert_eq!(cfg.data_path, PathBuf::from("data/resource.json"));
        assert_eq!(cfg.queue_size, 16);

        std::env::set_var("QUEUE_SIZE", "0");
        assert!(Config::from_env().is_err());
        std::env::set_var("QUEUE_SIZE", "many");
        assert!(Config::from_env().is_err());

        std::env::remove_var("QUEUE_SIZE");
        assert_eq!(Config::from_env().unwrap().queue_size, Config::default().queue_size);
    }
}
