/// 镜像服务器登记

use common::{Error, Result};
use tracing::info;

use crate::models::ImageServer;
use crate::state::ResourceState;

impl ResourceState {
    /// 登记镜像服务器，同名再次登记时更新地址
    pub fn add_image_server(&mut self, name: &str, host: &str, port: u16) -> Result<()> {
        if name.is_empty() || host.is_empty() {
            return Err(Error::InvalidArgument("镜像服务器名称和地址不能为空".to_string()));
        }
        let server = ImageServer {
            name: name.to_string(),
            host: host.to_string(),
            port,
        };
        match self.image_servers.insert(name.to_string(), server) {
            Some(previous) => info!(
                "镜像服务器已更新: name={}, {}:{} -> {}:{}",
                name, previous.host, previous.port, host, port
            ),
            None => info!("镜像服务器已登记: name={}, address={}:{}", name, host, port),
        }
        Ok(())
    }

    pub fn remove_image_server(&mut self, name: &str) -> Result<()> {
        self.image_servers
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("镜像服务器 {}", name)))?;
        info!("镜像服务器已移除: {}", name);
        Ok(())
    }

    /// 返回名称最小的镜像服务器
    pub fn get_image_server(&self) -> Result<ImageServer> {
        self.image_servers
            .values()
            .next()
            .cloned()
            .ok_or_else(|| Error::NotFound("可用的镜像服务器".to_string()))
    }
}
