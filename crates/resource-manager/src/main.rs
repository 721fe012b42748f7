/// Zone Resource Manager - 主程序
///
/// 加载持久化数据并运行资源管理器，收到 Ctrl+C 后保存数据退出

use resource_manager::{Config, ResourceManager};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 加载配置
    let cfg = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level)),
        )
        .init();

    info!("🚀 启动资源管理器...");
    info!("✅ 配置加载成功: zone={}, data={}", cfg.zone_name, cfg.data_path.display());

    let shutdown = CancellationToken::new();
    let (_handle, task) = ResourceManager::start(&cfg, shutdown.clone())?;
    info!("✅ 资源管理器已启动，队列长度 {}", cfg.queue_size);

    tokio::signal::ctrl_c().await?;
    info!("🛑 收到退出信号，正在停止...");
    shutdown.cancel();
    task.await?;

    info!("👋 资源管理器已退出");
    Ok(())
}
