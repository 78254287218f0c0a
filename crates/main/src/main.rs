//! 主应用程序入口
//!
//! 加载配置、连接数据库、启动聊天调度器，然后运行 Axum Web 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{Hub, PersistenceGateway, SystemClock};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgPersistenceGateway, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.rsplit('@').next().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to postgres")?;

    // 运行迁移
    MIGRATOR
        .run(&pg_pool)
        .await
        .context("failed to run migrations")?;

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(PgPersistenceGateway::new(pg_pool));

    // 启动聊天调度器
    let (hub, hub_handle) = Hub::new(gateway.clone(), Arc::new(SystemClock), &config.hub);
    let hub_task = hub.spawn();
    let hub_control = hub_handle.clone();

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(hub_handle, gateway, jwt_service, &config.server);

    // 启动 Web 服务器
    let app = router(state);
    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    tracing::info!("聊天服务器启动在 http://{}", bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 已升级的 WebSocket 连接不随 serve 结束，需要显式停止调度器
    hub_control.shutdown();
    if let Err(err) = hub_task.await {
        tracing::warn!(error = %err, "chat hub task failed");
    }
    tracing::info!("服务器已停止");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("收到关闭信号");
}
