//! 下单服务 HTTP 入口
//!
//! HTTP 服务立即开始接收请求，消息队列在后台连接；
//! 重试耗尽后进程以退出码 1 结束。

use std::sync::Arc;
use std::time::Duration;

use bakery_shared::{
    config::AppConfig,
    database::Database,
    kafka::KafkaConnector,
    observability,
    queue::QueueGateway,
};
use order_service::{
    auth::BcryptHasher,
    repository::{CartRepository, OrderRepository, ProductRepository, UserRepository},
    routes,
    state::{AppState, Repositories},
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("bakery-api")?;
    let _guard = observability::init(&config.observability).await?;

    info!(addr = %config.server_addr(), env = %config.environment, "正在启动 bakery-api");

    let db = Database::connect(&config.database).await?;
    if let Some(dir) = &config.database.migrations_dir {
        db.run_migrations(dir).await?;
    }

    let connector = Arc::new(KafkaConnector::new(config.kafka.clone()));
    let gateway = Arc::new(QueueGateway::new(connector, config.queue.connect_policy()));

    // 不依赖消息队列的路由无需等待连接
    let connecting = gateway.clone();
    tokio::spawn(async move {
        if let Err(e) = connecting.connect().await {
            error!(error = %e, "消息队列连接重试耗尽，进程退出");
            std::process::exit(1);
        }
    });

    let pool = db.pool().clone();
    let state = AppState::new(
        Repositories {
            users: Arc::new(UserRepository::new(pool.clone())),
            products: Arc::new(ProductRepository::new(pool.clone())),
            carts: Arc::new(CartRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool)),
        },
        Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
        gateway.clone(),
    );

    let app = routes::build_router(
        state,
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("正在监听 {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.close().await;
    db.close().await;
    info!("bakery-api 已关闭");

    Ok(())
}

/// 监听关闭信号（Ctrl+C 或 SIGTERM）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，开始优雅关闭"),
        _ = terminate => info!("收到 SIGTERM，开始优雅关闭"),
    }
}
