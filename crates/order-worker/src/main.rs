//! 订单工作者入口
//!
//! 启动时必须连上消息队列，重试耗尽以退出码 1 结束；
//! 收到 SIGINT / SIGTERM 后停止消费、关闭连接并以退出码 0 结束，
//! 未确认的消息由 broker 重新投递。

use std::sync::Arc;

use bakery_shared::{
    config::AppConfig,
    database::Database,
    kafka::KafkaConnector,
    observability,
    queue::QueueGateway,
};
use order_service::repository::OrderRepository;
use order_worker::processor::OrderProcessor;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("order-worker")?;
    let _guard = observability::init(&config.observability).await?;

    info!(env = %config.environment, "正在启动 order-worker");

    let db = Database::connect(&config.database).await?;

    let connector = Arc::new(KafkaConnector::new(config.kafka.clone()));
    let gateway = Arc::new(QueueGateway::new(connector, config.queue.connect_policy()));
    if let Err(e) = gateway.connect().await {
        error!(error = %e, "消息队列连接重试耗尽，退出");
        db.close().await;
        return Err(e.into());
    }

    let processor = Arc::new(OrderProcessor::new(
        Arc::new(OrderRepository::new(db.pool().clone())),
        gateway.clone(),
        config.worker.processing_delay(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = order_worker::run(gateway.clone(), processor, &config.queue, shutdown_rx).await;

    gateway.close().await;
    db.close().await;

    result?;
    info!("order-worker 已关闭");
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
        _ = ctrl_c => info!("收到 Ctrl+C，停止消费"),
        _ = terminate => info!("收到 SIGTERM，停止消费"),
    }
}
