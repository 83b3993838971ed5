//! 订单工作者
//!
//! 消费 order-processing 队列推进订单状态机，
//! 同时消费三个旁路队列（user-activity、analytics-stream、notifications-stream）做日志记录。
//! order-processing 的 prefetch 为 1，同一工作者内订单串行处理；旁路队列彼此独立并发消费。

pub mod consumer;
pub mod error;
pub mod processor;
pub mod sinks;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use bakery_shared::config::QueueConfig;
use bakery_shared::events::queues;
use bakery_shared::queue::QueueGateway;

use crate::error::Result;
use crate::processor::OrderProcessor;

/// 启动全部消费者，直到收到关闭信号或 broker 连接关闭
pub async fn run(
    gateway: Arc<QueueGateway>,
    processor: Arc<OrderProcessor>,
    queue_config: &QueueConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let side_prefetch = queue_config.side_channel_prefetch;

    let orders = gateway.consume(
        queues::ORDER_PROCESSING,
        queue_config.order_prefetch,
        shutdown.clone(),
        |message| {
            let processor = processor.clone();
            async move { consumer::handle_order_message(&processor, &message).await }
        },
    );
    let activity = gateway.consume(
        queues::USER_ACTIVITY,
        side_prefetch,
        shutdown.clone(),
        |message| async move { sinks::handle_user_activity(&message) },
    );
    let analytics = gateway.consume(
        queues::ANALYTICS_STREAM,
        side_prefetch,
        shutdown.clone(),
        |message| async move { sinks::handle_analytics(&message) },
    );
    let notifications = gateway.consume(
        queues::NOTIFICATIONS_STREAM,
        side_prefetch,
        shutdown,
        |message| async move { sinks::handle_notification(&message) },
    );

    info!("订单工作者已启动，等待消息");
    tokio::try_join!(orders, activity, analytics, notifications)?;
    info!("订单工作者已停止消费");

    Ok(())
}
