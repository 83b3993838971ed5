//! 订单处理器
//!
//! 驱动订单状态机：PENDING -> PROCESSING -> COMPLETED，
//! 任一步失败时尝试迁移到 FAILED 并发布失败事件。
//!
//! ## 处理流程
//!
//! 1. 迁移到 PROCESSING（订单不存在则直接失败，不走 FAILED 分支）
//! 2. 重新读取订单 -> 3. 发布 PROCESSING 事件
//! 4. 模拟履约耗时 -> 5. 迁移到 COMPLETED 并发布事件
//!
//! 每个状态变更向 user-activity、analytics-stream、notifications-stream 各发一条。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use bakery_shared::events::{AnalyticsEvent, NotificationEvent, UserActivityEvent, queues};
use bakery_shared::observability::metrics;
use bakery_shared::queue::QueueGateway;
use bakery_shared::status::OrderStatus;
use order_service::OrderError;
use order_service::models::Order;
use order_service::repository::OrderRepositoryTrait;

use crate::error::Result;

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    /// 订单已处于终态（重复投递），不做任何变更
    Skipped { status: OrderStatus },
}

impl ProcessOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

pub struct OrderProcessor {
    order_repo: Arc<dyn OrderRepositoryTrait>,
    gateway: Arc<QueueGateway>,
    processing_delay: Duration,
}

impl OrderProcessor {
    pub fn new(
        order_repo: Arc<dyn OrderRepositoryTrait>,
        gateway: Arc<QueueGateway>,
        processing_delay: Duration,
    ) -> Self {
        Self {
            order_repo,
            gateway,
            processing_delay,
        }
    }

    /// 处理一个订单
    ///
    /// 失败时先尽力把订单标记为 FAILED，再把原始错误返回给调用方决定是否重试。
    #[instrument(skip(self))]
    pub async fn process_order(&self, order_id: i64) -> Result<ProcessOutcome> {
        let started = Instant::now();

        match self.advance(order_id).await {
            Ok(outcome) => {
                metrics::record_order_processing(outcome.as_str(), started.elapsed().as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                error!(order_id, error = %e, code = e.code(), "订单处理失败");

                let outcome = if e.is_not_found() {
                    "not_found"
                } else {
                    self.mark_failed(order_id, &e.to_string()).await;
                    "failed"
                };
                metrics::record_order_processing(outcome, started.elapsed().as_secs_f64());

                Err(e)
            }
        }
    }

    async fn advance(&self, order_id: i64) -> Result<ProcessOutcome> {
        match self
            .order_repo
            .update_order_status(order_id, OrderStatus::Processing)
            .await
        {
            Ok(()) => {}
            Err(OrderError::InvalidTransition { from, .. }) if from.is_terminal() => {
                info!(order_id, status = %from, "订单已处于终态，跳过重复投递");
                return Ok(ProcessOutcome::Skipped { status: from });
            }
            Err(e) => return Err(e.into()),
        }

        let order = self.fetch_order(order_id).await?;
        info!(order_id, user_id = order.user_id, "订单开始处理");
        self.publish_status(&order, OrderStatus::Processing, None);

        // 履约占位
        tokio::time::sleep(self.processing_delay).await;

        self.order_repo
            .update_order_status(order_id, OrderStatus::Completed)
            .await?;
        info!(order_id, user_id = order.user_id, "订单处理完成");
        self.publish_status(&order, OrderStatus::Completed, None);

        Ok(ProcessOutcome::Completed)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order> {
        Ok(self
            .order_repo
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?)
    }

    /// 标记 FAILED 并发布失败事件；任一步出错只记录日志
    async fn mark_failed(&self, order_id: i64, reason: &str) {
        if let Err(e) = self
            .order_repo
            .update_order_status(order_id, OrderStatus::Failed)
            .await
        {
            error!(order_id, error = %e, "标记订单失败状态出错，放弃");
            return;
        }

        match self.order_repo.find_order(order_id).await {
            Ok(Some(order)) => {
                warn!(order_id, reason, "订单已标记为 FAILED");
                self.publish_status(&order, OrderStatus::Failed, Some(reason.to_string()));
            }
            Ok(None) => warn!(order_id, "订单标记 FAILED 后无法读取"),
            Err(e) => error!(order_id, error = %e, "读取失败订单出错，未发布失败事件"),
        }
    }

    fn publish_status(&self, order: &Order, status: OrderStatus, error: Option<String>) {
        self.gateway.publish(
            queues::USER_ACTIVITY,
            &UserActivityEvent::order_status_changed(order.user_id, order.id, status, error.clone()),
        );
        self.gateway.publish(
            queues::ANALYTICS_STREAM,
            &AnalyticsEvent::order_status(order.user_id, order.id, status, error),
        );
        self.gateway.publish(
            queues::NOTIFICATIONS_STREAM,
            &NotificationEvent::order_update(order.user_id, order.id, status),
        );
    }
}
