//! order-processing 队列消费者
//!
//! 每条消息驱动一次订单处理。成功则 ack；失败按错误类型决定是否重新入队，
//! 订单不存在与无法解析的消息直接丢弃。

use tracing::{debug, warn};

use bakery_shared::events::OrderProcessingMessage;
use bakery_shared::queue::{ConsumerMessage, Disposition};

use crate::processor::OrderProcessor;

/// 处理单条 order-processing 消息
///
/// 拆分为独立函数，测试中无需启动消费循环即可直接调用。
pub async fn handle_order_message(
    processor: &OrderProcessor,
    message: &ConsumerMessage,
) -> Disposition {
    let request: OrderProcessingMessage = match message.deserialize_payload() {
        Ok(request) => request,
        Err(e) => {
            warn!(
                offset = message.offset,
                error = %e,
                "order-processing 消息无法解析，丢弃"
            );
            return Disposition::Reject { requeue: false };
        }
    };

    debug!(
        order_id = request.order_id,
        redelivered = message.redelivered,
        "收到订单处理消息"
    );

    match processor.process_order(request.order_id).await {
        Ok(_) => Disposition::Ack,
        Err(e) => {
            let requeue = e.should_requeue();
            warn!(
                order_id = request.order_id,
                code = e.code(),
                requeue,
                "订单处理消息被拒绝"
            );
            Disposition::Reject { requeue }
        }
    }
}
