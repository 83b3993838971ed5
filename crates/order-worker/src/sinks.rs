//! 旁路队列消费
//!
//! user-activity、analytics-stream、notifications-stream 三个队列只做解析与记录：
//! 负载是合法 JSON 就记日志并 ack，缺失的字段按空值记录；
//! 不是合法 JSON 时拒绝且不重新入队。

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use bakery_shared::events::{ActivityAction, AnalyticsEventType, NotificationType};
use bakery_shared::observability::metrics;
use bakery_shared::queue::{ConsumerMessage, Disposition};

fn parse(message: &ConsumerMessage) -> Option<Value> {
    match message.deserialize_payload::<Value>() {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(
                queue = %message.queue,
                offset = message.offset,
                error = %e,
                "旁路事件无法解析，丢弃"
            );
            metrics::record_side_channel_event(&message.queue, "invalid");
            None
        }
    }
}

fn field<'a>(event: &'a Value, key: &str) -> Option<&'a Value> {
    event.get(key).filter(|v| !v.is_null())
}

/// 判别字段映射到已知取值，用作指标标签
fn kind<T: DeserializeOwned>(event: &Value, key: &str, label: fn(&T) -> &'static str) -> &'static str {
    field(event, key)
        .and_then(|v| serde_json::from_value::<T>(v.clone()).ok())
        .map_or("unknown", |k| label(&k))
}

pub fn handle_user_activity(message: &ConsumerMessage) -> Disposition {
    let Some(event) = parse(message) else {
        return Disposition::Reject { requeue: false };
    };

    let action = kind(&event, "action", ActivityAction::as_str);
    info!(
        user_id = ?field(&event, "userId"),
        action = ?field(&event, "action"),
        order_id = ?field(&event, "orderId"),
        product_id = ?field(&event, "productId"),
        status = ?field(&event, "status"),
        "用户行为"
    );
    metrics::record_side_channel_event(&message.queue, action);
    Disposition::Ack
}

pub fn handle_analytics(message: &ConsumerMessage) -> Disposition {
    let Some(event) = parse(message) else {
        return Disposition::Reject { requeue: false };
    };

    let event_type = kind(&event, "type", AnalyticsEventType::as_str);
    info!(
        event_type = ?field(&event, "type"),
        user_id = ?field(&event, "userId"),
        order_id = ?field(&event, "orderId"),
        total = ?field(&event, "total"),
        status = ?field(&event, "status"),
        "分析事件"
    );
    metrics::record_side_channel_event(&message.queue, event_type);
    Disposition::Ack
}

pub fn handle_notification(message: &ConsumerMessage) -> Disposition {
    let Some(event) = parse(message) else {
        return Disposition::Reject { requeue: false };
    };

    let notification_type = kind(&event, "type", NotificationType::as_str);
    info!(
        notification_type = ?field(&event, "type"),
        user_id = ?field(&event, "userId"),
        order_id = ?field(&event, "orderId"),
        message = ?field(&event, "message"),
        "通知"
    );
    metrics::record_side_channel_event(&message.queue, notification_type);
    Disposition::Ack
}
