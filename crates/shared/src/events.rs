//! 队列消息模型
//!
//! 定义四个持久化队列的名称以及各自的 JSON 消息格式。
//! 所有消息都是不可变、发后即忘的记录：带有 `type` / `action` 判别字段、
//! `timestamp` 以及业务字段。字段统一 camelCase，可选字段为空时不输出。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::OrderStatus;

// ---------------------------------------------------------------------------
// 队列名称
// ---------------------------------------------------------------------------

/// 集中管理所有队列名称，防止字符串散落在各服务中导致拼写不一致
pub mod queues {
    pub const USER_ACTIVITY: &str = "user-activity";
    pub const ORDER_PROCESSING: &str = "order-processing";
    pub const ANALYTICS_STREAM: &str = "analytics-stream";
    pub const NOTIFICATIONS_STREAM: &str = "notifications-stream";

    /// 每次连接成功后都要声明的全部持久化队列
    pub const ALL: [&str; 4] = [
        USER_ACTIVITY,
        ORDER_PROCESSING,
        ANALYTICS_STREAM,
        NOTIFICATIONS_STREAM,
    ];
}

// ---------------------------------------------------------------------------
// order-processing
// ---------------------------------------------------------------------------

/// 订单处理请求，工作者唯一据此推进状态机的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProcessingMessage {
    pub order_id: i64,
}

// ---------------------------------------------------------------------------
// user-activity
// ---------------------------------------------------------------------------

/// 用户行为类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    OrderCreated,
    OrderStatusChanged,
    AddToCart,
    UpdateCartItem,
    RemoveFromCart,
    CreateProduct,
    Register,
    Login,
    /// 未识别的行为，日志消费端照常记录
    #[serde(other)]
    Other,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderStatusChanged => "order_status_changed",
            Self::AddToCart => "add_to_cart",
            Self::UpdateCartItem => "update_cart_item",
            Self::RemoveFromCart => "remove_from_cart",
            Self::CreateProduct => "create_product",
            Self::Register => "register",
            Self::Login => "login",
            Self::Other => "other",
        }
    }
}

/// user-activity 队列消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityEvent {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    pub action: ActivityAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UserActivityEvent {
    fn base(user_id: i64, action: ActivityAction) -> Self {
        Self {
            user_id,
            order_id: None,
            product_id: None,
            action,
            order_total: None,
            quantity: None,
            status: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn order_created(user_id: i64, order_id: i64, order_total: f64) -> Self {
        Self {
            order_id: Some(order_id),
            order_total: Some(order_total),
            ..Self::base(user_id, ActivityAction::OrderCreated)
        }
    }

    pub fn order_status_changed(
        user_id: i64,
        order_id: i64,
        status: OrderStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            order_id: Some(order_id),
            status: Some(status),
            error,
            ..Self::base(user_id, ActivityAction::OrderStatusChanged)
        }
    }

    /// 购物车变更（add_to_cart / update_cart_item / remove_from_cart）
    pub fn cart_changed(
        action: ActivityAction,
        user_id: i64,
        product_id: i64,
        quantity: Option<i32>,
    ) -> Self {
        Self {
            product_id: Some(product_id),
            quantity,
            ..Self::base(user_id, action)
        }
    }

    pub fn product_created(user_id: i64, product_id: i64) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::base(user_id, ActivityAction::CreateProduct)
        }
    }

    pub fn registered(user_id: i64) -> Self {
        Self::base(user_id, ActivityAction::Register)
    }

    pub fn logged_in(user_id: i64) -> Self {
        Self::base(user_id, ActivityAction::Login)
    }
}

// ---------------------------------------------------------------------------
// analytics-stream
// ---------------------------------------------------------------------------

/// 分析事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    Order,
    OrderStatus,
    CartUpdate,
    ProductCreated,
    UserRegistration,
    UserLogin,
    #[serde(other)]
    Other,
}

impl AnalyticsEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::OrderStatus => "order_status",
            Self::CartUpdate => "cart_update",
            Self::ProductCreated => "product_created",
            Self::UserRegistration => "user_registration",
            Self::UserLogin => "user_login",
            Self::Other => "other",
        }
    }
}

/// 购物车变更动作（analytics 的 cart_update 事件使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartAction {
    Add,
    Update,
    Remove,
}

/// analytics-stream 队列消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(rename = "type")]
    pub event_type: AnalyticsEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CartAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    fn base(event_type: AnalyticsEventType) -> Self {
        Self {
            event_type,
            user_id: None,
            order_id: None,
            product_id: None,
            admin_id: None,
            is_admin: None,
            action: None,
            total: None,
            item_count: None,
            quantity: None,
            price: None,
            status: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn order_placed(user_id: i64, order_id: i64, total: f64, item_count: u32) -> Self {
        Self {
            user_id: Some(user_id),
            order_id: Some(order_id),
            total: Some(total),
            item_count: Some(item_count),
            ..Self::base(AnalyticsEventType::Order)
        }
    }

    pub fn order_status(
        user_id: i64,
        order_id: i64,
        status: OrderStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            order_id: Some(order_id),
            status: Some(status),
            error,
            ..Self::base(AnalyticsEventType::OrderStatus)
        }
    }

    pub fn cart_update(
        user_id: i64,
        product_id: i64,
        action: CartAction,
        quantity: Option<i32>,
        price: Option<f64>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            product_id: Some(product_id),
            action: Some(action),
            quantity,
            price,
            ..Self::base(AnalyticsEventType::CartUpdate)
        }
    }

    pub fn product_created(admin_id: i64, product_id: i64, price: f64) -> Self {
        Self {
            admin_id: Some(admin_id),
            product_id: Some(product_id),
            price: Some(price),
            ..Self::base(AnalyticsEventType::ProductCreated)
        }
    }

    pub fn user_registration(user_id: i64, is_admin: bool) -> Self {
        Self {
            user_id: Some(user_id),
            is_admin: Some(is_admin),
            ..Self::base(AnalyticsEventType::UserRegistration)
        }
    }

    pub fn user_login(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::base(AnalyticsEventType::UserLogin)
        }
    }
}

// ---------------------------------------------------------------------------
// notifications-stream
// ---------------------------------------------------------------------------

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewOrder,
    OrderUpdate,
    Welcome,
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::OrderUpdate => "order_update",
            Self::Welcome => "welcome",
            Self::Other => "other",
        }
    }
}

/// notifications-stream 队列消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new_order(user_id: i64, order_id: i64) -> Self {
        Self {
            notification_type: NotificationType::NewOrder,
            user_id,
            order_id: Some(order_id),
            message: format!("New order #{order_id} placed"),
            timestamp: Utc::now(),
        }
    }

    /// 订单状态变更通知，文案随状态变化
    pub fn order_update(user_id: i64, order_id: i64, status: OrderStatus) -> Self {
        let message = match status {
            OrderStatus::Pending => format!("Your order #{order_id} has been received"),
            OrderStatus::Processing => format!("Your order #{order_id} is now being processed"),
            OrderStatus::Completed => format!("Your order #{order_id} has been completed"),
            OrderStatus::Failed => format!("There was an issue with your order #{order_id}"),
        };

        Self {
            notification_type: NotificationType::OrderUpdate,
            user_id,
            order_id: Some(order_id),
            message,
            timestamp: Utc::now(),
        }
    }

    /// 注册成功后的欢迎通知
    pub fn welcome(user_id: i64, email: &str) -> Self {
        Self {
            notification_type: NotificationType::Welcome,
            user_id,
            order_id: None,
            message: format!("Welcome to our bakery, {email}!"),
            timestamp: Utc::now(),
        }
    }
}
