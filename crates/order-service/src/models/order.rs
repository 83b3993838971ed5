use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::CartLine;
use bakery_shared::status::OrderStatus;

/// 订单
///
/// 创建后除 `status` 外不可变，`status` 只由订单工作者推进。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// 订单行数（analytics 事件的 itemCount）
    pub fn item_count(&self) -> u32 {
        u32::try_from(self.items.len()).unwrap_or(u32::MAX)
    }
}

/// 订单行，价格为下单时的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
}

/// 待持久化的订单，状态固定为 PENDING
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub total: f64,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub price: f64,
}

impl NewOrder {
    /// 用购物车行构造订单，价格在此刻快照
    pub fn from_cart(user_id: i64, lines: &[CartLine]) -> Self {
        let items: Vec<NewOrderItem> = lines
            .iter()
            .map(|line| NewOrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
            })
            .collect();

        let total = lines.iter().map(CartLine::subtotal).sum();

        Self {
            user_id,
            total,
            items,
        }
    }
}
