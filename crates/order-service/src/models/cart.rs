use serde::{Deserialize, Serialize};

/// 购物车行，附带商品名称与当前价格
///
/// 每个 (user_id, product_id) 至多一行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub name: String,
    pub price: f64,
}

impl CartLine {
    /// 按当前价格计算的小计
    pub fn subtotal(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}
