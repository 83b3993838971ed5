use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 商品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// 创建商品请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
}

impl NewProduct {
    /// 名称非空、价格为非负有限数
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("商品名称不能为空".to_string());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(format!("商品价格无效: {}", self.price));
        }
        Ok(())
    }
}
