//! HTTP 请求体定义

use serde::Deserialize;

use crate::models::NewProduct;
use crate::service::Registration;

/// POST /api/products
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    /// 操作人，存在时发布 create_product 事件
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl CreateProductRequest {
    pub fn into_parts(self) -> (NewProduct, Option<i64>) {
        (
            NewProduct {
                name: self.name,
                description: self.description,
                price: self.price,
            },
            self.user_id,
        )
    }
}

/// POST /api/cart
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub user_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub quantity: Option<i32>,
}

/// PUT /api/cart/{userId}/{productId}
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

/// POST /api/orders
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub user_id: i64,
}

/// POST /api/register
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl From<RegisterRequest> for Registration {
    fn from(req: RegisterRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            password: req.password,
            is_admin: req.is_admin,
        }
    }
}

/// POST /api/login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}
