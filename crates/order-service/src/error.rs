//! 下单服务错误类型
//!
//! 区分客户端错误（空购物车、资源不存在、参数错误）与系统错误，
//! 并为订单工作者提供消息级重试分类（[`OrderError::should_requeue`]）。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bakery_shared::error::BakeryError;
use bakery_shared::status::OrderStatus;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    // === 业务错误 ===
    #[error("购物车为空: user_id={user_id}")]
    EmptyCart { user_id: i64 },

    #[error("订单不存在: {0}")]
    OrderNotFound(i64),

    #[error("商品不存在: {0}")]
    ProductNotFound(i64),

    #[error("用户不存在: {0}")]
    UserNotFound(i64),

    #[error("邮箱已被注册: {0}")]
    EmailTaken(String),

    #[error("邮箱或密码错误")]
    InvalidCredentials,

    #[error("购物车中没有该商品: user_id={user_id}, product_id={product_id}")]
    CartLineNotFound { user_id: i64, product_id: i64 },

    #[error("订单 {order_id} 状态不允许迁移: {from} -> {to}")]
    InvalidTransition {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Shared(#[from] BakeryError),

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart { .. } => "EMPTY_CART",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::EmailTaken(_) => "EMAIL_TAKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::CartLineNotFound { .. } => "CART_LINE_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyCart { .. } | Self::Validation(_) | Self::EmailTaken(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::OrderNotFound(_)
            | Self::ProductNotFound(_)
            | Self::UserNotFound(_)
            | Self::CartLineNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Shared(BakeryError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Shared(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 订单处理消息失败后是否重新入队
    ///
    /// 资源不存在与校验类错误重试也不会成功，直接丢弃；其余视为瞬时故障。
    pub fn should_requeue(&self) -> bool {
        match self {
            Self::EmptyCart { .. }
            | Self::OrderNotFound(_)
            | Self::ProductNotFound(_)
            | Self::UserNotFound(_)
            | Self::EmailTaken(_)
            | Self::InvalidCredentials
            | Self::CartLineNotFound { .. }
            | Self::InvalidTransition { .. }
            | Self::Validation(_) => false,
            Self::Shared(e) => !matches!(
                e,
                BakeryError::Validation(_)
                    | BakeryError::Serialization(_)
                    | BakeryError::InvalidTransition { .. }
            ),
            Self::Database(_) | Self::Internal(_) => true,
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.code(), "请求处理失败");
            "服务内部错误，请稍后重试".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "code": self.code(),
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(OrderError, StatusCode, &'static str, bool)> {
        vec![
            (OrderError::EmptyCart { user_id: 1 }, StatusCode::BAD_REQUEST, "EMPTY_CART", false),
            (OrderError::OrderNotFound(42), StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", false),
            (OrderError::ProductNotFound(7), StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND", false),
            (OrderError::UserNotFound(5), StatusCode::NOT_FOUND, "USER_NOT_FOUND", false),
            (
                OrderError::EmailTaken("a@example.com".into()),
                StatusCode::BAD_REQUEST,
                "EMAIL_TAKEN",
                false,
            ),
            (OrderError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", false),
            (
                OrderError::CartLineNotFound { user_id: 1, product_id: 2 },
                StatusCode::NOT_FOUND,
                "CART_LINE_NOT_FOUND",
                false,
            ),
            (
                OrderError::InvalidTransition {
                    order_id: 1,
                    from: OrderStatus::Completed,
                    to: OrderStatus::Processing,
                },
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                false,
            ),
            (OrderError::Validation("quantity".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR", false),
            (
                OrderError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                true,
            ),
            (
                OrderError::Shared(BakeryError::QueueUnavailable("order-processing".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "QUEUE_UNAVAILABLE",
                true,
            ),
            (
                OrderError::Shared(BakeryError::Validation("orderId".into())),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                false,
            ),
            (OrderError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", true),
        ]
    }

    #[test]
    fn test_all_variants_mapping() {
        for (error, status, code, requeue) in all_error_variants() {
            assert_eq!(error.status_code(), status, "状态码不匹配: {code}");
            assert_eq!(error.code(), code);
            assert_eq!(error.should_requeue(), requeue, "重试分类不匹配: {code}");
        }
    }

    #[test]
    fn test_display_contains_context() {
        assert!(OrderError::OrderNotFound(42).to_string().contains("42"));
        assert!(OrderError::EmptyCart { user_id: 9 }.to_string().contains("user_id=9"));
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = OrderError::EmptyCart { user_id: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "EMPTY_CART");
        assert!(body["message"].as_str().unwrap().contains("user_id=3"));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = OrderError::Internal("连接串 postgres://secret".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }
}
