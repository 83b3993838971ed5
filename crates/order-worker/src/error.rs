//! 订单工作者错误类型
//!
//! 处理失败后按错误类型决定消息是否重新入队。

use bakery_shared::error::BakeryError;
use order_service::OrderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Shared(#[from] BakeryError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

impl WorkerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Order(e) => e.code(),
            Self::Shared(e) => e.code(),
        }
    }

    /// 订单不存在或校验类错误不重试，其余交给 broker 重新投递
    pub fn should_requeue(&self) -> bool {
        match self {
            Self::Order(e) => e.should_requeue(),
            Self::Shared(e) => !matches!(
                e,
                BakeryError::Validation(_)
                    | BakeryError::Serialization(_)
                    | BakeryError::InvalidTransition { .. }
            ),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Order(OrderError::OrderNotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_classification() {
        assert!(!WorkerError::from(OrderError::OrderNotFound(1)).should_requeue());
        assert!(WorkerError::from(OrderError::OrderNotFound(1)).is_not_found());
        assert!(WorkerError::from(OrderError::Internal("pool timed out".into())).should_requeue());
        assert!(!WorkerError::from(BakeryError::Validation("orderId".into())).should_requeue());
        assert!(WorkerError::from(BakeryError::Internal("boom".into())).should_requeue());
    }

    #[test]
    fn test_code_delegates() {
        assert_eq!(
            WorkerError::from(OrderError::OrderNotFound(1)).code(),
            "ORDER_NOT_FOUND"
        );
    }
}
