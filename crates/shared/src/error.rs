//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

use crate::status::OrderStatus;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum BakeryError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // ==================== 消息队列错误 ====================
    #[error("Broker 连接失败: {0}")]
    BrokerConnection(String),

    #[error("消息队列不可用: {0}")]
    QueueUnavailable(String),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("消息序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 订单状态机 ====================
    #[error("非法的订单状态迁移: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, BakeryError>;

impl BakeryError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::BrokerConnection(_) => "BROKER_CONNECTION_ERROR",
            Self::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::BrokerConnection(_) | Self::QueueUnavailable(_) | Self::Kafka(_)
        )
    }
}
