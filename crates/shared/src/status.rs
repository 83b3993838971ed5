//! 订单状态机
//!
//! PENDING -> PROCESSING -> COMPLETED，处理过程中任一步失败进入 FAILED。
//! COMPLETED 与 FAILED 为终态，任何迁移都会被拒绝。
//!
//! 下单服务只负责以 PENDING 创建订单，之后的所有迁移由订单工作者发起，
//! 持久化层按 [`OrderStatus::allowed_predecessors`] 做条件更新。

use serde::{Deserialize, Serialize};

/// 订单状态
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 待处理 - 订单刚创建，等待工作者消费
    #[default]
    Pending,
    /// 处理中 - 工作者已接手
    Processing,
    /// 已完成
    Completed,
    /// 处理失败
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// 终态不再接受任何迁移
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 进入 `next` 前允许的当前状态
    ///
    /// PROCESSING -> PROCESSING 用于工作者在处理中途崩溃后，
    /// 重新投递的消息可以接着把订单推进完。
    pub fn allowed_predecessors(next: OrderStatus) -> &'static [OrderStatus] {
        match next {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending, Self::Processing],
            Self::Completed => &[Self::Processing],
            Self::Failed => &[Self::Pending, Self::Processing],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        Self::allowed_predecessors(next).contains(self)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
