//! 重试策略与执行器
//!
//! 用于瞬时故障（Broker 未就绪、网络抖动等）的自动恢复。
//! 支持固定间隔（消息队列启动连接）与指数退避两种形态，
//! 业务逻辑错误不应被重试，由调用方通过 `is_retryable` 闭包控制。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::BakeryError;

// ---------------------------------------------------------------------------
// RetryPolicy: 重试策略配置
// ---------------------------------------------------------------------------

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次执行）
    pub max_attempts: u32,
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数，1.0 即固定间隔
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// 默认策略：最多尝试 4 次，初始等待 1 秒，最大等待 30 秒，倍数 2.0
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 固定间隔策略
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// 计算第 N 次重试前的等待时间（attempt 从 0 开始）
    ///
    /// 公式: initial_delay * multiplier^attempt，结果不超过 max_delay。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 已失败 `failed_attempts` 次后是否还能再试
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// retry_with_policy: 带重试的异步执行器
// ---------------------------------------------------------------------------

/// 带重试的异步执行器
///
/// `operation` 收到当前尝试序号（从 1 开始），便于调用方记录 "Attempt N" 日志。
/// 仅在操作返回可重试错误时才重试，其余错误直接向上传播。
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&BakeryError) -> bool,
    mut operation: F,
) -> Result<T, BakeryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BakeryError>>,
{
    let mut failed: u32 = 0;

    loop {
        match operation(failed + 1).await {
            Ok(value) => {
                if failed > 0 {
                    info!(operation = operation_name, attempt = failed + 1, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "操作失败且不可重试，直接返回错误"
                    );
                    return Err(err);
                }

                failed += 1;
                if !policy.should_retry(failed) {
                    warn!(
                        operation = operation_name,
                        attempts = failed,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "已达最大尝试次数，放弃重试"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(failed - 1);
                warn!(
                    operation = operation_name,
                    attempt = failed,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "操作失败，等待后重试"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
