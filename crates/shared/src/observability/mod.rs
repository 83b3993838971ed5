//! 统一可观测性模块
//!
//! 提供 metrics、logging 的统一初始化和管理。
//! API 与工作者进程通过单一入口点配置可观测性，确保一致的指标命名。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源（由 `AppConfig::load` 回填）
    pub service_name: String,

    /// 日志级别（如 "info", "debug"），RUST_LOG 存在时以其为准
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,

    /// 是否启动 Prometheus 指标导出
    pub metrics_enabled: bool,

    /// Prometheus 指标导出端口
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// 可观测性资源守卫
///
/// 持有指标服务器任务的生命周期，进程退出前应保持存活。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用可观测性时）
    pub fn empty() -> Self {
        Self {
            _metrics_handle: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._metrics_handle.is_some() {
            info!("正在关闭可观测性组件");
        }
    }
}

/// 统一初始化可观测性
///
/// 先初始化日志，再启动 Prometheus 指标导出（可配置关闭）。
///
/// # Example
///
/// ```ignore
/// use bakery_shared::config::AppConfig;
/// use bakery_shared::observability;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("order-worker")?;
///     let _guard = observability::init(&config.observability).await?;
///     Ok(())
/// }
/// ```
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "可观测性初始化完成"
    );

    if !config.metrics_enabled {
        return Ok(ObservabilityGuard::empty());
    }

    let metrics_handle = metrics::init(config).await?;

    Ok(ObservabilityGuard {
        _metrics_handle: Some(metrics_handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ObservabilityConfig =
            serde_json::from_str(r#"{"json_logs": true}"#).unwrap();
        assert!(config.json_logs);
        assert_eq!(config.metrics_port, 9090);
    }
}
