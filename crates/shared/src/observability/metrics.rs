//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("orders_placed_total", "Total number of orders placed");
    metrics::describe_counter!(
        "order_processing_total",
        "Order processing runs by outcome"
    );
    metrics::describe_histogram!(
        "order_processing_duration_seconds",
        "Order processing duration in seconds"
    );

    metrics::describe_counter!(
        "queue_messages_published_total",
        "Messages handed to the broker"
    );
    metrics::describe_counter!(
        "queue_publish_skipped_total",
        "Messages dropped because the broker channel was not ready"
    );
    metrics::describe_counter!(
        "queue_messages_consumed_total",
        "Messages consumed by disposition"
    );
    metrics::describe_counter!(
        "side_channel_events_total",
        "Side-channel events logged by the worker"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录下单
#[inline]
pub fn record_order_placed(item_count: usize) {
    metrics::counter!("orders_placed_total").increment(1);
    metrics::histogram!("order_item_count").record(item_count as f64);
}

/// 记录一次订单处理的结果（completed / skipped / failed / not_found）
#[inline]
pub fn record_order_processing(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "order_processing_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "order_processing_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录消息已交给 broker
#[inline]
pub fn record_published(queue: &str) {
    metrics::counter!(
        "queue_messages_published_total",
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// 记录因通道未就绪而跳过的发布
#[inline]
pub fn record_publish_skipped(queue: &str) {
    metrics::counter!(
        "queue_publish_skipped_total",
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// 记录消费结果（ack / requeue / drop）
#[inline]
pub fn record_consumed(queue: &str, disposition: &str) {
    metrics::counter!(
        "queue_messages_consumed_total",
        "queue" => queue.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// 记录旁路事件（activity / analytics / notification）
#[inline]
pub fn record_side_channel_event(queue: &str, kind: &str) {
    metrics::counter!(
        "side_channel_events_total",
        "queue" => queue.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/orders/1", 200, 0.1);
        record_order_placed(2);
        record_order_processing("completed", 5.01);
        record_published("order-processing");
        record_publish_skipped("analytics-stream");
        record_consumed("order-processing", "ack");
        record_side_channel_event("user-activity", "order_created");
    }
}
