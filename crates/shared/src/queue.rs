//! 队列网关
//!
//! 对上层（下单服务、订单工作者）暴露三个原语：带重试的 `connect`、
//! 尽力而为的 `publish`、带预取上限与显式确认的 `consume`。
//!
//! 底层 broker 通过 [`BrokerConnector`] / [`BrokerChannel`] 抽象接入，
//! 生产环境使用 Kafka 适配器（见 [`crate::kafka`]），测试使用内存实现
//! （见 [`crate::test_utils::InMemoryBroker`]）。
//!
//! 网关以显式注入的句柄存在，内部维护连接状态机：
//! DISCONNECTED -> CONNECTING -> READY，未就绪时发布静默跳过。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::{BakeryError, Result};
use crate::events::queues;
use crate::observability::metrics;
use crate::retry::{RetryPolicy, retry_with_policy};

/// 重投递消息携带的头部标记
pub const REDELIVERED_HEADER: &str = "x-redelivered";

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的消息的统一表示
///
/// 与具体 broker 无关，拥有全部字段的所有权，可以安全地跨 await 点传递。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub queue: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
    /// 是否为 reject(requeue) 之后的再次投递
    pub redelivered: bool,
}

impl ConsumerMessage {
    /// 以最少字段构造消息，主要用于测试与内存 broker
    pub fn new(queue: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            queue: queue.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.into(),
            timestamp: None,
            headers: HashMap::new(),
            redelivered: false,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| BakeryError::Validation(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(BakeryError::from)
    }
}

// ---------------------------------------------------------------------------
// 确认语义
// ---------------------------------------------------------------------------

/// 消息处理完成后的处置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 处理成功，永久移出队列
    Ack,
    /// 处理失败；`requeue` 为 true 时重新投递，否则丢弃
    Reject { requeue: bool },
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Reject { requeue: true } => "requeue",
            Self::Reject { requeue: false } => "drop",
        }
    }
}

/// 单条消息的确认句柄
///
/// 句柄被 drop 之前，该消息占用消费者的一个预取名额。
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<()>;

    async fn reject(&self, requeue: bool) -> Result<()>;
}

/// 一次投递：消息本体加上确认句柄
pub struct Delivery {
    pub message: ConsumerMessage,
    pub acker: Box<dyn Acker>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

pub type DeliveryStream = BoxStream<'static, Delivery>;

// ---------------------------------------------------------------------------
// Broker 抽象
// ---------------------------------------------------------------------------

/// 建立到 broker 的连接
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>>;
}

/// 已建立的 broker 通道
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// 声明持久化队列；队列已存在时视为成功
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// 持久化发送，不等待投递确认
    fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()>;

    /// 订阅队列，`prefetch` 限制未确认消息数
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream>;

    async fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// QueueGateway
// ---------------------------------------------------------------------------

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
        }
    }
}

struct GatewayInner {
    state: ConnectionState,
    channel: Option<Arc<dyn BrokerChannel>>,
}

/// 可重连的队列网关句柄
pub struct QueueGateway {
    connector: Arc<dyn BrokerConnector>,
    policy: RetryPolicy,
    inner: RwLock<GatewayInner>,
    /// 串行化并发的 connect 调用
    connect_lock: Mutex<()>,
}

impl QueueGateway {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            inner: RwLock::new(GatewayInner {
                state: ConnectionState::Disconnected,
                channel: None,
            }),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn channel(&self) -> Option<Arc<dyn BrokerChannel>> {
        let inner = self.inner.read();
        match inner.state {
            ConnectionState::Ready => inner.channel.clone(),
            _ => None,
        }
    }

    fn set_state(&self, state: ConnectionState, channel: Option<Arc<dyn BrokerChannel>>) {
        let mut inner = self.inner.write();
        inner.state = state;
        inner.channel = channel;
    }

    /// 连接 broker 并声明全部持久化队列
    ///
    /// 按固定次数、固定间隔重试；每次成功连接都会重新声明队列。
    /// 已就绪时直接返回。
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting, None);

        let max_attempts = self.policy.max_attempts;
        let connector = self.connector.clone();

        let result = retry_with_policy(
            &self.policy,
            "queue_connect",
            |e| e.is_retryable(),
            |attempt| {
                let connector = connector.clone();
                async move {
                    info!(attempt, max_attempts, "正在连接消息队列");
                    let channel = connector.connect().await?;
                    for queue in queues::ALL {
                        channel.declare_queue(queue).await?;
                    }
                    Ok(channel)
                }
            },
        )
        .await;

        match result {
            Ok(channel) => {
                self.set_state(ConnectionState::Ready, Some(channel));
                info!(queues = ?queues::ALL, "消息队列已连接，队列声明完成");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected, None);
                error!(error = %e, max_attempts, "消息队列连接失败，重试次数已用尽");
                Err(e)
            }
        }
    }

    /// 序列化并发布消息（尽力而为）
    ///
    /// 通道未就绪、序列化失败或底层发送失败都只记录日志，不向调用方传播。
    /// 返回值表示消息是否已交给 broker。
    pub fn publish<T: Serialize>(&self, queue: &str, message: &T) -> bool {
        let Some(channel) = self.channel() else {
            warn!(queue, "消息队列通道未就绪，跳过发布");
            metrics::record_publish_skipped(queue);
            return false;
        };

        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(queue, error = %e, "消息序列化失败，跳过发布");
                return false;
            }
        };

        match channel.publish(queue, payload) {
            Ok(()) => {
                debug!(queue, "消息已发布");
                metrics::record_published(queue);
                true
            }
            Err(e) => {
                warn!(queue, error = %e, "消息发布失败");
                false
            }
        }
    }

    /// 消费队列直到收到关闭信号
    ///
    /// handler 对每条消息调用一次，返回值决定 ack / reject。
    /// 最多 `prefetch` 条消息并发处理；收到关闭信号后不再拉取新消息，
    /// 等待处理中的消息完成确认后返回。
    pub async fn consume<F, Fut>(
        &self,
        queue: &str,
        prefetch: u16,
        shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(ConsumerMessage) -> Fut + Send + Sync,
        Fut: Future<Output = Disposition> + Send,
    {
        let channel = self
            .channel()
            .ok_or_else(|| BakeryError::QueueUnavailable(queue.to_string()))?;

        let prefetch = prefetch.max(1);
        let stream = channel.consume(queue, prefetch).await?;

        info!(queue, prefetch, "开始消费队列");

        stream
            .take_until(wait_for_shutdown(shutdown))
            .for_each_concurrent(usize::from(prefetch), |delivery| {
                let handler = &handler;
                async move {
                    let Delivery { message, acker } = delivery;
                    let queue = message.queue.clone();
                    let disposition = handler(message).await;
                    settle(&queue, acker.as_ref(), disposition).await;
                }
            })
            .await;

        info!(queue, "队列消费已停止");
        Ok(())
    }

    /// 关闭通道与连接，状态回到 DISCONNECTED
    pub async fn close(&self) {
        let channel = {
            let mut inner = self.inner.write();
            inner.state = ConnectionState::Disconnected;
            inner.channel.take()
        };

        if let Some(channel) = channel {
            match channel.close().await {
                Ok(()) => info!("消息队列连接已关闭"),
                Err(e) => warn!(error = %e, "关闭消息队列连接出错"),
            }
        }
    }
}

/// 关闭信号变为 true 或发送端被 drop 时完成
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn settle(queue: &str, acker: &dyn Acker, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => acker.ack().await,
        Disposition::Reject { requeue } => acker.reject(requeue).await,
    };

    match result {
        Ok(()) => metrics::record_consumed(queue, disposition.as_str()),
        Err(e) => error!(
            queue,
            disposition = disposition.as_str(),
            error = %e,
            "消息确认失败，等待 broker 重新投递"
        ),
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
