//! 测试工具模块
//!
//! 提供内存版 broker，供网关、下单服务和订单工作者的测试使用，
//! 无需启动 Kafka 即可覆盖发布、消费、确认与重投递的完整链路。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::error::{BakeryError, Result};
use crate::queue::{
    Acker, BrokerChannel, BrokerConnector, ConsumerMessage, Delivery, DeliveryStream,
    QueueGateway, REDELIVERED_HEADER,
};
use crate::retry::RetryPolicy;

// ==================== 内存 broker ====================

#[derive(Debug, Clone)]
struct StoredMessage {
    offset: i64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct BrokerState {
    declared: Vec<String>,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    published: Vec<(String, Vec<u8>)>,
    acked: Vec<(String, Vec<u8>)>,
    rejected: Vec<(String, Vec<u8>, bool)>,
    fail_connects: u32,
    connect_attempts: u32,
    next_offset: i64,
    closed: bool,
}

/// 内存 broker
///
/// 同时实现 [`BrokerConnector`] 与 [`BrokerChannel`]，克隆后共享同一份状态。
/// 所有 `published` / `acked` / `rejected` 记录都保留，便于断言。
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 基于本 broker 创建并连接网关（单次尝试、无重试延迟）
    pub async fn connected_gateway(&self) -> Arc<QueueGateway> {
        let gateway = QueueGateway::new(
            Arc::new(self.clone()),
            RetryPolicy::fixed(1, Duration::ZERO),
        );
        if let Err(e) = gateway.connect().await {
            panic!("内存 broker 连接失败: {e}");
        }
        Arc::new(gateway)
    }

    /// 接下来的 `n` 次连接尝试返回 BrokerConnection 错误
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().fail_connects = n;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.state.lock().declared.clone()
    }

    /// 发布到指定队列的全部消息（按发布顺序，不含重投递）
    pub fn published(&self, queue: &str) -> Vec<Value> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| to_json(payload))
            .collect()
    }

    /// 所有队列的发布总数
    pub fn published_total(&self) -> usize {
        self.state.lock().published.len()
    }

    pub fn acked(&self, queue: &str) -> Vec<Value> {
        self.state
            .lock()
            .acked
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| to_json(payload))
            .collect()
    }

    /// 被拒绝的消息及其 requeue 标记
    pub fn rejected(&self, queue: &str) -> Vec<(Value, bool)> {
        self.state
            .lock()
            .rejected
            .iter()
            .filter(|(q, _, _)| q == queue)
            .map(|(_, payload, requeue)| (to_json(payload), *requeue))
            .collect()
    }

    /// 尚未被消费的消息数
    pub fn pending(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// 直接写入原始字节，绕过网关（用于构造非法负载）
    pub fn inject_raw(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.enqueue(queue, payload.into(), false);
    }

    /// 轮询等待条件成立，超时 panic
    pub async fn wait_until(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        while !condition(self) {
            if tokio::time::Instant::now() >= deadline {
                panic!("等待内存 broker 状态超时（{timeout:?}）");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn enqueue(&self, queue: &str, payload: Vec<u8>, redelivered: bool) {
        {
            let mut state = self.state.lock();
            let offset = state.next_offset;
            state.next_offset += 1;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(StoredMessage {
                    offset,
                    payload,
                    redelivered,
                });
        }
        self.notify.notify_waiters();
    }

    /// 取出下一条消息；broker 关闭后返回 None
    async fn next_message(&self, queue: &str) -> Option<StoredMessage> {
        loop {
            // 先注册通知再检查队列，避免丢失唤醒
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Some(message);
                }
            }
            notified.await;
        }
    }
}

fn to_json(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BakeryError::BrokerConnection(
                "connection refused (in-memory)".to_string(),
            ));
        }
        state.closed = false;
        drop(state);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.declared.iter().any(|q| q == queue) {
            state.declared.push(queue.to_string());
        }
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        self.state
            .lock()
            .published
            .push((queue.to_string(), payload.clone()));
        self.enqueue(queue, payload, false);
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream> {
        let permits = Arc::new(Semaphore::new(usize::from(prefetch.max(1))));
        let seed = (self.clone(), queue.to_string(), permits);

        let deliveries = stream::unfold(seed, |(broker, queue, permits)| async move {
            let permit = permits.clone().acquire_owned().await.ok()?;
            let stored = broker.next_message(&queue).await?;

            let mut message = ConsumerMessage::new(queue.clone(), stored.payload.clone());
            message.offset = stored.offset;
            message.redelivered = stored.redelivered;
            if stored.redelivered {
                message
                    .headers
                    .insert(REDELIVERED_HEADER.to_string(), "true".to_string());
            }

            let acker = InMemoryAcker {
                broker: broker.clone(),
                queue: queue.clone(),
                payload: stored.payload,
                _permit: permit,
            };

            let delivery = Delivery {
                message,
                acker: Box::new(acker),
            };
            Some((delivery, (broker, queue, permits)))
        });

        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        Ok(())
    }
}

struct InMemoryAcker {
    broker: InMemoryBroker,
    queue: String,
    payload: Vec<u8>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Acker for InMemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.broker
            .state
            .lock()
            .acked
            .push((self.queue.clone(), self.payload.clone()));
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.broker
            .state
            .lock()
            .rejected
            .push((self.queue.clone(), self.payload.clone(), requeue));
        if requeue {
            self.broker.enqueue(&self.queue, self.payload.clone(), true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let broker = InMemoryBroker::new();
        broker.fail_next_connects(1);

        assert!(broker.connect().await.is_err());
        assert!(broker.connect().await.is_ok());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_prefetch_limits_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        broker.publish("q", b"1".to_vec()).unwrap();
        broker.publish("q", b"2".to_vec()).unwrap();

        let mut stream = broker.consume("q", 1).await.unwrap();
        let first = stream.next().await.unwrap();

        // 第一条未确认前拿不到第二条
        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err());

        first.acker.ack().await.unwrap();
        drop(first);

        let second = stream.next().await.unwrap();
        assert_eq!(second.message.payload, b"2");
        assert_eq!(broker.acked("q"), vec![Value::from(1)]);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.consume("q", 1).await.unwrap();

        broker.close().await.unwrap();

        assert!(stream.next().await.is_none());
    }
}
