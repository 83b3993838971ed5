//! Kafka 适配器
//!
//! 把 rdkafka 映射为队列网关需要的 broker 语义：
//!
//! - 队列即 topic，声明队列 = 不存在时创建 topic（已存在视为成功）
//! - 持久化发送 = `acks=all` + 幂等生产者
//! - ack = 提交下一条位点（关闭自动提交）
//! - reject(requeue) = 带 `x-redelivered` 头回投到同一 topic 后提交位点
//! - reject(drop) = 直接提交位点
//!
//! 每个队列使用独立消费组 `{consumer_group}.{queue}`，
//! 预取上限由信号量控制：确认句柄被 drop 前占用一个名额。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{BakeryError, Result};
use crate::queue::{
    Acker, BrokerChannel, BrokerConnector, ConsumerMessage, Delivery, DeliveryStream,
    REDELIVERED_HEADER,
};

/// 消费出错后的退避，避免 broker 故障时空转刷日志
const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// KafkaConnector
// ---------------------------------------------------------------------------

/// 每次 `connect` 创建一组新的生产者与管理客户端
pub struct KafkaConnector {
    config: KafkaConfig,
}

impl KafkaConnector {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>> {
        let channel = KafkaChannel::open(self.config.clone()).await?;
        Ok(Arc::new(channel))
    }
}

// ---------------------------------------------------------------------------
// KafkaChannel
// ---------------------------------------------------------------------------

pub struct KafkaChannel {
    config: KafkaConfig,
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
}

impl KafkaChannel {
    /// 创建客户端并拉取一次集群元数据，确认 broker 可达
    ///
    /// librdkafka 的客户端创建是惰性的，不探测就无法区分 "broker 未启动"。
    pub async fn open(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BakeryError::BrokerConnection(format!("创建生产者失败: {e}")))?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .create()
            .map_err(|e| BakeryError::BrokerConnection(format!("创建管理客户端失败: {e}")))?;

        let metadata_producer = producer.clone();
        let timeout = Duration::from_millis(config.metadata_timeout_ms);
        let broker_count = tokio::task::spawn_blocking(move || {
            metadata_producer
                .client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| BakeryError::Internal(format!("元数据探测任务异常: {e}")))?
        .map_err(|e| BakeryError::BrokerConnection(format!("无法获取集群元数据: {e}")))?;

        info!(brokers = %config.brokers, broker_count, "Kafka 连接已建立");

        Ok(Self {
            config,
            producer,
            admin,
        })
    }

    /// 发送并在后台记录投递结果
    fn send_detached(&self, queue: &str, payload: &[u8], headers: Option<OwnedHeaders>) -> Result<()> {
        let mut record = FutureRecord::<(), [u8]>::to(queue).payload(payload);
        if let Some(headers) = headers {
            record = record.headers(headers);
        }

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| BakeryError::Kafka(format!("消息入队失败: {e}")))?;

        let queue = queue.to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok(delivery)) => debug!(
                    queue = %queue,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "消息已投递"
                ),
                Ok(Err((e, _))) => warn!(queue = %queue, error = %e, "消息投递失败"),
                Err(_) => warn!(queue = %queue, "投递结果通道已取消"),
            }
        });

        Ok(())
    }

    fn create_consumer(&self, queue: &str) -> Result<StreamConsumer> {
        let group_id = format!("{}.{}", self.config.consumer_group, queue);

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| BakeryError::Kafka(format!("创建消费者失败: {e}")))?;

        consumer
            .subscribe(&[queue])
            .map_err(|e| BakeryError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(queue, group_id, "Kafka 消费者已订阅");
        Ok(consumer)
    }
}

#[async_trait]
impl BrokerChannel for KafkaChannel {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let topic = NewTopic::new(
            queue,
            self.config.topic_partitions,
            TopicReplication::Fixed(self.config.replication_factor),
        );
        let options = AdminOptions::new()
            .operation_timeout(Some(Duration::from_millis(self.config.metadata_timeout_ms)));

        let results = self
            .admin
            .create_topics(&[topic], &options)
            .await
            .map_err(|e| BakeryError::Kafka(format!("声明队列失败: {e}")))?;

        for result in results {
            match result {
                Ok(name) => info!(queue = %name, "队列已创建"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(queue = %name, "队列已存在")
                }
                Err((name, code)) => {
                    return Err(BakeryError::Kafka(format!("声明队列 {name} 失败: {code}")));
                }
            }
        }

        Ok(())
    }

    fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        self.send_detached(queue, &payload, None)
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream> {
        let consumer = Arc::new(self.create_consumer(queue)?);
        let permits = Arc::new(Semaphore::new(usize::from(prefetch.max(1))));
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(forward_deliveries(
            consumer,
            self.producer.clone(),
            queue.to_string(),
            permits,
            tx,
        ));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = Duration::from_millis(self.config.message_timeout_ms);
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BakeryError::Internal(format!("flush 任务异常: {e}")))?
            .map_err(|e| BakeryError::Kafka(format!("flush 未完成: {e}")))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 消费转发
// ---------------------------------------------------------------------------

/// 从 StreamConsumer 拉取消息并转发给网关
///
/// 每条消息先占用一个预取名额；下游 receiver 被 drop 时退出。
async fn forward_deliveries(
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    queue: String,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<Delivery>,
) {
    loop {
        let permit = tokio::select! {
            _ = tx.closed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let delivery = tokio::select! {
            _ = tx.closed() => break,
            received = consumer.recv() => into_delivery(received, &consumer, &producer, permit),
        };

        match delivery {
            Some(delivery) => {
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
            None => tokio::time::sleep(RECV_ERROR_BACKOFF).await,
        }
    }

    info!(queue = %queue, "Kafka 消费转发已退出");
}

fn into_delivery(
    received: KafkaResult<BorrowedMessage<'_>>,
    consumer: &Arc<StreamConsumer>,
    producer: &FutureProducer,
    permit: OwnedSemaphorePermit,
) -> Option<Delivery> {
    match received {
        Ok(borrowed) => {
            let message = message_from_borrowed(&borrowed);
            debug!(
                queue = %message.queue,
                partition = message.partition,
                offset = message.offset,
                redelivered = message.redelivered,
                "收到 Kafka 消息"
            );

            let acker = KafkaAcker {
                consumer: consumer.clone(),
                producer: producer.clone(),
                topic: message.queue.clone(),
                partition: message.partition,
                offset: message.offset,
                payload: message.payload.clone(),
                _permit: permit,
            };

            Some(Delivery {
                message,
                acker: Box::new(acker),
            })
        }
        Err(e) => {
            error!(error = %e, "接收 Kafka 消息出错");
            None
        }
    }
}

/// 从 rdkafka 的借用消息构造，提取并拥有所有字段
fn message_from_borrowed(msg: &BorrowedMessage<'_>) -> ConsumerMessage {
    let key = msg
        .key()
        .and_then(|k| std::str::from_utf8(k).ok())
        .map(String::from);

    let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

    let mut headers = HashMap::new();
    if let Some(h) = msg.headers() {
        for idx in 0..h.count() {
            let header = h.get(idx);
            if let Some(raw) = header.value
                && let Ok(value) = std::str::from_utf8(raw)
            {
                headers.insert(header.key.to_string(), value.to_string());
            }
        }
    }

    let redelivered = headers.contains_key(REDELIVERED_HEADER);

    ConsumerMessage {
        queue: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key,
        payload,
        timestamp: msg.timestamp().to_millis(),
        headers,
        redelivered,
    }
}

fn redelivered_headers() -> OwnedHeaders {
    OwnedHeaders::new().insert(Header {
        key: REDELIVERED_HEADER,
        value: Some("true"),
    })
}

// ---------------------------------------------------------------------------
// KafkaAcker
// ---------------------------------------------------------------------------

struct KafkaAcker {
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    topic: String,
    partition: i32,
    offset: i64,
    payload: Vec<u8>,
    _permit: OwnedSemaphorePermit,
}

impl KafkaAcker {
    fn commit(&self) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
            .map_err(|e| BakeryError::Kafka(format!("构造提交位点失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| BakeryError::Kafka(format!("提交位点失败: {e}")))
    }
}

#[async_trait]
impl Acker for KafkaAcker {
    async fn ack(&self) -> Result<()> {
        self.commit()
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        if requeue {
            // 回投成功后才提交，回投失败时原消息会在重平衡后被再次消费
            let record = FutureRecord::<(), [u8]>::to(&self.topic)
                .payload(self.payload.as_slice())
                .headers(redelivered_headers());

            self.producer
                .send(record, Duration::from_secs(5))
                .await
                .map_err(|(e, _)| BakeryError::Kafka(format!("消息回投失败: {e}")))?;

            debug!(topic = %self.topic, offset = self.offset, "消息已回投");
        }

        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redelivered_header() {
        let headers = redelivered_headers();
        assert_eq!(headers.count(), 1);
        let header = headers.get(0);
        assert_eq!(header.key, REDELIVERED_HEADER);
        assert_eq!(header.value, Some(b"true".as_slice()));
    }

    #[test]
    fn test_connector_keeps_config() {
        let connector = KafkaConnector::new(KafkaConfig {
            consumer_group: "bakery-test".to_string(),
            ..Default::default()
        });
        assert_eq!(connector.config.consumer_group, "bakery-test");
    }
}
