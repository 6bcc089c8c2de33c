//! `rdkafka`-backed production transport, gated behind the `kafka` feature.
//!
//! Grounded in the connector pattern of `knhk-connectors`: a thin struct
//! around a `StreamConsumer`/`FutureProducer` pair, config built from
//! bootstrap servers plus a consumer-group id, with connection state kept
//! out of the hot path.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{EventLogTransport, InboundMessage};

pub struct KafkaTransport {
    bootstrap_servers: String,
    producer: FutureProducer,
    /// One `StreamConsumer` per consumer group, created lazily on first poll.
    consumers: Mutex<HashMap<String, StreamConsumer>>,
    partitions: usize,
}

impl KafkaTransport {
    pub fn connect(bootstrap_servers: &str, partitions: usize) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self {
            bootstrap_servers: bootstrap_servers.to_string(),
            producer,
            consumers: Mutex::new(HashMap::new()),
            partitions: partitions.max(1),
        })
    }

    async fn consumer_for(&self, topic: &str, group: &str) -> anyhow::Result<()> {
        let mut consumers = self.consumers.lock().await;
        if consumers.contains_key(group) {
            return Ok(());
        }
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[topic])?;
        consumers.insert(group.to_string(), consumer);
        Ok(())
    }
}

#[async_trait]
impl EventLogTransport for KafkaTransport {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&payload)?;
        let record = FutureRecord::to(topic).key(key).payload(&body);
        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("kafka publish failed: {e}"))?;
        Ok(())
    }

    async fn poll(&self, topic: &str, group: &str) -> anyhow::Result<Option<InboundMessage>> {
        self.consumer_for(topic, group).await?;
        let consumers = self.consumers.lock().await;
        let consumer = consumers
            .get(group)
            .ok_or_else(|| anyhow::anyhow!("consumer not initialised for group {group}"))?;

        match tokio::time::timeout(Duration::from_millis(250), consumer.recv()).await {
            Ok(Ok(msg)) => {
                let payload: Value = match msg.payload() {
                    Some(bytes) => serde_json::from_slice(bytes)?,
                    None => Value::Null,
                };
                let key = msg
                    .key()
                    .map(|k| String::from_utf8_lossy(k).to_string())
                    .unwrap_or_default();
                Ok(Some(InboundMessage {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key,
                    payload,
                }))
            }
            Ok(Err(e)) => Err(anyhow::anyhow!("kafka recv failed: {e}")),
            Err(_) => Ok(None),
        }
    }

    async fn commit(&self, group: &str, msg: &InboundMessage) -> anyhow::Result<()> {
        use rdkafka::topic_partition_list::TopicPartitionList;

        let consumers = self.consumers.lock().await;
        let consumer = consumers
            .get(group)
            .ok_or_else(|| anyhow::anyhow!("consumer not initialised for group {group}"))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &msg.topic,
            msg.partition,
            rdkafka::Offset::Offset(msg.offset + 1),
        )?;
        consumer.commit(&tpl, rdkafka::consumer::CommitMode::Async)?;
        Ok(())
    }

    fn partition_count(&self, _topic: &str) -> usize {
        self.partitions
    }
}
