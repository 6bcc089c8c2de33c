pub mod inmemory;
#[cfg(feature = "kafka")]
pub mod kafka;

use async_trait::async_trait;
use serde_json::Value;

/// A message as handed to a consumer: the raw JSON payload plus enough
/// transport coordinates to build a DLQ record (§6, §4.3).
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: String,
    pub payload: Value,
}

/// Append-only partitioned topic abstraction (C1, §4.1).
///
/// Partitioning is by key hash: two publishes with the same key land on the
/// same partition and are therefore delivered in order to one consumer.
/// Delivery is at-least-once; offsets commit only after the handler returns
/// success (`subscribe`'s handler closure controls this — see
/// [`EventLogTransport::subscribe`]).
#[async_trait]
pub trait EventLogTransport: Send + Sync + 'static {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> anyhow::Result<()>;

    /// Pulls the next message for `group` from any partition of `topic` this
    /// consumer owns. Returns `None` when the transport is shutting down and
    /// has no more buffered messages (used to unwind worker loops cleanly).
    async fn poll(&self, topic: &str, group: &str) -> anyhow::Result<Option<InboundMessage>>;

    /// Commits the offset for a message this consumer has finished handling
    /// successfully. Must be called before the message is considered
    /// delivered; skipping it causes redelivery on the next poll/rebalance.
    async fn commit(&self, group: &str, msg: &InboundMessage) -> anyhow::Result<()>;

    fn partition_count(&self, topic: &str) -> usize;
}

pub fn partition_for_key(key: &str, partitions: usize) -> i32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as i32
}
