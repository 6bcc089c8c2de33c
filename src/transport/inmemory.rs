use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{EventLogTransport, InboundMessage, partition_for_key};

struct TopicState {
    partitions: Vec<Vec<InboundMessage>>,
}

impl TopicState {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
        }
    }
}

/// In-process transport for tests and local runs: each topic is a fixed set
/// of append-only partition logs. A consumer group's read position per
/// partition only advances on explicit `commit`, so a handler that never
/// commits sees the same message again on the next `poll` — the same
/// redelivery-on-failure semantics the spec requires of the real transport.
pub struct InMemoryTransport {
    default_partitions: usize,
    topics: Mutex<HashMap<String, TopicState>>,
    /// (group, topic, partition) -> next offset to hand out.
    cursors: Mutex<HashMap<(String, String, i32), i64>>,
}

impl InMemoryTransport {
    pub fn new(default_partitions: usize) -> Self {
        Self {
            default_partitions: default_partitions.max(1),
            topics: Mutex::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(default_partitions: usize) -> Arc<Self> {
        Arc::new(Self::new(default_partitions))
    }
}

#[async_trait]
impl EventLogTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, key: &str, payload: Value) -> anyhow::Result<()> {
        let mut topics = self.topics.lock();
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState::new(self.default_partitions));
        let partition = partition_for_key(key, state.partitions.len());
        let log = &mut state.partitions[partition as usize];
        let offset = log.len() as i64;
        log.push(InboundMessage {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.to_string(),
            payload,
        });
        Ok(())
    }

    async fn poll(&self, topic: &str, group: &str) -> anyhow::Result<Option<InboundMessage>> {
        let topics = self.topics.lock();
        let Some(state) = topics.get(topic) else {
            return Ok(None);
        };
        let mut cursors = self.cursors.lock();
        for (partition, log) in state.partitions.iter().enumerate() {
            let key = (group.to_string(), topic.to_string(), partition as i32);
            let next = *cursors.get(&key).unwrap_or(&0);
            if let Some(msg) = log.get(next as usize) {
                cursors.entry(key).or_insert(next);
                return Ok(Some(msg.clone()));
            }
        }
        Ok(None)
    }

    async fn commit(&self, group: &str, msg: &InboundMessage) -> anyhow::Result<()> {
        let mut cursors = self.cursors.lock();
        let key = (group.to_string(), msg.topic.clone(), msg.partition);
        cursors.insert(key, msg.offset + 1);
        Ok(())
    }

    fn partition_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|s| s.partitions.len())
            .unwrap_or(self.default_partitions)
    }
}
