//! In-memory conversation store, used for `--ephemeral` chats and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};

use super::{
    build_records, sort_summaries, ConversationRecord, ConversationStore, ConversationSummary,
    DEFAULT_TTL_DAYS,
};
use crate::error::PersistenceError;
use crate::types::Message;

#[derive(Default)]
struct Partition {
    latest: Option<ConversationRecord>,
    snapshots: Vec<ConversationRecord>,
}

impl Partition {
    /// Drop expired records, returning how many went.
    fn purge(&mut self, now: chrono::DateTime<Utc>) -> usize {
        let mut removed = 0;
        if self.latest.as_ref().is_some_and(|r| r.is_expired(now)) {
            self.latest = None;
            removed += 1;
        }
        let before = self.snapshots.len();
        self.snapshots.retain(|r| !r.is_expired(now));
        removed + (before - self.snapshots.len())
    }

    fn is_empty(&self) -> bool {
        self.latest.is_none() && self.snapshots.is_empty()
    }
}

/// Conversation store held entirely in process memory.
pub struct MemoryConversationStore {
    partitions: RwLock<HashMap<String, Partition>>,
    ttl: Duration,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        MemoryConversationStore {
            partitions: RwLock::new(HashMap::new()),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn save(&self, id: &str, messages: &[Message]) -> Result<(), PersistenceError> {
        let (latest, audit) = build_records(id, messages, Utc::now(), self.ttl);
        let mut partitions = self.partitions.write().map_err(|_| PersistenceError::Poisoned)?;
        let partition = partitions.entry(id.to_string()).or_default();
        partition.latest = Some(latest);
        partition.snapshots.push(audit);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Vec<Message>, PersistenceError> {
        let now = Utc::now();
        let mut partitions = self.partitions.write().map_err(|_| PersistenceError::Poisoned)?;
        let Some(partition) = partitions.get_mut(id) else {
            return Ok(Vec::new());
        };
        partition.purge(now);
        let messages = partition
            .latest
            .as_ref()
            .map(ConversationRecord::decode_messages)
            .unwrap_or_default();
        if partition.is_empty() {
            partitions.remove(id);
        }
        Ok(messages)
    }

    fn list(&self) -> Result<Vec<ConversationSummary>, PersistenceError> {
        let now = Utc::now();
        let partitions = self.partitions.read().map_err(|_| PersistenceError::Poisoned)?;
        let mut summaries: Vec<ConversationSummary> = partitions
            .values()
            .filter_map(|p| p.latest.as_ref())
            .filter(|r| !r.is_expired(now))
            .map(ConversationSummary::from_record)
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    fn snapshots(&self, id: &str) -> Result<Vec<String>, PersistenceError> {
        let now = Utc::now();
        let partitions = self.partitions.read().map_err(|_| PersistenceError::Poisoned)?;
        Ok(partitions
            .get(id)
            .map(|p| {
                p.snapshots
                    .iter()
                    .filter(|r| !r.is_expired(now))
                    .map(|r| r.timestamp.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn load_snapshot(&self, id: &str, timestamp: &str) -> Result<Vec<Message>, PersistenceError> {
        let now = Utc::now();
        let partitions = self.partitions.read().map_err(|_| PersistenceError::Poisoned)?;
        Ok(partitions
            .get(id)
            .and_then(|p| p.snapshots.iter().find(|r| r.timestamp == timestamp))
            .filter(|r| !r.is_expired(now))
            .map(ConversationRecord::decode_messages)
            .unwrap_or_default())
    }

    fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut partitions = self.partitions.write().map_err(|_| PersistenceError::Poisoned)?;
        Ok(partitions.remove(id).is_some())
    }

    fn purge_expired(&self) -> Result<usize, PersistenceError> {
        let now = Utc::now();
        let mut partitions = self.partitions.write().map_err(|_| PersistenceError::Poisoned)?;
        let removed = partitions.values_mut().map(|p| p.purge(now)).sum();
        partitions.retain(|_, p| !p.is_empty());
        Ok(removed)
    }
}
