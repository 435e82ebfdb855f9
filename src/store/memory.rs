//! In-memory message store for testing and seeded deployments.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{MessageRecord, MessageStore};

/// Error type for in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryStoreError {
    /// A record with the same id already exists.
    #[error("Duplicate record id: {0}")]
    DuplicateRecord(String),
    /// Seed file could not be read.
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    /// Seed file is not a JSON array of records.
    #[error("Invalid seed file: {0}")]
    Json(#[from] serde_json::Error),
}

/// In-memory message store.
///
/// Records keep insertion order; lookups return the first match.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: RwLock<Vec<MessageRecord>>,
}

impl InMemoryMessageStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`.
    pub fn from_records(records: Vec<MessageRecord>) -> Result<Self, InMemoryStoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Load records from a JSON array file.
    pub fn load_seed(path: impl AsRef<Path>) -> Result<Self, InMemoryStoreError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<MessageRecord> = serde_json::from_str(&raw)?;
        Self::from_records(records)
    }

    /// Add a record.
    pub fn insert(&self, record: MessageRecord) -> Result<(), InMemoryStoreError> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(InMemoryStoreError::DuplicateRecord(record.id));
        }
        records.push(record);
        Ok(())
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<MessageRecord> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot of all records.
    pub fn all_records(&self) -> Vec<MessageRecord> {
        self.records.read().clone()
    }

    /// Get number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    type Error = InMemoryStoreError;

    async fn find_by_chatwoot_id(
        &self,
        instance_id: &str,
        chatwoot_message_id: i64,
    ) -> Result<Option<MessageRecord>, Self::Error> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.matches(instance_id, chatwoot_message_id))
            .cloned())
    }

    async fn update_message(
        &self,
        instance_id: &str,
        chatwoot_message_id: i64,
        message: Value,
    ) -> Result<u64, Self::Error> {
        let mut records = self.records.write();
        let mut updated = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.matches(instance_id, chatwoot_message_id))
        {
            record.message = Some(message.clone());
            updated += 1;
        }
        Ok(updated)
    }
}
