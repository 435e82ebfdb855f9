//! Message record storage backends.
//!
//! Records are keyed by the helpdesk-assigned numeric message id plus the
//! tenant instance id. The kernel never reads or writes on its own; the
//! edit mirror drives these calls.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider-native reference to a message on the messaging backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Message id on the messaging backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conversation the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    /// Whether the message was sent by this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_me: Option<bool>,
    /// Group participant that authored the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    /// Any other fields the backend stored on the key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageKey {
    /// Create a key from message id and conversation.
    pub fn new(id: impl Into<String>, remote_jid: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            remote_jid: Some(remote_jid.into()),
            ..Self::default()
        }
    }

    /// `(id, remote_jid)` when both are present and non-empty.
    pub fn identifiers(&self) -> Option<(&str, &str)> {
        let id = self.id.as_deref().filter(|s| !s.is_empty())?;
        let remote_jid = self.remote_jid.as_deref().filter(|s| !s.is_empty())?;
        Some((id, remote_jid))
    }
}

/// Stored message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Record id.
    pub id: String,
    /// Tenant instance id.
    pub instance_id: String,
    /// Helpdesk message id, when the message was mirrored there.
    #[serde(default)]
    pub chatwoot_message_id: Option<i64>,
    /// Backend message key.
    #[serde(default)]
    pub key: Option<MessageKey>,
    /// Message content as stored.
    #[serde(default)]
    pub message: Option<Value>,
}

impl MessageRecord {
    /// Whether the record matches the composite key.
    pub fn matches(&self, instance_id: &str, chatwoot_message_id: i64) -> bool {
        self.instance_id == instance_id && self.chatwoot_message_id == Some(chatwoot_message_id)
    }
}

/// Trait for message storage backends.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the first record for a composite key.
    async fn find_by_chatwoot_id(
        &self,
        instance_id: &str,
        chatwoot_message_id: i64,
    ) -> Result<Option<MessageRecord>, Self::Error>;

    /// Replace the `message` field of every record for a composite key.
    ///
    /// Returns the number of records written.
    async fn update_message(
        &self,
        instance_id: &str,
        chatwoot_message_id: i64,
        message: Value,
    ) -> Result<u64, Self::Error>;
}

pub use memory::{InMemoryMessageStore, InMemoryStoreError};
