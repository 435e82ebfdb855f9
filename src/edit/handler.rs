//! Mirror helpdesk edits back to the messaging backend.
//!
//! ## Flow
//!
//! ```text
//! webhook body → MessageUpdatedEvent → MessageStore lookup
//!     → MessagingClient::send_edit → rebuilt message → MessageStore update
//! ```
//!
//! Every early exit is reported as an [`EditOutcome`] rather than an error.
//! Only store failures surface as [`EditError`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::canonical::{canonical_hash_hex, Canonicalizer};
use crate::extract::extract_reply_context_with;
use crate::store::{MessageRecord, MessageStore};
use crate::types::{InputValue, ValueGraph};

use super::client::MessagingClient;
use super::event::MessageUpdatedEvent;

/// Field of the stored message that carries plain text.
const CONVERSATION_FIELD: &str = "conversation";

/// Tenant instance the webhook was delivered for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    /// Instance name.
    pub instance_name: String,
    /// Instance id, when known.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl InstanceRef {
    /// Create an instance reference.
    pub fn new(instance_name: impl Into<String>, instance_id: Option<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            instance_id,
        }
    }
}

/// Why a recognized edit event was not mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No messaging client for the instance.
    ClientUnavailable,
    /// The payload had no new text.
    MissingContent,
    /// The payload id is not an integer.
    InvalidMessageId,
    /// Neither a resolved nor an instance id was available.
    MissingInstanceId,
    /// No stored record for the composite key.
    RecordNotFound,
    /// The stored record lacks a message id or conversation.
    MissingKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientUnavailable => "client unavailable",
            Self::MissingContent => "missing new content",
            Self::InvalidMessageId => "invalid message id",
            Self::MissingInstanceId => "missing instance id",
            Self::RecordNotFound => "record not found",
            Self::MissingKey => "missing key identifiers",
        };
        f.write_str(s)
    }
}

/// Result of processing one webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    /// Not an edit event; the caller should keep processing the body.
    NotAnEdit,
    /// Edit event ignored.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
    /// The backend send failed; the stored record was left untouched.
    SendFailed {
        /// Client error message.
        error: String,
    },
    /// Edit sent and stored.
    Mirrored {
        /// Number of records rewritten.
        records_updated: u64,
    },
}

impl EditOutcome {
    /// Whether the event was consumed (mirrored or safely ignored).
    pub fn handled(&self) -> bool {
        !matches!(self, Self::NotAnEdit)
    }

    fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }
}

/// Error type for edit mirroring.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl EditError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

/// Mirrors helpdesk message edits to the messaging backend.
pub struct EditMirror<S: MessageStore> {
    store: Arc<S>,
    canonicalizer: Canonicalizer,
}

impl<S: MessageStore> EditMirror<S> {
    /// Create a mirror with default canonicalization.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_canonicalizer(store, Canonicalizer::default())
    }

    /// Create a mirror with a custom canonicalizer.
    pub fn with_canonicalizer(store: Arc<S>, canonicalizer: Canonicalizer) -> Self {
        Self { store, canonicalizer }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Process one webhook body.
    ///
    /// `resolved_instance_id` takes precedence over `instance.instance_id`.
    pub async fn handle<C: MessagingClient + ?Sized>(
        &self,
        body: &Value,
        instance: &InstanceRef,
        resolved_instance_id: Option<&str>,
        client: Option<&C>,
    ) -> Result<EditOutcome, EditError> {
        let Some(event) = MessageUpdatedEvent::from_payload(body) else {
            return Ok(EditOutcome::NotAnEdit);
        };

        debug!(
            chatwoot_id = %event.raw_id,
            has_new_content = event.new_content.is_some(),
            instance_payload = ?instance.instance_id,
            resolved_instance_id = ?resolved_instance_id,
            "Received message update payload"
        );

        let Some(client) = client else {
            warn!(instance = %instance.instance_name, "Messaging client not found for message update");
            return Ok(EditOutcome::skipped(SkipReason::ClientUnavailable));
        };

        let Some(new_content) = event.new_content.as_deref() else {
            warn!("Message update received without newContent payload");
            return Ok(EditOutcome::skipped(SkipReason::MissingContent));
        };

        let Some(message_id) = event.message_id() else {
            warn!(id = %event.raw_id, "Message update payload with invalid id");
            return Ok(EditOutcome::skipped(SkipReason::InvalidMessageId));
        };

        let instance_id = match resolved_instance_id.or(instance.instance_id.as_deref()) {
            Some(id) if !id.is_empty() => id,
            _ => {
                warn!(
                    payload_id = message_id,
                    instance_payload = ?instance.instance_id,
                    resolved_instance_id = ?resolved_instance_id,
                    "Message update without valid instance id"
                );
                return Ok(EditOutcome::skipped(SkipReason::MissingInstanceId));
            }
        };

        let record = self
            .store
            .find_by_chatwoot_id(instance_id, message_id)
            .await
            .map_err(EditError::from_store)?;

        let Some(record) = record else {
            warn!(chatwoot_message_id = message_id, instance_id = instance_id, "Message update target not found");
            return Ok(EditOutcome::skipped(SkipReason::RecordNotFound));
        };

        let Some((key, (key_id, remote_jid))) = record
            .key
            .as_ref()
            .and_then(|k| k.identifiers().map(|ids| (k, ids)))
        else {
            warn!(key = ?record.key, chatwoot_message_id = message_id, "Message update missing key identifiers");
            return Ok(EditOutcome::skipped(SkipReason::MissingKey));
        };

        self.log_reply_context(&record);

        debug!(remote_jid = remote_jid, key_id = key_id, "Forwarding edit to messaging backend");
        if let Err(e) = client.send_edit(remote_jid, new_content, key).await {
            error!(error = %e, "Error forwarding edited message");
            return Ok(EditOutcome::SendFailed { error: e.to_string() });
        }

        let updated = self.rebuild_message(record.message.as_ref(), new_content);
        debug!(
            instance_id = instance_id,
            chatwoot_message_id = message_id,
            fingerprint = %canonical_hash_hex(&updated),
            "Updating message record"
        );

        let records_updated = self
            .store
            .update_message(instance_id, message_id, updated)
            .await
            .map_err(EditError::from_store)?;

        Ok(EditOutcome::Mirrored { records_updated })
    }

    /// Stored content with its text replaced.
    ///
    /// A non-object payload is discarded. Every other field is kept as
    /// stored, in its original position.
    pub fn rebuild_message(&self, existing: Option<&Value>, new_content: &str) -> Value {
        let mut base = match existing {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        base.insert(CONVERSATION_FIELD.to_string(), Value::String(new_content.to_string()));
        Value::Object(base)
    }

    fn log_reply_context(&self, record: &MessageRecord) {
        let Some(message) = record.message.as_ref() else {
            return;
        };

        let mut graph = ValueGraph::new();
        let content = graph.import_json(message);
        let envelope = InputValue::Mapping(graph.add_mapping_from([("message", content)]));

        let context = extract_reply_context_with(&self.canonicalizer, &graph, Some(&envelope));
        if context.has_quote() {
            debug!(
                stanza_id = ?context.stanza_id,
                is_story_reply = context.is_story_reply(),
                story_marker = ?context.story_marker(),
                "Edited message quotes another message"
            );
        }
    }
}

impl<S: MessageStore> Clone for EditMirror<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            canonicalizer: self.canonicalizer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::CanonicalizeOptions;
    use crate::store::InMemoryMessageStore;
    use serde_json::json;

    fn mirror() -> EditMirror<InMemoryMessageStore> {
        EditMirror::new(Arc::new(InMemoryMessageStore::new()))
    }

    #[test]
    fn test_rebuild_keeps_other_fields_in_order() {
        let existing = json!({ "conversation": "old", "messageContextInfo": { "deviceListMetadataVersion": 2 } });
        let rebuilt = mirror().rebuild_message(Some(&existing), "new");

        assert_eq!(
            rebuilt,
            json!({ "conversation": "new", "messageContextInfo": { "deviceListMetadataVersion": 2 } })
        );
        let keys: Vec<_> = rebuilt.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["conversation", "messageContextInfo"]);
    }

    #[test]
    fn test_rebuild_discards_non_object_payloads() {
        let m = mirror();
        assert_eq!(m.rebuild_message(None, "t"), json!({ "conversation": "t" }));
        assert_eq!(m.rebuild_message(Some(&json!(["x"])), "t"), json!({ "conversation": "t" }));
        assert_eq!(m.rebuild_message(Some(&json!("x")), "t"), json!({ "conversation": "t" }));
    }

    #[test]
    fn test_rebuild_ignores_canonicalization_limits() {
        let options = CanonicalizeOptions::default().with_max_depth(2).with_max_nodes(2);
        let m = EditMirror::with_canonicalizer(
            Arc::new(InMemoryMessageStore::new()),
            Canonicalizer::new(options),
        );
        let existing = json!({ "conversation": "old", "a": { "b": { "c": 1 } } });

        assert_eq!(
            m.rebuild_message(Some(&existing), "new"),
            json!({ "conversation": "new", "a": { "b": { "c": 1 } } })
        );
    }

    #[test]
    fn test_rebuild_keeps_exact_large_integers() {
        let existing: Value = serde_json::from_str(r#"{"fileLength":9007199254740993}"#).unwrap();
        let rebuilt = mirror().rebuild_message(Some(&existing), "caption");

        assert_eq!(rebuilt["fileLength"].as_u64(), Some(9_007_199_254_740_993));
        assert_eq!(rebuilt.to_string(), r#"{"fileLength":9007199254740993,"conversation":"caption"}"#);
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = EditOutcome::skipped(SkipReason::RecordNotFound);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({ "outcome": "skipped", "reason": "record_not_found" })
        );
        assert!(outcome.handled());
        assert!(!EditOutcome::NotAnEdit.handled());
    }
}
