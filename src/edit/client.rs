//! Outbound messaging client seam.

use async_trait::async_trait;

use crate::store::MessageKey;

/// Error type for outbound sends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The backend rejected or failed the send.
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// The client has no live connection.
    #[error("Client not connected")]
    NotConnected,
}

/// Client able to edit a message already delivered on the messaging backend.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Replace the text of the message identified by `key` in `remote_jid`.
    async fn send_edit(&self, remote_jid: &str, text: &str, key: &MessageKey) -> Result<(), ClientError>;
}

/// Client that records edits in the log instead of sending them.
///
/// Used when the outbound leg is operated by another process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessagingClient;

#[async_trait]
impl MessagingClient for LoggingMessagingClient {
    async fn send_edit(&self, remote_jid: &str, text: &str, key: &MessageKey) -> Result<(), ClientError> {
        tracing::info!(
            remote_jid = remote_jid,
            key_id = ?key.id,
            text_len = text.chars().count(),
            "Edit recorded (logging client)"
        );
        Ok(())
    }
}
