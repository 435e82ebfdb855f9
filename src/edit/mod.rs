//! Edit mirroring between the helpdesk and the messaging backend.

pub mod client;
pub mod event;
pub mod handler;

pub use client::{ClientError, LoggingMessagingClient, MessagingClient};
pub use event::{MessageUpdatedEvent, MESSAGE_UPDATED_EVENT};
pub use handler::{EditError, EditMirror, EditOutcome, InstanceRef, SkipReason};
