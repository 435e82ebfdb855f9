//! # envelope-kernel
//!
//! Graph-safe canonicalization for messaging envelopes.
//!
//! The kernel answers two questions:
//!
//! > What is the JSON-safe form of this loosely-typed object graph?
//!
//! > What, if anything, is this message replying to?
//!
//! ## Core Contract
//!
//! 1. Convert an arbitrary envelope graph (64-bit wrappers, binary views,
//!    dates, shared and cyclic references) into a canonical JSON tree
//! 2. Locate the quoted message of an envelope and canonicalize it
//! 3. Classify a quoted message as a story/status reply
//!
//! ## Architecture
//!
//! ```text
//! Envelope → ValueGraph → extract_reply_context → ReplyContext
//!                 ↓                  ↓
//!           Canonicalizer ←──────────┘
//!                 ↓
//!          serde_json::Value
//! ```
//!
//! Around the core sit the edit mirror (helpdesk edits → messaging backend)
//! and, behind the `service` feature, an HTTP surface.
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same visited set → identical output
//! - Mapping key order is input insertion order
//! - No state outlives a single call

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod extract;
pub mod store;
pub mod edit;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    AsBytes, BinaryKind, BinaryView, InputValue, Int64, Mapping, NodeId, ValueGraph,
    ReplyContext, ReplyContextSummary, StoryMarker,
};
pub use canonical::{
    canonicalize, canonicalize_with, binary_descriptor, format_iso8601,
    to_canonical_bytes, canonical_hash, canonical_hash_hex,
    BigIntMode, CanonicalizeError, CanonicalizeOptions, Canonicalizer, VisitedSet,
    BINARY_ENCODING, MAX_SAFE_INTEGER,
};
pub use extract::{
    extract_reply_context, extract_reply_context_with, has_story_quoted_message, story_marker,
};
pub use store::{InMemoryMessageStore, InMemoryStoreError, MessageKey, MessageRecord, MessageStore};
pub use edit::{
    ClientError, EditError, EditMirror, EditOutcome, InstanceRef, LoggingMessagingClient,
    MessageUpdatedEvent, MessagingClient, SkipReason,
};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version of the canonical output and wire types.
/// Increment on breaking changes to any of them.
pub const ENVELOPE_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
