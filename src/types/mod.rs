//! Core types for the envelope kernel.

pub mod value;
pub mod reply;

pub use value::{AsBytes, BinaryKind, BinaryView, InputValue, Int64, Mapping, NodeId, ValueGraph};
pub use reply::{ReplyContext, ReplyContextSummary, StoryMarker};
