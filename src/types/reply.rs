//! Reply context types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::InputValue;

/// Marker keys identifying a quoted message as a story/status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryMarker {
    /// Reply to a story post.
    #[serde(rename = "storyReplyMessage")]
    StoryReply,
    /// Status message.
    #[serde(rename = "statusMessage")]
    Status,
    /// Story mention list.
    #[serde(rename = "storyMentionedJidList")]
    StoryMentionList,
    /// Story invite.
    #[serde(rename = "storyInvite")]
    StoryInvite,
}

impl StoryMarker {
    /// Every marker, in classification order.
    pub const ALL: [StoryMarker; 4] = [
        Self::StoryReply,
        Self::Status,
        Self::StoryMentionList,
        Self::StoryInvite,
    ];

    /// Key name in the quoted message.
    pub fn key(&self) -> &'static str {
        match self {
            Self::StoryReply => "storyReplyMessage",
            Self::Status => "statusMessage",
            Self::StoryMentionList => "storyMentionedJidList",
            Self::StoryInvite => "storyInvite",
        }
    }

    /// Parse from a key name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }
}

impl fmt::Display for StoryMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a message is replying to.
///
/// All fields are `None` when the envelope carries no context info.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyContext {
    /// Stanza id of the quoted message.
    pub stanza_id: Option<String>,
    /// Quoted message exactly as found in the envelope.
    pub quoted_message_raw: Option<InputValue>,
    /// Canonical form of the quoted message.
    pub quoted_message: Option<Value>,
}

impl ReplyContext {
    /// Context with every field empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a quoted message was found.
    pub fn has_quote(&self) -> bool {
        self.quoted_message_raw.is_some()
    }

    /// First story marker present on the canonical quoted message.
    pub fn story_marker(&self) -> Option<StoryMarker> {
        crate::extract::story_marker(self.quoted_message.as_ref())
    }

    /// Whether the quoted message is a story reply.
    pub fn is_story_reply(&self) -> bool {
        self.story_marker().is_some()
    }

    /// Serializable view without the raw graph handle.
    pub fn summary(&self) -> ReplyContextSummary {
        ReplyContextSummary {
            stanza_id: self.stanza_id.clone(),
            quoted_message: self.quoted_message.clone(),
            is_story_reply: self.is_story_reply(),
            story_marker: self.story_marker(),
        }
    }
}

/// Wire form of a [`ReplyContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContextSummary {
    /// Stanza id of the quoted message.
    pub stanza_id: Option<String>,
    /// Canonical quoted message.
    pub quoted_message: Option<Value>,
    /// Whether the quoted message is a story reply.
    pub is_story_reply: bool,
    /// Which story marker matched.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub story_marker: Option<StoryMarker>,
}
