//! Reply-context extraction and story-reply classification.
//!
//! An envelope may carry a "context info" substructure describing the
//! message it replies to. Three envelope shapes are probed, in order:
//!
//! ```text
//! message.extendedTextMessage.contextInfo
//! message.contextInfo
//! contextInfo
//! ```
//!
//! The first path resolving to a non-null value wins.

use serde_json::Value;

use crate::canonical::{Canonicalizer, VisitedSet};
use crate::types::{InputValue, ReplyContext, StoryMarker, ValueGraph};

const CONTEXT_INFO_PATHS: [&[&str]; 3] = [
    &["message", "extendedTextMessage", "contextInfo"],
    &["message", "contextInfo"],
    &["contextInfo"],
];

/// Extract the reply context of an envelope with default canonicalization.
///
/// A missing or falsy envelope, or one with no context info, yields
/// [`ReplyContext::empty`].
pub fn extract_reply_context(graph: &ValueGraph, envelope: Option<&InputValue>) -> ReplyContext {
    extract_reply_context_with(&Canonicalizer::default(), graph, envelope)
}

/// Extract the reply context using `canonicalizer` for the quoted message.
pub fn extract_reply_context_with(
    canonicalizer: &Canonicalizer,
    graph: &ValueGraph,
    envelope: Option<&InputValue>,
) -> ReplyContext {
    let Some(envelope) = envelope.filter(|e| e.is_truthy()) else {
        return ReplyContext::empty();
    };

    let Some(context_info) = CONTEXT_INFO_PATHS
        .iter()
        .find_map(|path| graph.get_path(envelope, path))
    else {
        return ReplyContext::empty();
    };

    let stanza_id = graph
        .get_path(context_info, &["stanzaId"])
        .and_then(InputValue::as_str)
        .map(str::to_owned);

    let quoted_message_raw = graph.get_path(context_info, &["quotedMessage"]).cloned();

    // Fresh visited set: the quoted message is its own traversal.
    let quoted_message = quoted_message_raw
        .as_ref()
        .filter(|raw| raw.is_truthy())
        .and_then(|raw| canonicalizer.canonicalize(graph, raw, &mut VisitedSet::new()));

    ReplyContext {
        stanza_id,
        quoted_message_raw,
        quoted_message,
    }
}

/// First story marker that is an own key of the canonical quoted message.
pub fn story_marker(quoted_message: Option<&Value>) -> Option<StoryMarker> {
    let map = quoted_message?.as_object()?;
    StoryMarker::ALL.into_iter().find(|marker| map.contains_key(marker.key()))
}

/// Whether a canonical quoted message is a story/status reply.
///
/// Pure key-existence check; marker values are not inspected.
pub fn has_story_quoted_message(quoted_message: Option<&Value>) -> bool {
    story_marker(quoted_message).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BinaryView, Int64};
    use serde_json::json;

    fn extract_json(envelope: Value) -> ReplyContext {
        let (graph, root) = ValueGraph::from_json(&envelope);
        extract_reply_context(&graph, Some(&root))
    }

    #[test]
    fn test_absent_envelope() {
        let graph = ValueGraph::new();
        assert_eq!(extract_reply_context(&graph, None), ReplyContext::empty());
        assert_eq!(extract_reply_context(&graph, Some(&InputValue::Null)), ReplyContext::empty());
        assert_eq!(extract_reply_context(&graph, Some(&InputValue::from(""))), ReplyContext::empty());
    }

    #[test]
    fn test_no_context_info() {
        let ctx = extract_json(json!({ "message": { "conversation": "hello" } }));
        assert_eq!(ctx.stanza_id, None);
        assert_eq!(ctx.quoted_message_raw, None);
        assert_eq!(ctx.quoted_message, None);
    }

    #[test]
    fn test_extended_text_context_info() {
        let mut graph = ValueGraph::new();
        let quoted = graph.add_mapping_from([("conversation", InputValue::from("hi"))]);
        let context = graph.add_mapping_from([
            ("stanzaId", InputValue::from("ABC123")),
            ("quotedMessage", InputValue::Mapping(quoted)),
        ]);
        let ext = graph.add_mapping_from([("contextInfo", InputValue::Mapping(context))]);
        let message = graph.add_mapping_from([("extendedTextMessage", InputValue::Mapping(ext))]);
        let envelope = graph.add_mapping_from([("message", InputValue::Mapping(message))]);

        let ctx = extract_reply_context(&graph, Some(&envelope.into()));
        assert_eq!(ctx.stanza_id.as_deref(), Some("ABC123"));
        assert_eq!(ctx.quoted_message_raw, Some(InputValue::Mapping(quoted)));
        assert_eq!(ctx.quoted_message, Some(json!({ "conversation": "hi" })));
    }

    #[test]
    fn test_probe_order() {
        let ctx = extract_json(json!({
            "message": {
                "extendedTextMessage": { "contextInfo": null },
                "contextInfo": { "stanzaId": "direct" },
            },
            "contextInfo": { "stanzaId": "top" },
        }));
        assert_eq!(ctx.stanza_id.as_deref(), Some("direct"));

        let ctx = extract_json(json!({ "contextInfo": { "stanzaId": "top" } }));
        assert_eq!(ctx.stanza_id.as_deref(), Some("top"));
        assert!(!ctx.has_quote());
    }

    #[test]
    fn test_non_string_stanza_id_ignored() {
        let ctx = extract_json(json!({ "contextInfo": { "stanzaId": 17 } }));
        assert_eq!(ctx.stanza_id, None);
    }

    #[test]
    fn test_falsy_quoted_message_kept_raw_only() {
        let ctx = extract_json(json!({ "contextInfo": { "quotedMessage": "" } }));
        assert_eq!(ctx.quoted_message_raw, Some(InputValue::from("")));
        assert_eq!(ctx.quoted_message, None);
    }

    #[test]
    fn test_quoted_message_is_canonicalized() {
        let mut graph = ValueGraph::new();
        let quoted = graph.add_mapping_from([
            ("timestamp", InputValue::Int64(Int64::from_i64(1_700_000_000))),
            ("thumbnail", InputValue::Binary(BinaryView::buffer(vec![0xde, 0xad]))),
        ]);
        graph.set(quoted, "self", quoted.into());
        let context = graph.add_mapping_from([("quotedMessage", InputValue::Mapping(quoted))]);
        let envelope = graph.add_mapping_from([("contextInfo", InputValue::Mapping(context))]);

        let ctx = extract_reply_context(&graph, Some(&envelope.into()));
        assert_eq!(
            ctx.quoted_message,
            Some(json!({
                "timestamp": 1_700_000_000,
                "thumbnail": { "type": "Buffer", "encoding": "base64", "data": "3q0=" },
            }))
        );
    }

    #[test]
    fn test_story_classifier() {
        assert!(has_story_quoted_message(Some(&json!({ "storyReplyMessage": { "text": "x" } }))));
        assert!(has_story_quoted_message(Some(&json!({ "storyInvite": null }))));
        assert!(!has_story_quoted_message(Some(&json!({ "conversation": "hi" }))));
        assert!(!has_story_quoted_message(Some(&json!("storyReplyMessage"))));
        assert!(!has_story_quoted_message(Some(&Value::Null)));
        assert!(!has_story_quoted_message(None));
    }

    #[test]
    fn test_story_marker_order() {
        let quoted = json!({ "storyInvite": {}, "statusMessage": {} });
        assert_eq!(story_marker(Some(&quoted)), Some(StoryMarker::Status));
    }

    #[test]
    fn test_reply_context_story_flag() {
        let ctx = extract_json(json!({
            "message": { "contextInfo": {
                "stanzaId": "S1",
                "quotedMessage": { "storyMentionedJidList": ["a@s.whatsapp.net"] },
            } },
        }));
        assert!(ctx.is_story_reply());
        assert_eq!(ctx.story_marker(), Some(StoryMarker::StoryMentionList));
    }
}
