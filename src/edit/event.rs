//! Helpdesk "message updated" webhook payloads.

use serde_json::Value;

/// Event name carried by message edits.
pub const MESSAGE_UPDATED_EVENT: &str = "message_updated";

/// The parts of a message-updated payload the edit mirror acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageUpdatedEvent {
    /// Helpdesk message id as sent (number or string).
    pub raw_id: Value,
    /// New text, when present and non-empty.
    pub new_content: Option<String>,
}

impl MessageUpdatedEvent {
    /// Parse a webhook body.
    ///
    /// Returns `None` unless the event is `message_updated` and
    /// `content_attributes.edited` is truthy.
    pub fn from_payload(body: &Value) -> Option<Self> {
        if body.get("event").and_then(Value::as_str) != Some(MESSAGE_UPDATED_EVENT) {
            return None;
        }

        let attributes = body.get("content_attributes");
        if !attributes.and_then(|a| a.get("edited")).is_some_and(is_truthy) {
            return None;
        }

        let new_content = attributes
            .and_then(|a| a.get("newContent"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Some(Self {
            raw_id: body.get("id").cloned().unwrap_or(Value::Null),
            new_content,
        })
    }

    /// Helpdesk message id as an integer.
    ///
    /// Accepts JSON integers, integral floats and trimmed numeric strings.
    pub fn message_id(&self) -> Option<i64> {
        match &self.raw_id {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// JSON truthiness: `false`, `0`, `""` and `null` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_edit_events_ignored() {
        assert!(MessageUpdatedEvent::from_payload(&json!({ "event": "message_created" })).is_none());
        assert!(MessageUpdatedEvent::from_payload(&json!({
            "event": "message_updated",
            "content_attributes": { "edited": false },
        }))
        .is_none());
        assert!(MessageUpdatedEvent::from_payload(&json!({ "event": "message_updated" })).is_none());
    }

    #[test]
    fn test_edit_event_parsed() {
        let event = MessageUpdatedEvent::from_payload(&json!({
            "event": "message_updated",
            "id": "42",
            "content_attributes": { "edited": true, "newContent": "fixed typo" },
        }))
        .unwrap();

        assert_eq!(event.new_content.as_deref(), Some("fixed typo"));
        assert_eq!(event.message_id(), Some(42));
    }

    #[test]
    fn test_empty_content_is_missing() {
        let event = MessageUpdatedEvent::from_payload(&json!({
            "event": "message_updated",
            "id": 1,
            "content_attributes": { "edited": 1, "newContent": "" },
        }))
        .unwrap();
        assert_eq!(event.new_content, None);
    }

    #[test]
    fn test_message_id_forms() {
        let with_id = |id: Value| MessageUpdatedEvent { raw_id: id, new_content: None };

        assert_eq!(with_id(json!(7)).message_id(), Some(7));
        assert_eq!(with_id(json!(7.0)).message_id(), Some(7));
        assert_eq!(with_id(json!(" 8 ")).message_id(), Some(8));
        assert_eq!(with_id(json!(7.5)).message_id(), None);
        assert_eq!(with_id(json!("abc")).message_id(), None);
        assert_eq!(with_id(Value::Null).message_id(), None);
    }
}
