//! Streamed event records and `data:` line parsing.

use serde::{Deserialize, Serialize, Serializer};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Normalized event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Status,
    Intent,
    Chunk,
    Token,
    Item,
    Complete,
    Done,
    Error,
    /// A type the client does not know about; forwarded untouched.
    Other(String),
    /// Neither `type` nor `event` was present.
    Untyped,
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "start" => Self::Start,
            "status" => Self::Status,
            "intent" => Self::Intent,
            "chunk" => Self::Chunk,
            "token" => Self::Token,
            "item" => Self::Item,
            "complete" => Self::Complete,
            "done" => Self::Done,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Status => "status",
            Self::Intent => "intent",
            Self::Chunk => "chunk",
            Self::Token => "token",
            Self::Item => "item",
            Self::Complete => "complete",
            Self::Done => "done",
            Self::Error => "error",
            Self::Other(name) => name,
            Self::Untyped => "",
        }
    }

    /// Chunk and token events carry incremental content.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Chunk | Self::Token)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Untyped => serializer.serialize_none(),
            other => serializer.serialize_str(other.as_str()),
        }
    }
}

/// Wire shape before normalization. Older endpoints send `event`, newer ones `type`.
///
/// Every field is loosely typed so any JSON object parses.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type", default)]
    kind: Option<serde_json::Value>,
    #[serde(default)]
    event: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    partial: Option<serde_json::Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SseEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<serde_json::Value>,
    /// Fields this client does not model, kept for consumers.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SseEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            data: None,
            content: None,
            message: None,
            partial: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The synthetic event produced by a `data: [DONE]` line.
    pub fn done() -> Self {
        Self::new(EventKind::Done)
    }

    /// Text carried by the event: `content`, else a string `data` payload.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|d| d.as_str()))
    }

    /// Complete, done and error events end a logical response.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Complete | EventKind::Done | EventKind::Error
        )
    }

    /// Parse a JSON object payload, copying `event` into `type` when `type`
    /// is missing or empty.
    ///
    /// Non-string `content` or `message` values are kept in `extra` under
    /// their own key.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        let wire: WireEvent = serde_json::from_str(payload)?;
        let name = event_name(wire.kind.as_ref()).or_else(|| event_name(wire.event.as_ref()));
        let kind = name.map_or(EventKind::Untyped, EventKind::parse);
        let mut extra = wire.extra;
        let content = text_field(wire.content, "content", &mut extra);
        let message = text_field(wire.message, "message", &mut extra);
        Ok(Self {
            kind,
            data: wire.data,
            content,
            message,
            partial: wire.partial,
            extra,
        })
    }

    /// `message`, or a structured `message` rendered as JSON.
    pub fn message_text(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.extra.get("message").map(|v| v.to_string()))
    }
}

fn event_name(value: Option<&serde_json::Value>) -> Option<&str> {
    value
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
}

fn text_field(
    value: Option<serde_json::Value>,
    key: &str,
    extra: &mut serde_json::Map<String, serde_json::Value>,
) -> Option<String> {
    match value? {
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Null => None,
        other => {
            extra.insert(key.to_string(), other);
            None
        }
    }
}

/// Result of parsing one framed line.
#[derive(Debug)]
pub enum ParsedLine {
    /// Not a `data:` line; ignored.
    Ignored,
    Event(SseEvent),
    /// A `data:` line whose JSON could not be parsed.
    Malformed {
        payload: String,
        error: serde_json::Error,
    },
}

/// Parse one complete line of the stream.
pub fn parse_line(line: &str) -> ParsedLine {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return ParsedLine::Ignored;
    };
    if payload == DONE_SENTINEL {
        return ParsedLine::Event(SseEvent::done());
    }
    match SseEvent::from_json(payload) {
        Ok(event) => ParsedLine::Event(event),
        Err(error) => ParsedLine::Malformed {
            payload: payload.to_string(),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(line: &str) -> SseEvent {
        match parse_line(line) {
            ParsedLine::Event(e) => e,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn done_sentinel_yields_done_event() {
        let e = event("data: [DONE]");
        assert_eq!(e, SseEvent::done());
        assert_eq!(e.kind, EventKind::Done);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert!(matches!(parse_line(""), ParsedLine::Ignored));
        assert!(matches!(parse_line(": keep-alive"), ParsedLine::Ignored));
        assert!(matches!(parse_line("event: chunk"), ParsedLine::Ignored));
        assert!(matches!(parse_line("data:{\"type\":\"chunk\"}"), ParsedLine::Ignored));
    }

    #[test]
    fn event_field_is_normalized_into_type() {
        let e = event(r#"data: {"event":"token","content":"hi"}"#);
        assert_eq!(e.kind, EventKind::Token);
        assert_eq!(e.text(), Some("hi"));
    }

    #[test]
    fn type_wins_over_event() {
        let e = event(r#"data: {"type":"status","event":"chunk","message":"working"}"#);
        assert_eq!(e.kind, EventKind::Status);
        assert_eq!(e.message.as_deref(), Some("working"));
    }

    #[test]
    fn unknown_and_missing_types_are_preserved() {
        assert_eq!(
            event(r#"data: {"type":"progress"}"#).kind,
            EventKind::Other("progress".to_string())
        );
        assert_eq!(event(r#"data: {"data":1}"#).kind, EventKind::Untyped);
    }

    #[test]
    fn malformed_json_is_reported() {
        match parse_line("data: {not json") {
            ParsedLine::Malformed { payload, .. } => assert_eq!(payload, "{not json"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn extra_fields_survive_and_serialize_back() {
        let e = event(r#"data: {"type":"item","data":{"id":7},"step":3}"#);
        assert_eq!(e.extra.get("step"), Some(&json!(3)));
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value, json!({"type": "item", "data": {"id": 7}, "step": 3}));
    }

    #[test]
    fn empty_type_falls_back_to_event() {
        assert_eq!(event(r#"data: {"type":"","event":"chunk"}"#).kind, EventKind::Chunk);
        assert_eq!(event(r#"data: {"type":""}"#).kind, EventKind::Untyped);
        assert_eq!(event(r#"data: {"type":7,"event":"token"}"#).kind, EventKind::Token);
    }

    #[test]
    fn structured_message_is_kept_in_extra() {
        let e = event(r#"data: {"type":"error","message":{"code":"quota","detail":"x"}}"#);
        assert_eq!(e.kind, EventKind::Error);
        assert_eq!(e.message, None);
        assert_eq!(e.extra.get("message"), Some(&json!({"code": "quota", "detail": "x"})));
        assert_eq!(e.message_text().as_deref(), Some(r#"{"code":"quota","detail":"x"}"#));
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "message": {"code": "quota", "detail": "x"}})
        );
    }

    #[test]
    fn non_string_content_is_still_an_event() {
        let e = event(r#"data: {"type":"chunk","content":42}"#);
        assert_eq!(e.kind, EventKind::Chunk);
        assert_eq!(e.content, None);
        assert_eq!(e.extra.get("content"), Some(&json!(42)));

        let e = event(r#"data: {"type":"status","message":null}"#);
        assert_eq!(e.message, None);
        assert!(e.extra.is_empty());
    }

    #[test]
    fn non_object_json_is_malformed() {
        assert!(matches!(parse_line("data: 42"), ParsedLine::Malformed { .. }));
        assert!(matches!(parse_line(r#"data: "text""#), ParsedLine::Malformed { .. }));
    }

    #[test]
    fn text_falls_back_to_string_data() {
        let e = event(r#"data: {"type":"chunk","data":"abc"}"#);
        assert_eq!(e.text(), Some("abc"));
        assert!(e.kind.is_content());
        assert!(!e.is_terminal());
    }
}
