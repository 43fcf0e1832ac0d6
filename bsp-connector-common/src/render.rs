//! Rendering of response payloads for log lines and error messages.

use serde_json::Value;

/// Maximum length, in characters, of a rendered payload.
pub const MAX_RENDERED_LEN: usize = 200;

/// Marker appended to truncated output. Counts towards [`MAX_RENDERED_LEN`].
pub const OMISSION: &str = "...";

/// A response payload in one of the shapes the connector receives.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// No body at all
    Empty,
    /// Raw bytes, e.g. an audio stream or an unparsed body
    Bytes(&'a [u8]),
    /// Plain text
    Text(&'a str),
    /// Parsed JSON
    Json(&'a Value),
}

/// Truncate `text` to at most [`MAX_RENDERED_LEN`] characters.
///
/// Longer input keeps its first characters followed by [`OMISSION`], so the
/// result is exactly [`MAX_RENDERED_LEN`] characters long.
pub fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_RENDERED_LEN {
        return text.to_string();
    }
    let keep = MAX_RENDERED_LEN - OMISSION.chars().count();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(OMISSION);
    out
}

/// Render a payload as shortened text.
///
/// Bytes are decoded as UTF-8 (invalid sequences replaced), JSON strings are
/// rendered without quotes and any other JSON value as compact JSON.
pub fn shorten(payload: Payload<'_>) -> String {
    match payload {
        Payload::Empty => String::new(),
        Payload::Bytes(bytes) if bytes.is_empty() => String::new(),
        Payload::Bytes(bytes) => truncate(&String::from_utf8_lossy(bytes)),
        Payload::Text(text) => truncate(text),
        Payload::Json(Value::Null) => String::new(),
        Payload::Json(Value::String(s)) => truncate(s),
        Payload::Json(value) => truncate(&value.to_string()),
    }
}

/// Shorthand for rendering a raw body.
pub fn shorten_bytes(bytes: &[u8]) -> String {
    shorten(Payload::Bytes(bytes))
}

/// Shorthand for rendering a JSON value.
pub fn shorten_json(value: &Value) -> String {
    shorten(Payload::Json(value))
}
