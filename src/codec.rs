//! Best-effort decoding of inbound Message envelopes.
//!
//! Decoding never fails across this boundary: malformed JSON and missing
//! keys degrade to empty defaults instead of propagating an error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::Value;

use crate::types::PubSubMessage;

/// Decode an envelope payload into a [`PubSubMessage`].
///
/// The payload is a JSON object with optional keys `MessageID`, `Topic`,
/// `SourceNodeID`, `Message`. Keys are extracted independently, so one
/// missing or type-mismatched field never discards the others; JSON that
/// does not parse at all yields a fully-default message.
pub fn decode_message(raw: &[u8]) -> PubSubMessage {
    let Ok(value) = serde_json::from_slice::<Value>(raw) else {
        return PubSubMessage::default();
    };
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let payload = match value.get("Message").and_then(Value::as_str) {
        Some(text) => decode_text_payload(text),
        None => Bytes::new(),
    };
    PubSubMessage {
        message_id: field("MessageID"),
        topic: field("Topic"),
        payload,
        source_node_id: field("SourceNodeID"),
    }
}

/// Recover the payload bytes from the `Message` string.
///
/// The wire does not flag whether the string is base64-encoded binary or
/// plain text, so this applies a heuristic: strings that look like base64
/// are decoded, and the decode is accepted only if it came out non-empty and
/// strictly shorter than the input (base64 always expands binary data).
/// Short plain-ASCII strings that happen to satisfy the charset-and-length
/// check are therefore misclassified as binary; see `looks_like_base64`.
/// The heuristic is preserved as-is for wire compatibility with deployed
/// nodes.
fn decode_text_payload(text: &str) -> Bytes {
    if looks_like_base64(text) {
        if let Ok(decoded) = BASE64.decode(text) {
            if !decoded.is_empty() && decoded.len() < text.len() {
                return Bytes::from(decoded);
            }
        }
    }
    Bytes::copy_from_slice(text.as_bytes())
}

/// Base64 candidate check: every character alphanumeric or `+ / =`, and the
/// string either carries padding, uses `+`/`/`, or has a multiple-of-4
/// length. Deliberately ambiguous for valid-ASCII inputs.
fn looks_like_base64(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let charset_ok = text
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=');
    if !charset_ok {
        return false;
    }
    text.contains('=') || text.contains('+') || text.contains('/') || text.len() % 4 == 0
}
