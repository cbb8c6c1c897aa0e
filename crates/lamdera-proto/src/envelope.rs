//! Transport framing: the JSON envelope that wraps a base64-encoded Wire3
//! message, and the classifier that turns an inbound text frame into a
//! tagged variant without ever raising an error.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::Value;

use crate::message;

/// Outbound envelope sent on every `ToBackend` frame.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    t: &'static str,
    s: String,
    c: String,
    b: String,
}

impl OutboundEnvelope {
    /// Builds the envelope for sending `payload` (already Wire3-encoded)
    /// under `session_id`, addressed to `connection_id` (or `session_id`
    /// itself, if no connection id has been assigned yet).
    #[must_use]
    pub fn new(session_id: &str, connection_id: Option<&str>, message_bytes: &[u8]) -> Self {
        Self {
            t: "ToBackend",
            s: session_id.to_string(),
            c: connection_id.unwrap_or(session_id).to_string(),
            b: BASE64.encode(message_bytes),
        }
    }

    /// Serializes the envelope to its wire JSON form.
    ///
    /// # Errors
    ///
    /// Only fails if the envelope's fields somehow aren't representable as
    /// JSON, which cannot happen for this struct's all-string fields.
    pub fn to_json(&self) -> crate::errors::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Classification of an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The host announced a leader election.
    Election {
        /// The newly elected leader's client id.
        leader_id: String,
    },
    /// A Wire3 application message was recovered from the `b` field.
    Message {
        /// The decoded string payload.
        data: String,
        /// Session id echoed by the host, if present.
        session_id: Option<String>,
        /// Connection id echoed by the host, if present.
        connection_id: Option<String>,
    },
    /// A recognized-but-not-message protocol frame (e.g. the handshake).
    Protocol {
        /// The full parsed JSON object.
        data: Value,
        /// Session id echoed by the host, if present.
        session_id: Option<String>,
        /// Connection id echoed by the host, if present.
        connection_id: Option<String>,
    },
    /// The frame could not be parsed as JSON at all.
    ParseError {
        /// The raw text that failed to parse.
        raw: String,
    },
}

/// Classifies a received text frame into an [`InboundFrame`]. Never panics
/// and never returns an error: every failure mode is reified as
/// [`InboundFrame::ParseError`] or falls through to
/// [`InboundFrame::Protocol`].
#[must_use]
pub fn classify(raw: &str, expected_tag: u8) -> InboundFrame {
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        return InboundFrame::ParseError { raw: raw.to_string() };
    };
    let Some(obj) = parsed.as_object() else {
        return InboundFrame::ParseError { raw: raw.to_string() };
    };

    if obj.get("t").and_then(Value::as_str) == Some("e") {
        let leader_id = obj.get("l").and_then(Value::as_str).unwrap_or_default().to_string();
        return InboundFrame::Election { leader_id };
    }

    let session_id = obj.get("s").and_then(Value::as_str).map(str::to_string);
    let connection_id = obj.get("c").and_then(Value::as_str).map(str::to_string);

    if let Some(b) = obj.get("b").and_then(Value::as_str) {
        if let Ok(bytes) = BASE64.decode(b) {
            if let Some(data) = message::decode_message(&bytes, expected_tag) {
                return InboundFrame::Message { data, session_id, connection_id };
            }
        }
    }

    InboundFrame::Protocol { data: parsed, session_id, connection_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DEFAULT_TAG;

    #[test]
    fn outbound_envelope_shape() {
        let encoded = message::encode_message("ping", DEFAULT_TAG);
        let env = OutboundEnvelope::new("S".repeat(40).as_str(), Some("C1"), &encoded);
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["t"], "ToBackend");
        assert_eq!(json["c"], "C1");
        assert_eq!(json["s"], "S".repeat(40));
    }

    #[test]
    fn outbound_envelope_falls_back_to_session_id() {
        let encoded = message::encode_message("ping", DEFAULT_TAG);
        let env = OutboundEnvelope::new("sess1", None, &encoded);
        assert_eq!(env.c, "sess1");
    }

    #[test]
    fn classify_election() {
        let frame = classify(r#"{"t":"e","l":"leader-1"}"#, DEFAULT_TAG);
        assert_eq!(frame, InboundFrame::Election { leader_id: "leader-1".to_string() });
    }

    #[test]
    fn classify_message() {
        let encoded = message::encode_message("hello", DEFAULT_TAG);
        let b64 = BASE64.encode(encoded);
        let raw = format!(r#"{{"s":"sess1","c":"conn1","b":"{b64}"}}"#);
        let frame = classify(&raw, DEFAULT_TAG);
        assert_eq!(frame, InboundFrame::Message {
            data: "hello".to_string(),
            session_id: Some("sess1".to_string()),
            connection_id: Some("conn1".to_string()),
        });
    }

    #[test]
    fn classify_protocol_when_tag_mismatches() {
        let encoded = message::encode_message("hello", 9);
        let b64 = BASE64.encode(encoded);
        let raw = format!(r#"{{"s":"sess1","c":"conn1","b":"{b64}"}}"#);
        let frame = classify(&raw, DEFAULT_TAG);
        assert!(matches!(frame, InboundFrame::Protocol { .. }));
    }

    #[test]
    fn classify_protocol_without_b_field() {
        let frame = classify(r#"{"s":"sess1","c":"conn1"}"#, DEFAULT_TAG);
        match frame {
            InboundFrame::Protocol { session_id, connection_id, .. } => {
                assert_eq!(session_id.as_deref(), Some("sess1"));
                assert_eq!(connection_id.as_deref(), Some("conn1"));
            },
            _ => panic!("expected Protocol variant"),
        }
    }

    #[test]
    fn classify_parse_error_on_malformed_json() {
        let frame = classify("not json", DEFAULT_TAG);
        assert_eq!(frame, InboundFrame::ParseError { raw: "not json".to_string() });
    }

    #[test]
    fn classify_never_panics_on_arbitrary_text() {
        for raw in ["", "{}", "[]", "null", "42", r#"{"t":"e"}"#, r#"{"b":123}"#] {
            let _ = classify(raw, DEFAULT_TAG);
        }
    }
}
