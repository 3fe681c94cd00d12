//! Envelope message type.
//!
//! # Format
//!
//! ```json
//! {
//!   "event": "lead.updated",
//!   "payload": { ... }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, to_string};

use crate::error::{Error, Result};

// ============================================================================
// Envelope
// ============================================================================

/// The unit of wire exchange in both directions.
///
/// `payload` defaults to `null` when the peer omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name used to route the envelope to subscribers.
    pub event: String,

    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Parses a raw inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the frame is not JSON or lacks `event`.
    pub fn parse(frame: &str) -> Result<Self> {
        let envelope: Self = from_str(frame).map_err(|e| Error::parse(e.to_string()))?;

        if envelope.event.is_empty() {
            return Err(Error::parse("empty event name"));
        }

        Ok(envelope)
    }

    /// Encodes the envelope as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_valid_frame() {
        let envelope = Envelope::parse(r#"{"event":"lead.updated","payload":{"id":42}}"#)
            .expect("parse envelope");

        assert_eq!(envelope.event, "lead.updated");
        assert_eq!(envelope.payload, json!({ "id": 42 }));
    }

    #[test]
    fn test_parse_missing_payload_defaults_to_null() {
        let envelope = Envelope::parse(r#"{"event":"ping"}"#).expect("parse envelope");
        assert_eq!(envelope.payload, Value::Null);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Envelope::parse("not json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_event() {
        let err = Envelope::parse(r#"{"payload":1}"#).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_event() {
        let err = Envelope::parse(r#"{"event":"","payload":1}"#).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_to_frame_shape() {
        let frame = Envelope::new("chat.message", json!({ "text": "hi" }))
            .to_frame()
            .expect("encode");

        let value: Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(value["event"], "chat.message");
        assert_eq!(value["payload"]["text"], "hi");
    }
}
