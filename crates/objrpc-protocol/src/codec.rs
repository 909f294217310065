//! Codec trait and implementations for turning values into payloads.
//!
//! A "codec" (coder/decoder) converts between the engine's dynamic message
//! value (`serde_json::Value`) and what a socket carries ([`Payload`]). The
//! connection does not care HOW messages are serialized; it holds an
//! `Arc<dyn Codec>` chosen once at construction and never swapped.
//!
//! Provided codecs:
//!
//! | name          | type                   | payload                      |
//! |---------------|------------------------|------------------------------|
//! | `none`        | [`NoneCodec`]          | the value itself             |
//! | `json`        | [`JsonCodec::compact`] | compact JSON text            |
//! | `json-pretty` | [`JsonCodec::pretty`]  | indented JSON text           |

use std::sync::Arc;

use objrpc_transport::Payload;
use serde_json::Value;

use crate::ProtocolError;

/// Translates message values to transport payloads and back.
///
/// The trait is object safe so a connection can hold `Arc<dyn Codec>` and
/// the codec can be picked at runtime, by name or by instance.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs and close reasons.
    fn name(&self) -> &'static str;

    /// Serializes a value into a payload.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode(&self, value: &Value) -> Result<Payload, ProtocolError>;

    /// Deserializes a payload back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the payload is malformed, or
    /// `ProtocolError::UnsupportedPayload` if the codec cannot read this
    /// kind of payload at all.
    fn decode(&self, payload: Payload) -> Result<Value, ProtocolError>;
}

// ---------------------------------------------------------------------------
// NoneCodec
// ---------------------------------------------------------------------------

/// A pass-through [`Codec`] for transports that deliver decoded values.
///
/// Encoding wraps the value in [`Payload::Value`] untouched. A text payload
/// decodes to a JSON string holding the text (it is "unchanged"), which the
/// connection will then reject as an envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneCodec;

impl Codec for NoneCodec {
    fn name(&self) -> &'static str {
        "none"
    }

    fn encode(&self, value: &Value) -> Result<Payload, ProtocolError> {
        Ok(Payload::Value(value.clone()))
    }

    fn decode(&self, payload: Payload) -> Result<Value, ProtocolError> {
        match payload {
            Payload::Value(value) => Ok(value),
            Payload::Text(text) => Ok(Value::String(text)),
            Payload::Binary(_) => Err(ProtocolError::UnsupportedPayload {
                codec: "none",
                kind: "binary",
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON text (via `serde_json`).
///
/// JSON is human-readable, so traffic can be inspected with any WebSocket
/// client. Binary frames are accepted on decode as UTF-8 JSON; encoding
/// always produces text frames.
///
/// ## Example
///
/// ```rust
/// use objrpc_protocol::{Codec, JsonCodec};
/// use objrpc_transport::Payload;
/// use serde_json::json;
///
/// let codec = JsonCodec::compact();
/// let payload = codec.encode(&json!({"command": "list", "seq": 1})).unwrap();
/// assert_eq!(payload, Payload::Text(r#"{"command":"list","seq":1}"#.into()));
///
/// let value = codec.decode(payload).unwrap();
/// assert_eq!(value["command"], "list");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Single-line output.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Indented output, handy when watching traffic by eye.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        if self.pretty { "json-pretty" } else { "json" }
    }

    fn encode(&self, value: &Value) -> Result<Payload, ProtocolError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        text.map(Payload::Text).map_err(ProtocolError::Encode)
    }

    fn decode(&self, payload: Payload) -> Result<Value, ProtocolError> {
        match payload {
            Payload::Text(text) => {
                serde_json::from_str(&text).map_err(ProtocolError::Decode)
            }
            Payload::Binary(bytes) => {
                serde_json::from_slice(&bytes).map_err(ProtocolError::Decode)
            }
            Payload::Value(value) => Ok(value),
        }
    }
}

/// Looks up a codec by the name it reports.
///
/// # Errors
/// Returns `ProtocolError::UnknownCodec` for any other name.
pub fn codec_by_name(name: &str) -> Result<Arc<dyn Codec>, ProtocolError> {
    match name {
        "none" => Ok(Arc::new(NoneCodec)),
        "json" => Ok(Arc::new(JsonCodec::compact())),
        "json-pretty" => Ok(Arc::new(JsonCodec::pretty())),
        other => Err(ProtocolError::UnknownCodec(other.to_string())),
    }
}
