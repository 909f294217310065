//! Error types for the protocol layer.
//!
//! A `ProtocolError` means a message could not be turned into (or out of)
//! a payload, or a decoded value is not a valid envelope. Whether that is
//! fatal is the connection's call: decode failures close the connection,
//! envelope-shape problems are answered with a failure response.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a value into a payload).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a payload into a value).
    ///
    /// Common causes: malformed JSON, truncated messages, invalid UTF-8.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The codec cannot handle this kind of payload.
    #[error("{codec} codec cannot decode {kind} payloads")]
    UnsupportedPayload {
        codec: &'static str,
        kind: &'static str,
    },

    /// No codec is registered under this name.
    #[error("unknown codec '{0}'")]
    UnknownCodec(String),

    /// The message decoded fine but is not a valid envelope.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
