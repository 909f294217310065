/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket was closed; nothing more can be written to it.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing a remote endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The socket cannot carry this kind of payload.
    ///
    /// A WebSocket only carries text and binary frames, so a pre-decoded
    /// [`Payload::Value`](crate::Payload::Value) is rejected.
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(&'static str),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Wraps any displayable error into an `io::Error` of the given kind.
    ///
    /// `tokio-tungstenite` errors are not `io::Error`s, so the adapters
    /// funnel them through here.
    pub(crate) fn io(
        kind: std::io::ErrorKind,
        err: impl std::fmt::Display,
    ) -> std::io::Error {
        std::io::Error::new(kind, err.to_string())
    }
}
