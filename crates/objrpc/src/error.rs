//! Unified error types for objrpc.

use std::time::Duration;

use objrpc_protocol::ProtocolError;
use objrpc_registry::RegistryError;
use objrpc_transport::{SocketId, TransportError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `objrpc` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A transport-level error (accept, dial, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown codec).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry-level error (registration, lookups).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A client call failed.
    #[error(transparent)]
    Call(#[from] CallError),

    /// The transport reported an event for a socket the router never saw.
    #[error("no connection for socket {0}")]
    UnknownSocket(SocketId),

    /// The connection is closed; nothing more can be sent on it.
    #[error("connection {0} is closed")]
    ConnectionClosed(SocketId),

    /// The reactor task is gone.
    #[error("reactor stopped")]
    ReactorStopped,
}

/// Why a client call produced no result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The server answered with a failure response.
    #[error("{0}")]
    Remote(String),

    /// No response arrived in time. The correlation entry is dropped, so a
    /// late response is reported as unmatched.
    #[error("request {seq} timed out after {after:?}")]
    Timeout { seq: u64, after: Duration },

    /// The connection closed before the response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The outstanding call limit was reached.
    #[error("too many pending requests: {pending}/{max}")]
    TooManyPending { pending: usize, max: usize },

    /// The request could not be written.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The response arrived but its result has an unexpected shape.
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
}
