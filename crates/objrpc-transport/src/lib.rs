//! Transport contract for objrpc.
//!
//! The protocol engine never touches a network stream directly. It sees
//! sockets through the [`Socket`] trait and learns about traffic through
//! [`TransportEvent`]s (or, equivalently, the [`TransportHandler`]
//! callback set). Anything that can produce those events can carry the
//! protocol.
//!
//! Two adapters ship with the crate:
//!
//! - [`memory`]: an in-process socket that records what it was sent,
//!   used to drive the engine synchronously in tests
//! - `websocket` (default feature): a WebSocket listener and dialer via
//!   `tokio-tungstenite`
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod event;
pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::TransportError;
pub use event::{EventSender, RequestMeta, TransportEvent, TransportHandler};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketListener, WebSocketSocket};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for socket identities handed out by the bundled adapters.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one live socket.
///
/// The router keys its connection table by this value, so a transport
/// must never hand the same id to two sockets that are alive at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a new `SocketId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// Close status code sent with a close frame.
///
/// Values follow the WebSocket registry (RFC 6455 §7.4.1) because that is
/// the transport the protocol usually runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseStatus(u16);

impl CloseStatus {
    /// Normal closure.
    pub const NORMAL: CloseStatus = CloseStatus(1000);
    /// The endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: CloseStatus = CloseStatus(1001);
    /// The peer violated the protocol, e.g. sent an undecodable message.
    pub const PROTOCOL_ERROR: CloseStatus = CloseStatus(1002);
    /// No status code was present in the close frame.
    pub const NO_STATUS: CloseStatus = CloseStatus(1005);
    /// The connection dropped without a close frame.
    pub const ABNORMAL: CloseStatus = CloseStatus(1006);

    /// Creates a status from a raw code.
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the raw code.
    pub fn code(self) -> u16 {
        self.0
    }

    /// Returns `true` for a normal closure.
    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message as it travels through a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
    /// An already-decoded value, for in-process transports that never
    /// serialize.
    Value(serde_json::Value),
}

impl Payload {
    /// Returns `true` when the payload carries nothing worth decoding:
    /// an empty or whitespace-only text or binary frame.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Binary(bytes) => {
                bytes.iter().all(|b| b.is_ascii_whitespace())
            }
            Self::Value(value) => value.is_null(),
        }
    }

    /// Byte length of the payload, for logging. Values report 0.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
            Self::Value(_) => 0,
        }
    }

    /// Returns `true` if [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live socket the engine can write to.
///
/// Sends are non-blocking: adapters queue the payload for a writer task.
/// The engine runs on a single reactor task, so nothing here may await.
pub trait Socket: Send + Sync + 'static {
    /// Returns the identity the transport assigned to this socket.
    fn id(&self) -> SocketId;

    /// Queues a payload for the remote peer.
    fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Closes the socket with the given status and reason.
    fn close(
        &self,
        status: CloseStatus,
        reason: &str,
    ) -> Result<(), TransportError>;
}
