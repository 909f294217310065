//! Transport events and the callback set that consumes them.
//!
//! Adapters run their socket I/O on background tasks and report what
//! happened as [`TransportEvent`]s over an unbounded channel. The receiving
//! side (one reactor task) feeds each event to a [`TransportHandler`], which
//! is the explicit form of the classic `onConnect`/`onMessage`/... callback
//! object.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{CloseStatus, Payload, Socket, SocketId, TransportError};

/// Sending half of the event channel handed to adapters.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// What the transport knows about the request that opened a socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Request target, e.g. `/rpc?codec=json`.
    pub uri: String,
    /// Handshake headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Remote address, when the transport has one.
    pub peer: Option<SocketAddr>,
}

impl RequestMeta {
    /// Returns the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Something that happened on a socket.
pub enum TransportEvent {
    /// A peer connected to a listening endpoint.
    Connect {
        socket: Arc<dyn Socket>,
        request: RequestMeta,
    },
    /// A dialed socket finished its handshake.
    Open { socket: Arc<dyn Socket> },
    /// A message arrived.
    Message { socket: SocketId, payload: Payload },
    /// The socket failed. No close event follows.
    Error {
        socket: SocketId,
        error: TransportError,
    },
    /// The socket closed.
    Close {
        socket: SocketId,
        status: CloseStatus,
        reason: String,
    },
    /// A pong frame arrived.
    Pong { socket: SocketId, payload: Vec<u8> },
}

impl TransportEvent {
    /// Returns the identity of the socket the event belongs to.
    pub fn socket_id(&self) -> SocketId {
        match self {
            Self::Connect { socket, .. } | Self::Open { socket } => {
                socket.id()
            }
            Self::Message { socket, .. }
            | Self::Error { socket, .. }
            | Self::Close { socket, .. }
            | Self::Pong { socket, .. } => *socket,
        }
    }

    /// Short name of the event kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Open { .. } => "open",
            Self::Message { .. } => "message",
            Self::Error { .. } => "error",
            Self::Close { .. } => "close",
            Self::Pong { .. } => "pong",
        }
    }

    /// Feeds this event to the matching callback of `handler`.
    pub fn dispatch<H: TransportHandler + ?Sized>(
        self,
        handler: &mut H,
    ) -> Result<(), H::Error> {
        match self {
            Self::Connect { socket, request } => {
                handler.on_connect(socket, request)
            }
            Self::Open { socket } => handler.on_open(socket),
            Self::Message { socket, payload } => {
                handler.on_message(socket, payload)
            }
            Self::Error { socket, error } => handler.on_error(socket, error),
            Self::Close {
                socket,
                status,
                reason,
            } => handler.on_close(socket, status, reason),
            Self::Pong { socket, payload } => {
                handler.on_pong(socket, payload)
            }
        }
    }
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvent")
            .field("kind", &self.kind())
            .field("socket", &self.socket_id())
            .finish()
    }
}

/// The callback set a transport drives.
///
/// Callbacks are invoked one at a time from a single task; implementors
/// may mutate their state freely without locking.
pub trait TransportHandler {
    /// Error reported when an event cannot be handled.
    type Error;

    /// A peer connected to a listening endpoint.
    fn on_connect(
        &mut self,
        socket: Arc<dyn Socket>,
        request: RequestMeta,
    ) -> Result<(), Self::Error>;

    /// A dialed socket is open.
    fn on_open(&mut self, socket: Arc<dyn Socket>) -> Result<(), Self::Error>;

    /// A message arrived on `socket`.
    fn on_message(
        &mut self,
        socket: SocketId,
        payload: Payload,
    ) -> Result<(), Self::Error>;

    /// `socket` failed.
    fn on_error(
        &mut self,
        socket: SocketId,
        error: TransportError,
    ) -> Result<(), Self::Error>;

    /// `socket` closed.
    fn on_close(
        &mut self,
        socket: SocketId,
        status: CloseStatus,
        reason: String,
    ) -> Result<(), Self::Error>;

    /// A pong arrived on `socket`.
    fn on_pong(
        &mut self,
        socket: SocketId,
        payload: Vec<u8>,
    ) -> Result<(), Self::Error>;
}
