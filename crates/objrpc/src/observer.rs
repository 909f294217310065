//! Typed connection events and the observers that receive them.
//!
//! Every connection reports what happens to it (opened, message in,
//! message out, correlated responses, close) to a list of observers. The
//! default list holds a single [`TracingObserver`], which turns events
//! into `tracing` records; applications add their own observers for
//! auditing or metrics through the server builder or the router.

use objrpc_transport::{CloseStatus, RequestMeta, SocketId};
use serde_json::Value;

/// Something that happened on a connection.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionEvent<'a> {
    /// The transport reported the socket as connected or open.
    Opened { request: Option<&'a RequestMeta> },
    /// A message was decoded.
    MessageReceived { message: &'a Value },
    /// A message was encoded and handed to the socket.
    MessageSent { message: &'a Value },
    /// A client call succeeded.
    ResponseReceived { seq: u64, result: &'a Value },
    /// A client call failed remotely.
    ErrorReceived { seq: u64, error: &'a str },
    /// A response matched no outstanding call and was dropped.
    Unmatched { seq: Option<u64> },
    /// A deferred result settled after its request stopped being tracked.
    DeferredDiscarded { seq: Option<u64> },
    /// A pong frame arrived.
    Pong { payload: &'a [u8] },
    /// The connection failed (transport error or undecodable message).
    Failed { error: &'a str },
    /// The connection closed.
    Closed { status: CloseStatus, reason: &'a str },
}

/// Receives the events of every connection it is attached to.
///
/// Called synchronously on the reactor task, so implementations must not
/// block.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_event(&self, socket: SocketId, kind: &'static str, event: &ConnectionEvent<'_>);
}

/// Logs connection events through `tracing`.
///
/// Lifecycle events are logged at `info`, traffic at `debug`, anything
/// dropped at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_event(&self, socket: SocketId, kind: &'static str, event: &ConnectionEvent<'_>) {
        match *event {
            ConnectionEvent::Opened { request } => {
                let uri = request.map(|r| r.uri.as_str()).unwrap_or_default();
                let peer = request.and_then(|r| r.peer);
                tracing::info!(%socket, kind, uri, ?peer, "connection opened");
            }
            ConnectionEvent::MessageReceived { message } => {
                tracing::debug!(%socket, kind, %message, "message received");
            }
            ConnectionEvent::MessageSent { message } => {
                tracing::debug!(%socket, kind, %message, "message sent");
            }
            ConnectionEvent::ResponseReceived { seq, result } => {
                tracing::debug!(%socket, seq, %result, "response received");
            }
            ConnectionEvent::ErrorReceived { seq, error } => {
                tracing::debug!(%socket, seq, error, "error received");
            }
            ConnectionEvent::Unmatched { seq } => {
                tracing::warn!(%socket, ?seq, "response matches no pending call, dropped");
            }
            ConnectionEvent::DeferredDiscarded { seq } => {
                tracing::debug!(%socket, ?seq, "stale deferred result discarded");
            }
            ConnectionEvent::Pong { payload } => {
                tracing::trace!(%socket, len = payload.len(), "pong");
            }
            ConnectionEvent::Failed { error } => {
                tracing::warn!(%socket, kind, error, "connection failed");
            }
            ConnectionEvent::Closed { status, reason } => {
                tracing::info!(%socket, kind, %status, reason, "connection closed");
            }
        }
    }
}
