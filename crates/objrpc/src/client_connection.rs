//! The client side: sends commands and matches responses to callers.
//!
//! Every outgoing command gets a fresh `seq` and a one-shot slot in a
//! `seq → slot` map. Responses are matched by the `seq` they echo, so
//! calls may complete in any order. A response nobody waits for (no seq,
//! an unknown seq, or a call that already timed out) is dropped and
//! reported to the observers as [`ConnectionEvent::Unmatched`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use objrpc_protocol::{Envelope, Response};
use serde_json::Map;
use tokio::sync::oneshot;

use crate::connection::{Connection, ConnectionState, Outcome, Processor};
use crate::{CallError, ClientConfig, ConnectionEvent, RpcError};

type Slot = oneshot::Sender<Result<serde_json::Value, CallError>>;

/// Client half of a connection.
#[derive(Debug)]
pub struct ClientConnection {
    pending: HashMap<u64, Slot>,
    max_pending: usize,
}

impl ClientConnection {
    /// Number of calls waiting for their response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn resolve(&mut self, state: &mut ConnectionState, response: Response) {
        let Some(seq) = response.seq else {
            state.notify(ConnectionEvent::Unmatched { seq: None });
            return;
        };
        state.take_in_flight(seq);
        let Some(slot) = self.pending.remove(&seq) else {
            state.notify(ConnectionEvent::Unmatched { seq: Some(seq) });
            return;
        };

        let outcome = if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            state.notify(ConnectionEvent::ResponseReceived {
                seq,
                result: &result,
            });
            Ok(result)
        } else {
            let error = response.error.unwrap_or_default();
            state.notify(ConnectionEvent::ErrorReceived { seq, error: &error });
            Err(CallError::Remote(error))
        };
        // The caller may have stopped waiting.
        let _ = slot.send(outcome);
    }
}

impl Processor for ClientConnection {
    type Context = ClientConfig;
    const KIND: &'static str = "client";

    fn create(config: &Arc<ClientConfig>) -> Self {
        Self {
            pending: HashMap::new(),
            max_pending: config.max_pending,
        }
    }

    fn process_message(&mut self, state: &mut ConnectionState, message: serde_json::Value) -> Outcome {
        match Envelope::from_value(message) {
            Ok(Envelope::Response(response)) => self.resolve(state, response),
            Ok(Envelope::Request(request)) => {
                tracing::warn!(
                    socket = %state.id(),
                    command = %request.command,
                    "client received a request, ignored"
                );
            }
            Err(e) => {
                tracing::warn!(socket = %state.id(), error = %e, "invalid message ignored");
            }
        }
        Outcome::None
    }

    fn cleanup(&mut self, state: &mut ConnectionState) {
        if !self.pending.is_empty() {
            tracing::debug!(
                socket = %state.id(),
                pending = self.pending.len(),
                "failing pending calls"
            );
        }
        for (_, slot) in self.pending.drain() {
            let _ = slot.send(Err(CallError::ConnectionClosed));
        }
    }
}

impl Connection<ClientConnection> {
    /// Sends a command and returns the future of its result.
    ///
    /// # Errors
    /// - [`CallError::TooManyPending`] if `max_pending` calls are outstanding
    /// - [`CallError::ConnectionClosed`] if the connection is closed
    /// - [`CallError::SendFailed`] if the request could not be written
    pub fn command(
        &mut self,
        name: &str,
        params: Map<String, serde_json::Value>,
    ) -> Result<PendingCall, CallError> {
        let pending = self.processor().pending.len();
        let max = self.processor().max_pending;
        if pending >= max {
            return Err(CallError::TooManyPending { pending, max });
        }

        let seq = self
            .state_mut()
            .send_command(name, params)
            .map_err(|e| match e {
                RpcError::ConnectionClosed(_) => CallError::ConnectionClosed,
                other => CallError::SendFailed(other.to_string()),
            })?;
        let (tx, rx) = oneshot::channel();
        self.processor_mut().pending.insert(seq, tx);
        Ok(PendingCall { seq, rx })
    }

    /// Stops waiting for `seq`. Returns `false` if it was not pending.
    pub fn forget(&mut self, seq: u64) -> bool {
        self.state_mut().take_in_flight(seq);
        self.processor_mut().pending.remove(&seq).is_some()
    }
}

/// The result of a command, once its response arrives.
#[derive(Debug)]
pub struct PendingCall {
    seq: u64,
    rx: oneshot::Receiver<Result<serde_json::Value, CallError>>,
}

impl PendingCall {
    /// The seq the request was sent with.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Future for PendingCall {
    type Output = Result<serde_json::Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(CallError::ConnectionClosed)))
    }
}
