//! Per-socket connection: lifecycle, codec, sequencing and deferred calls.
//!
//! A [`Connection`] wraps one live socket. It is split in two halves:
//!
//! - [`ConnectionState`]: everything every connection has: the socket,
//!   the codec, the outbound seq counter, the in-flight request table, a
//!   short history of sent responses, the observers, the status.
//! - a [`Processor`]: what this side of the protocol does with decoded
//!   messages. The server runs commands against its object registry
//!   ([`ServerConnection`](crate::ServerConnection)); the client matches
//!   responses to pending calls
//!   ([`ClientConnection`](crate::ClientConnection)).
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──→ [Created] ──(on_connect / on_open)──→ [Open]
//!                                                   │
//!         close() / on_close() / on_error() / bad payload
//!                                                   ▼
//!                                               [Closed]  (terminal)
//! ```
//!
//! Closing is terminal: further sends fail, incoming messages are
//! ignored, and the in-flight table, deferred calls and processor state
//! (registry or pending calls) are dropped.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{AbortHandle, Abortable, Aborted};
use objrpc_protocol::{Codec, Envelope, ProtocolError, Request, Response, Value};
use objrpc_registry::{Deferred, panic_message};
use objrpc_transport::{
    CloseStatus, Payload, RequestMeta, Socket, SocketId, TransportError,
};
use serde_json::Map;

use crate::{ConnectionConfig, ConnectionEvent, ConnectionObserver, RpcError};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created, but the transport has not reported it open yet.
    Created,
    /// Live.
    Open,
    /// Closed for good.
    Closed,
}

/// What processing one message produced.
pub enum Outcome {
    /// Nothing to send.
    None,
    /// Send this response now.
    Reply(Response),
    /// Send a response with this seq once `future` settles.
    Deferred { seq: Option<u64>, future: Deferred },
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Reply(response) => f.debug_tuple("Reply").field(response).finish(),
            Self::Deferred { seq, .. } => {
                f.debug_struct("Deferred").field("seq", seq).finish_non_exhaustive()
            }
        }
    }
}

/// The side-specific half of a connection.
///
/// Implemented by [`ServerConnection`](crate::ServerConnection) and
/// [`ClientConnection`](crate::ClientConnection). A router creates one
/// processor per socket from the shared `Context`.
pub trait Processor: Send + 'static {
    /// Shared, read-only data every processor of a router is built from.
    type Context: Send + Sync + 'static;

    /// Short name for logs: `"server"` or `"client"`.
    const KIND: &'static str;

    /// Builds the processor for a new connection.
    fn create(context: &Arc<Self::Context>) -> Self;

    /// Handles one decoded message.
    fn process_message(&mut self, state: &mut ConnectionState, message: serde_json::Value)
    -> Outcome;

    /// Turns a settled deferred result into the response to send.
    fn settle(&mut self, result: Result<Value, String>) -> Response {
        match result {
            Ok(value) => Response::ok(value.to_wire(&objrpc_protocol::NoHandles)),
            Err(message) => Response::err(message),
        }
    }

    /// Releases per-connection resources once the connection closed.
    fn cleanup(&mut self, state: &mut ConnectionState);
}

/// A deferred result on its way back to the router.
pub struct Settlement {
    pub socket: SocketId,
    pub token: u64,
    pub result: Result<Result<Value, String>, Aborted>,
}

/// Future that resolves to a [`Settlement`].
pub type SettlementFuture = Pin<Box<dyn Future<Output = Settlement> + Send>>;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The state every connection carries, whichever side it is.
pub struct ConnectionState {
    socket: Arc<dyn Socket>,
    codec: Arc<dyn Codec>,
    kind: &'static str,
    status: Status,
    next_seq: u64,
    in_flight: HashMap<u64, Request>,
    history: VecDeque<Response>,
    history_limit: usize,
    close_reason_limit: usize,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    request: Option<RequestMeta>,
    exception: Option<String>,
}

impl ConnectionState {
    fn new(
        socket: Arc<dyn Socket>,
        codec: Arc<dyn Codec>,
        kind: &'static str,
        config: &ConnectionConfig,
        observers: Vec<Arc<dyn ConnectionObserver>>,
    ) -> Self {
        Self {
            socket,
            codec,
            kind,
            status: Status::Created,
            next_seq: 1,
            in_flight: HashMap::new(),
            history: VecDeque::new(),
            history_limit: config.response_history,
            close_reason_limit: config.close_reason_limit,
            observers,
            request: None,
            exception: None,
        }
    }

    /// Identity of the underlying socket.
    pub fn id(&self) -> SocketId {
        self.socket.id()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    /// Name of the codec in use.
    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    /// The handshake request, for server-side connections.
    pub fn request(&self) -> Option<&RequestMeta> {
        self.request.as_ref()
    }

    /// Why the connection failed, if it did.
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Requests still waiting for their response, by seq.
    pub fn in_flight(&self) -> &HashMap<u64, Request> {
        &self.in_flight
    }

    /// Most recently sent responses, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Response> {
        self.history.iter()
    }

    /// Remembers a request until the response with its seq goes out (or,
    /// on a client, comes in).
    pub fn record_request(&mut self, request: Request) {
        if let Some(seq) = request.seq {
            self.in_flight.insert(seq, request);
        }
    }

    /// Forgets an in-flight request.
    pub fn take_in_flight(&mut self, seq: u64) -> Option<Request> {
        self.in_flight.remove(&seq)
    }

    /// Reports an event to every observer.
    pub fn notify(&self, event: ConnectionEvent<'_>) {
        let socket = self.id();
        for observer in &self.observers {
            observer.on_event(socket, self.kind, &event);
        }
    }

    /// Encodes and sends an envelope.
    ///
    /// A response with a seq retires the matching in-flight request and
    /// goes into the history. A request without a seq gets the next one.
    ///
    /// # Errors
    /// - [`RpcError::ConnectionClosed`] once the connection is closed
    /// - [`RpcError::Protocol`] if encoding fails
    /// - [`RpcError::Transport`] if the socket refuses the payload
    pub fn send_message(&mut self, envelope: Envelope) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed(self.id()));
        }
        let envelope = match envelope {
            Envelope::Response(response) => {
                if let Some(seq) = response.seq {
                    self.in_flight.remove(&seq);
                    if self.history_limit > 0 {
                        if self.history.len() == self.history_limit {
                            self.history.pop_front();
                        }
                        self.history.push_back(response.clone());
                    }
                }
                Envelope::Response(response)
            }
            Envelope::Request(mut request) => {
                if request.seq.is_none() {
                    request.seq = Some(self.allocate_seq());
                }
                Envelope::Request(request)
            }
        };
        self.write(&envelope.to_value())
    }

    /// Sends a request with the next seq and tracks it as in flight.
    ///
    /// # Errors
    /// Same as [`send_message`](Self::send_message).
    pub fn send_command(
        &mut self,
        command: &str,
        params: Map<String, serde_json::Value>,
    ) -> Result<u64, RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed(self.id()));
        }
        let seq = self.allocate_seq();
        let request = Request::new(command, params).with_seq(seq);
        let value = request.to_value();
        self.in_flight.insert(seq, request);
        if let Err(e) = self.write(&value) {
            self.in_flight.remove(&seq);
            return Err(e);
        }
        Ok(seq)
    }

    /// Sends a request without a seq; nobody will answer it.
    ///
    /// # Errors
    /// Same as [`send_message`](Self::send_message).
    pub fn send_notification(
        &mut self,
        command: &str,
        params: Map<String, serde_json::Value>,
    ) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed(self.id()));
        }
        self.write(&Request::new(command, params).to_value())
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn write(&mut self, value: &serde_json::Value) -> Result<(), RpcError> {
        let payload = self.codec.encode(value)?;
        self.socket.send(payload)?;
        self.notify(ConnectionEvent::MessageSent { message: value });
        Ok(())
    }

    /// Sends a reply produced by the processor.
    ///
    /// Answers to notifications are not sent; a failed notification is
    /// logged instead so the error does not vanish.
    fn respond(&mut self, response: Response) {
        if response.seq.is_none() {
            match &response.error {
                Some(error) => {
                    tracing::warn!(socket = %self.id(), error, "notification failed")
                }
                None => tracing::debug!(socket = %self.id(), "notification handled"),
            }
            return;
        }
        if let Err(e) = self.send_message(Envelope::Response(response)) {
            tracing::warn!(socket = %self.id(), error = %e, "failed to send response");
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One live socket and everything the protocol knows about it.
pub struct Connection<P: Processor> {
    state: ConnectionState,
    processor: P,
    deferred: HashMap<u64, (Option<u64>, AbortHandle)>,
    next_token: u64,
}

impl<P: Processor> Connection<P> {
    /// Creates a connection for a socket the transport just reported.
    pub fn new(
        socket: Arc<dyn Socket>,
        codec: Arc<dyn Codec>,
        config: &ConnectionConfig,
        observers: Vec<Arc<dyn ConnectionObserver>>,
        context: &Arc<P::Context>,
    ) -> Self {
        Self {
            state: ConnectionState::new(socket, codec, P::KIND, config, observers),
            processor: P::create(context),
            deferred: HashMap::new(),
            next_token: 0,
        }
    }

    pub fn id(&self) -> SocketId {
        self.state.id()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Number of deferred calls still waiting to settle.
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// A peer connected to us.
    pub fn on_connect(&mut self, request: RequestMeta) {
        self.state.request = Some(request);
        self.open();
    }

    /// A socket we dialed is open.
    pub fn on_open(&mut self) {
        self.open();
    }

    fn open(&mut self) {
        if self.state.status != Status::Created {
            return;
        }
        self.state.status = Status::Open;
        self.state.notify(ConnectionEvent::Opened {
            request: self.state.request.as_ref(),
        });
    }

    /// Handles an incoming payload.
    ///
    /// Returns the settlement future of a deferred call, which the caller
    /// must poll (the router does) for the response to be sent.
    pub fn on_message(&mut self, payload: Payload) -> Option<SettlementFuture> {
        if self.state.is_closed() {
            tracing::debug!(socket = %self.id(), "message on closed connection ignored");
            return None;
        }
        if payload.is_blank() {
            return None;
        }

        let message = match self.state.codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.fail_decode(e);
                return None;
            }
        };
        self.state.notify(ConnectionEvent::MessageReceived { message: &message });

        match self.processor.process_message(&mut self.state, message) {
            Outcome::None => None,
            Outcome::Reply(response) => {
                self.state.respond(response);
                None
            }
            Outcome::Deferred { seq, future } => Some(self.track(seq, future)),
        }
    }

    /// Closes with a protocol error after an undecodable payload.
    fn fail_decode(&mut self, error: ProtocolError) {
        let detail = match &error {
            ProtocolError::Decode(inner) => inner.to_string(),
            other => other.to_string(),
        };
        let reason = truncate_reason(
            format!("{} parse error: '{}'", self.state.codec.name(), detail),
            self.state.close_reason_limit,
        );
        self.state.notify(ConnectionEvent::Failed { error: &reason });
        self.state.exception = Some(reason.clone());
        self.close(CloseStatus::PROTOCOL_ERROR, &reason);
    }

    fn track(&mut self, seq: Option<u64>, future: Deferred) -> SettlementFuture {
        self.next_token += 1;
        let token = self.next_token;
        let (handle, registration) = AbortHandle::new_pair();
        self.deferred.insert(token, (seq, handle));
        tracing::debug!(socket = %self.id(), ?seq, token, "deferred call tracked");

        let socket = self.id();
        let guarded = AssertUnwindSafe(future).catch_unwind().map(move |outcome| {
            outcome.unwrap_or_else(|payload| {
                let detail = panic_message(payload.as_ref());
                tracing::error!(%socket, token, detail, "deferred call panicked");
                Err(format!("deferred call panicked: {detail}"))
            })
        });
        Box::pin(async move {
            let result = Abortable::new(guarded, registration).await;
            Settlement {
                socket,
                token,
                result,
            }
        })
    }

    /// Delivers the result of a deferred call.
    ///
    /// Settlements the connection no longer tracks (because it closed
    /// since, or the token is unknown) are discarded, never sent.
    pub fn settle(&mut self, token: u64, result: Result<Value, String>) {
        let Some((seq, _)) = self.deferred.remove(&token) else {
            self.state.notify(ConnectionEvent::DeferredDiscarded { seq: None });
            return;
        };
        if self.state.is_closed() {
            self.state.notify(ConnectionEvent::DeferredDiscarded { seq });
            return;
        }
        let response = self.processor.settle(result).with_seq(seq);
        self.state.respond(response);
    }

    /// The transport reported an error. Terminal; no response possible.
    pub fn on_error(&mut self, error: &TransportError) {
        if self.state.is_closed() {
            return;
        }
        let message = error.to_string();
        self.state.notify(ConnectionEvent::Failed { error: &message });
        self.state.exception = Some(message);
        self.state.status = Status::Closed;
        self.cleanup();
    }

    /// The transport reported the socket closed.
    pub fn on_close(&mut self, status: CloseStatus, reason: &str) {
        if self.state.is_closed() {
            return;
        }
        self.state.status = Status::Closed;
        self.state.notify(ConnectionEvent::Closed { status, reason });
        self.cleanup();
    }

    pub fn on_pong(&mut self, payload: &[u8]) {
        self.state.notify(ConnectionEvent::Pong { payload });
    }

    /// Closes the socket and releases everything. Idempotent.
    pub fn close(&mut self, status: CloseStatus, reason: &str) {
        if self.state.is_closed() {
            return;
        }
        if let Err(e) = self.state.socket.close(status, reason) {
            tracing::debug!(socket = %self.id(), error = %e, "socket close failed");
        }
        self.state.status = Status::Closed;
        self.state.notify(ConnectionEvent::Closed { status, reason });
        self.cleanup();
    }

    fn cleanup(&mut self) {
        self.state.in_flight.clear();
        for (_, (_, handle)) in self.deferred.drain() {
            handle.abort();
        }
        self.processor.cleanup(&mut self.state);
    }
}

/// Cuts `reason` to at most `limit` bytes without splitting a character.
pub(crate) fn truncate_reason(mut reason: String, limit: usize) -> String {
    if reason.len() > limit {
        let mut end = limit;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::testing::{Recorded, Recorder};
    use objrpc_protocol::{JsonCodec, NoneCodec};
    use objrpc_transport::memory::MemorySocket;
    use serde_json::json;

    /// Echoes requests back as their own result; answers responses with
    /// nothing. Deferred when the request says so.
    struct Echo {
        cleaned: bool,
    }

    impl Processor for Echo {
        type Context = ();
        const KIND: &'static str = "echo";

        fn create(_context: &Arc<()>) -> Self {
            Echo { cleaned: false }
        }

        fn process_message(
            &mut self,
            state: &mut ConnectionState,
            message: serde_json::Value,
        ) -> Outcome {
            let seq = objrpc_protocol::seq_of(&message);
            if let Ok(Envelope::Request(request)) = Envelope::from_value(message.clone()) {
                state.record_request(request);
            }
            if message.get("defer").is_some() {
                let future: Deferred = Box::pin(async { Ok(Value::from("later")) });
                return Outcome::Deferred { seq, future };
            }
            Outcome::Reply(Response::ok(message).with_seq(seq))
        }

        fn cleanup(&mut self, _state: &mut ConnectionState) {
            self.cleaned = true;
        }
    }

    fn connection(
        codec: Arc<dyn Codec>,
        config: &ConnectionConfig,
    ) -> (Connection<Echo>, Arc<MemorySocket>, Arc<Recorder>) {
        let socket = MemorySocket::open();
        let recorder = Arc::new(Recorder::default());
        let observers: Vec<Arc<dyn ConnectionObserver>> = vec![recorder.clone()];
        let mut conn =
            Connection::<Echo>::new(socket.clone(), codec, config, observers, &Arc::new(()));
        conn.on_connect(RequestMeta::default());
        (conn, socket, recorder)
    }

    fn json_connection() -> (Connection<Echo>, Arc<MemorySocket>, Arc<Recorder>) {
        connection(Arc::new(JsonCodec::compact()), &ConnectionConfig::default())
    }

    fn sent_values(socket: &MemorySocket) -> Vec<serde_json::Value> {
        socket
            .take_sent()
            .into_iter()
            .map(|payload| JsonCodec::compact().decode(payload).unwrap())
            .collect()
    }

    #[test]
    fn test_connect_opens_once() {
        let (mut conn, _, recorder) = json_connection();
        assert_eq!(conn.state().status(), Status::Open);
        conn.on_open();
        assert_eq!(recorder.take(), vec![Recorded::Opened]);
    }

    #[test]
    fn test_message_reply_echoes_seq() {
        let (mut conn, socket, _) = json_connection();
        let deferred = conn.on_message(Payload::Text(r#"{"command":"x","seq":7}"#.into()));
        assert!(deferred.is_none());

        let sent = sent_values(&socket);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["seq"], 7);
        assert_eq!(sent[0]["success"], true);
        assert!(conn.state().in_flight().is_empty());
        assert_eq!(conn.state().history().count(), 1);
    }

    #[test]
    fn test_blank_payloads_are_ignored() {
        let (mut conn, socket, _) = json_connection();
        conn.on_message(Payload::Text("   \n".into()));
        conn.on_message(Payload::Binary(Vec::new()));
        assert!(socket.sent().is_empty());
        assert_eq!(conn.state().status(), Status::Open);
    }

    #[test]
    fn test_notification_reply_is_not_sent() {
        let (mut conn, socket, _) = json_connection();
        conn.on_message(Payload::Text(r#"{"command":"x"}"#.into()));
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_decode_failure_closes_with_protocol_error() {
        let (mut conn, socket, recorder) = json_connection();
        recorder.take();

        conn.on_message(Payload::Text("{not json".into()));

        let (status, reason) = socket.closed().expect("socket should be closed");
        assert_eq!(status, CloseStatus::PROTOCOL_ERROR);
        assert!(reason.starts_with("json parse error: '"), "{reason}");
        assert!(reason.ends_with('\''));
        assert_eq!(conn.state().status(), Status::Closed);
        assert_eq!(conn.state().exception(), Some(reason.as_str()));
        assert!(conn.processor().cleaned);
        assert!(socket.sent().is_empty());

        // Later messages are ignored.
        conn.on_message(Payload::Text(r#"{"command":"x","seq":1}"#.into()));
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_close_reason_is_truncated_on_char_boundary() {
        let config = ConnectionConfig {
            close_reason_limit: 20,
            ..ConnectionConfig::default()
        };
        let (mut conn, socket, _) = connection(Arc::new(JsonCodec::compact()), &config);
        conn.on_message(Payload::Text("ééééééééééééééééééééé".into()));

        let (_, reason) = socket.closed().unwrap();
        assert!(reason.len() <= 20);
        assert!(reason.starts_with("json parse error"));
    }

    #[test]
    fn test_truncate_reason() {
        assert_eq!(truncate_reason("short".into(), 10), "short");
        assert_eq!(truncate_reason("abcdef".into(), 3), "abc");
        // 'é' is two bytes; cutting at 3 would split the second one.
        assert_eq!(truncate_reason("éé".into(), 3), "é");
    }

    #[test]
    fn test_none_codec_passes_values_and_rejects_binary() {
        let (mut conn, socket, _) =
            connection(Arc::new(NoneCodec), &ConnectionConfig::default());
        conn.on_message(Payload::Value(json!({"command": "x", "seq": 1})));
        assert_eq!(socket.sent(), vec![Payload::Value(
            json!({"success": true, "result": {"command": "x", "seq": 1}, "seq": 1})
        )]);

        conn.on_message(Payload::Binary(vec![1]));
        let (status, reason) = socket.closed().unwrap();
        assert_eq!(status, CloseStatus::PROTOCOL_ERROR);
        assert!(reason.starts_with("none parse error: '"));
    }

    #[test]
    fn test_send_command_allocates_sequential_seqs() {
        let (mut conn, socket, _) = json_connection();
        let a = conn.state_mut().send_command("list", Map::new()).unwrap();
        let b = conn.state_mut().send_command("list", Map::new()).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(conn.state().in_flight().len(), 2);

        let sent = sent_values(&socket);
        assert_eq!(sent[0], json!({"command": "list", "seq": 1}));
        assert_eq!(sent[1], json!({"command": "list", "seq": 2}));
    }

    #[test]
    fn test_send_message_assigns_seq_to_bare_request() {
        let (mut conn, socket, _) = json_connection();
        conn.state_mut()
            .send_message(Request::new("list", Map::new()).into())
            .unwrap();
        assert_eq!(sent_values(&socket)[0]["seq"], 1);
    }

    #[test]
    fn test_send_notification_has_no_seq() {
        let (mut conn, socket, _) = json_connection();
        conn.state_mut().send_notification("list", Map::new()).unwrap();
        assert_eq!(sent_values(&socket)[0], json!({"command": "list"}));
        assert!(conn.state().in_flight().is_empty());
    }

    #[test]
    fn test_close_is_terminal_and_idempotent() {
        let (mut conn, socket, recorder) = json_connection();
        recorder.take();
        conn.state_mut().send_command("list", Map::new()).unwrap();

        conn.close(CloseStatus::NORMAL, "bye");
        conn.close(CloseStatus::GOING_AWAY, "again");
        conn.on_close(CloseStatus::NORMAL, "late");

        assert_eq!(socket.closed(), Some((CloseStatus::NORMAL, "bye".to_string())));
        assert!(conn.state().in_flight().is_empty());
        let closes: Vec<_> = recorder
            .take()
            .into_iter()
            .filter(|e| matches!(e, Recorded::Closed(..)))
            .collect();
        assert_eq!(closes, vec![Recorded::Closed(CloseStatus::NORMAL, "bye".into())]);

        let err = conn.state_mut().send_command("list", Map::new()).unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed(_)));
    }

    #[test]
    fn test_on_error_records_exception() {
        let (mut conn, _, _) = json_connection();
        conn.on_error(&TransportError::ConnectionClosed("reset".into()));
        assert_eq!(conn.state().status(), Status::Closed);
        assert!(conn.state().exception().unwrap().contains("reset"));
        assert!(conn.processor().cleaned);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = ConnectionConfig {
            response_history: 2,
            ..ConnectionConfig::default()
        };
        let (mut conn, _, _) = connection(Arc::new(JsonCodec::compact()), &config);
        for seq in 1..=3 {
            conn.on_message(Payload::Text(format!(r#"{{"command":"x","seq":{seq}}}"#)));
        }
        let seqs: Vec<_> = conn.state().history().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_deferred_settlement_is_sent() {
        let (mut conn, socket, _) = json_connection();
        let future = conn
            .on_message(Payload::Text(r#"{"command":"x","defer":true,"seq":3}"#.into()))
            .expect("deferred");
        assert_eq!(conn.pending_deferred(), 1);
        assert!(socket.sent().is_empty());

        let settlement = future.await;
        conn.settle(settlement.token, settlement.result.unwrap());

        assert_eq!(
            sent_values(&socket),
            vec![json!({"success": true, "result": "later", "seq": 3})]
        );
        assert_eq!(conn.pending_deferred(), 0);
        assert!(conn.state().in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_deferred_call_fails_alone() {
        let (mut conn, socket, _) = json_connection();
        let future: Deferred = Box::pin(async {
            if true {
                panic!("deferred boom");
            }
            Ok::<Value, String>(Value::Null)
        });
        let settlement = conn.track(Some(5), future).await;
        conn.settle(settlement.token, settlement.result.unwrap());

        assert_eq!(
            sent_values(&socket),
            vec![json!({"success": false, "error": "deferred call panicked: deferred boom", "seq": 5})]
        );
        assert_eq!(conn.state().status(), Status::Open);
    }

    #[tokio::test]
    async fn test_deferred_is_aborted_on_close() {
        let (mut conn, socket, _) = json_connection();
        let future = conn
            .on_message(Payload::Text(r#"{"command":"x","defer":true,"seq":3}"#.into()))
            .expect("deferred");

        conn.close(CloseStatus::NORMAL, "bye");
        let settlement = future.await;
        assert!(settlement.result.is_err());
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_unknown_settlement_token_is_discarded() {
        let (mut conn, socket, recorder) = json_connection();
        recorder.take();
        conn.settle(99, Ok(Value::Null));
        assert!(socket.sent().is_empty());
        assert_eq!(recorder.take(), vec![Recorded::Discarded(None)]);
    }
}
