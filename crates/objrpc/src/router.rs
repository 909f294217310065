//! Routes transport events to connections, and the reactor that drives it.
//!
//! The [`Router`] owns every connection of one endpoint, keyed by
//! [`SocketId`]. It implements [`TransportHandler`], so a transport event
//! becomes a call on the right connection. The [`Reactor`] runs a router
//! on a single task:
//!
//! ```text
//!  transport tasks ──TransportEvent──┐
//!  ReactorHandle   ──Task───────────┤──► Reactor::run ──► Router ──► Connection
//!  deferred calls  ──Settlement─────┘
//! ```
//!
//! Nothing outside the reactor task touches the router, so there are no
//! locks around connections or registries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use objrpc_protocol::{Codec, codec_by_name};
use objrpc_transport::{
    CloseStatus, EventSender, Payload, RequestMeta, Socket, SocketId, TransportError,
    TransportEvent, TransportHandler,
};
use tokio::sync::{mpsc, oneshot};

use crate::connection::{Connection, Processor, Settlement, SettlementFuture};
use crate::{ConnectionConfig, ConnectionObserver, RpcError, TracingObserver};

/// All connections of one endpoint.
pub struct Router<P: Processor> {
    connections: HashMap<SocketId, Connection<P>>,
    /// Sockets closed from this side whose transport close is still due.
    closing: HashSet<SocketId>,
    context: Arc<P::Context>,
    codec: Arc<dyn Codec>,
    config: ConnectionConfig,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    deferred: FuturesUnordered<SettlementFuture>,
    stopped: bool,
}

impl<P: Processor> Router<P> {
    /// Creates a router using the codec named in `config`.
    ///
    /// # Errors
    /// Returns [`RpcError::Protocol`] if the codec name is unknown.
    pub fn new(context: Arc<P::Context>, config: ConnectionConfig) -> Result<Self, RpcError> {
        let codec = codec_by_name(&config.codec)?;
        Ok(Self::with_codec(context, config, codec))
    }

    /// Creates a router with an explicit codec instance.
    pub fn with_codec(
        context: Arc<P::Context>,
        config: ConnectionConfig,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            closing: HashSet::new(),
            context,
            codec,
            config,
            observers: vec![Arc::new(TracingObserver)],
            deferred: FuturesUnordered::new(),
            stopped: false,
        }
    }

    /// Adds an observer to every connection created from now on.
    pub fn observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn context(&self) -> &Arc<P::Context> {
        &self.context
    }

    pub fn connection(&self, id: SocketId) -> Option<&Connection<P>> {
        self.connections.get(&id)
    }

    pub fn connection_mut(&mut self, id: SocketId) -> Option<&mut Connection<P>> {
        self.connections.get_mut(&id)
    }

    /// Number of routable connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Identities of all routable connections.
    pub fn ids(&self) -> Vec<SocketId> {
        self.connections.keys().copied().collect()
    }

    /// Number of deferred calls not settled yet.
    pub fn pending_settlements(&self) -> usize {
        self.deferred.len()
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Closes one connection and stops routing to it.
    ///
    /// # Errors
    /// Returns [`RpcError::UnknownSocket`] if `id` is not routable.
    pub fn close(&mut self, id: SocketId, status: CloseStatus, reason: &str) -> Result<(), RpcError> {
        let mut conn = self
            .connections
            .remove(&id)
            .ok_or(RpcError::UnknownSocket(id))?;
        conn.close(status, reason);
        self.closing.insert(id);
        Ok(())
    }

    /// Closes every connection and marks the router stopped.
    pub fn shutdown(&mut self) {
        tracing::info!(kind = P::KIND, connections = self.connections.len(), "router shutting down");
        for (id, mut conn) in self.connections.drain() {
            conn.close(CloseStatus::GOING_AWAY, "shutting down");
            self.closing.insert(id);
        }
        self.stopped = true;
    }

    /// Dispatches one transport event, logging failures.
    pub fn handle_event(&mut self, event: TransportEvent) {
        let kind = event.kind();
        let socket = event.socket_id();
        match event.dispatch(self) {
            Ok(()) => {}
            Err(RpcError::UnknownSocket(id)) if self.closing.contains(&id) => {
                tracing::debug!(%socket, event = kind, "event for a locally closed socket ignored");
            }
            Err(e) => {
                tracing::error!(%socket, event = kind, error = %e, "transport event not handled");
            }
        }
    }

    /// Delivers a settled deferred call to its connection.
    pub fn on_settlement(&mut self, settlement: Settlement) {
        let Settlement {
            socket,
            token,
            result,
        } = settlement;
        let Ok(result) = result else {
            tracing::debug!(%socket, token, "deferred call aborted");
            return;
        };
        match self.connections.get_mut(&socket) {
            Some(conn) => conn.settle(token, result),
            None => tracing::debug!(%socket, token, "deferred result for a gone connection discarded"),
        }
    }

    fn resolve_or_create(&mut self, socket: Arc<dyn Socket>) -> &mut Connection<P> {
        let id = socket.id();
        let Self {
            connections,
            context,
            codec,
            config,
            observers,
            ..
        } = self;
        connections.entry(id).or_insert_with(|| {
            Connection::new(socket, codec.clone(), config, observers.clone(), context)
        })
    }

    /// Accepts the transport's final event for a socket closed from this
    /// side.
    fn confirm_closed(&mut self, id: SocketId) -> Result<(), RpcError> {
        if self.closing.remove(&id) {
            tracing::debug!(socket = %id, "transport confirmed close");
            Ok(())
        } else {
            Err(RpcError::UnknownSocket(id))
        }
    }

    fn resolve(&mut self, id: SocketId) -> Result<&mut Connection<P>, RpcError> {
        self.connections
            .get_mut(&id)
            .ok_or(RpcError::UnknownSocket(id))
    }
}

impl<P: Processor> TransportHandler for Router<P> {
    type Error = RpcError;

    fn on_connect(&mut self, socket: Arc<dyn Socket>, request: RequestMeta) -> Result<(), RpcError> {
        self.resolve_or_create(socket).on_connect(request);
        Ok(())
    }

    fn on_open(&mut self, socket: Arc<dyn Socket>) -> Result<(), RpcError> {
        self.resolve_or_create(socket).on_open();
        Ok(())
    }

    fn on_message(&mut self, socket: SocketId, payload: Payload) -> Result<(), RpcError> {
        let conn = self.resolve(socket)?;
        if let Some(settlement) = conn.on_message(payload) {
            self.deferred.push(settlement);
        }
        Ok(())
    }

    fn on_error(&mut self, socket: SocketId, error: TransportError) -> Result<(), RpcError> {
        let Some(mut conn) = self.connections.remove(&socket) else {
            return self.confirm_closed(socket);
        };
        conn.on_error(&error);
        Ok(())
    }

    fn on_close(&mut self, socket: SocketId, status: CloseStatus, reason: String) -> Result<(), RpcError> {
        let Some(mut conn) = self.connections.remove(&socket) else {
            return self.confirm_closed(socket);
        };
        conn.on_close(status, &reason);
        Ok(())
    }

    fn on_pong(&mut self, socket: SocketId, payload: Vec<u8>) -> Result<(), RpcError> {
        self.resolve(socket)?.on_pong(&payload);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reactor
// ---------------------------------------------------------------------------

/// Work run on the reactor task with exclusive access to the router.
pub type Task<P> = Box<dyn FnOnce(&mut Router<P>) + Send>;

/// Runs a [`Router`] on the current task.
pub struct Reactor<P: Processor> {
    router: Router<P>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    tasks: mpsc::UnboundedReceiver<Task<P>>,
}

impl<P: Processor> Reactor<P> {
    /// Wraps `router`; the handle feeds it.
    pub fn new(router: Router<P>) -> (Self, ReactorHandle<P>) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (task_tx, tasks) = mpsc::unbounded_channel();
        let reactor = Self {
            router,
            events,
            tasks,
        };
        let handle = ReactorHandle {
            events: event_tx,
            tasks: task_tx,
        };
        (reactor, handle)
    }

    /// Processes events, tasks and settlements until the router is shut
    /// down or every handle and transport is gone.
    ///
    /// Transport events are served first so a connection exists before
    /// any task that refers to it runs.
    pub async fn run(mut self) {
        tracing::debug!(kind = P::KIND, "reactor running");
        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => {
                    self.router.handle_event(event);
                }
                Some(task) = self.tasks.recv() => {
                    task(&mut self.router);
                }
                Some(settlement) = self.router.deferred.next(), if !self.router.deferred.is_empty() => {
                    self.router.on_settlement(settlement);
                }
                else => break,
            }

            if self.router.is_stopped() {
                break;
            }
        }
        tracing::debug!(kind = P::KIND, "reactor stopped");
    }
}

/// Feeds a running [`Reactor`]. Cheap to clone.
pub struct ReactorHandle<P: Processor> {
    events: EventSender,
    tasks: mpsc::UnboundedSender<Task<P>>,
}

impl<P: Processor> Clone for ReactorHandle<P> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<P: Processor> ReactorHandle<P> {
    /// Sender for transport adapters.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Queues `task` without waiting for it.
    ///
    /// # Errors
    /// Returns [`RpcError::ReactorStopped`] if the reactor is gone.
    pub fn submit<F>(&self, task: F) -> Result<(), RpcError>
    where
        F: FnOnce(&mut Router<P>) + Send + 'static,
    {
        self.tasks
            .send(Box::new(task))
            .map_err(|_| RpcError::ReactorStopped)
    }

    /// Runs `task` on the reactor and returns what it produced.
    ///
    /// # Errors
    /// Returns [`RpcError::ReactorStopped`] if the reactor is gone or
    /// stops before running the task.
    pub async fn request<F, R>(&self, task: F) -> Result<R, RpcError>
    where
        F: FnOnce(&mut Router<P>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move |router| {
            let _ = tx.send(task(router));
        })?;
        rx.await.map_err(|_| RpcError::ReactorStopped)
    }

    /// Asks the reactor to close every connection and stop.
    ///
    /// # Errors
    /// Returns [`RpcError::ReactorStopped`] if it already stopped.
    pub fn shutdown(&self) -> Result<(), RpcError> {
        self.submit(Router::shutdown)
    }
}
