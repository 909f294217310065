//! `RpcClient`: a WebSocket client for an objrpc server.
//!
//! The client runs its own reactor with a single [`ClientConnection`].
//! Calls are correlated by `seq`, so any number of them (up to
//! [`ClientConfig::max_pending`]) may be in flight at once.
//!
//! ```rust,no_run
//! use objrpc::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RpcClient::connect("ws://127.0.0.1:8080").await?;
//! let adder = client.new_object("Adder", vec![]).await?;
//! let sum = client.call_method(adder, "add", vec![2.into(), 3.into()]).await?;
//! assert_eq!(sum, 5);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use objrpc_protocol::ObjectId;
use objrpc_transport::{CloseStatus, Socket, SocketId, websocket};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::client_connection::ClientConnection;
use crate::router::{Reactor, ReactorHandle, Router};
use crate::{CallError, ClientConfig, ConnectionObserver, RpcError};

/// A live object as reported by the `objects` command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
}

/// A connected client.
pub struct RpcClient {
    handle: ReactorHandle<ClientConnection>,
    socket: SocketId,
    config: ClientConfig,
}

impl RpcClient {
    /// Connects with default settings.
    ///
    /// # Errors
    /// Returns [`RpcError::Transport`] if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, RpcError> {
        Self::connect_with(url, ClientConfig::default(), Vec::new()).await
    }

    /// Connects with explicit settings and extra observers.
    ///
    /// # Errors
    /// - [`RpcError::Protocol`] if the configured codec is unknown
    /// - [`RpcError::Transport`] if the server cannot be reached
    pub async fn connect_with(
        url: &str,
        config: ClientConfig,
        observers: Vec<Arc<dyn ConnectionObserver>>,
    ) -> Result<Self, RpcError> {
        let mut router = Router::<ClientConnection>::new(
            Arc::new(config.clone()),
            config.connection.clone(),
        )?;
        for observer in observers {
            router = router.observer(observer);
        }
        let (reactor, handle) = Reactor::new(router);
        tokio::spawn(reactor.run());

        let socket = websocket::connect(url, &handle.events()).await?;
        tracing::info!(url, socket = %socket.id(), "client connected");
        Ok(Self {
            handle,
            socket: socket.id(),
            config,
        })
    }

    /// Identity of the underlying socket.
    pub fn socket_id(&self) -> SocketId {
        self.socket
    }

    /// Sends `command` and waits for its result.
    ///
    /// # Errors
    /// - [`CallError::Remote`] if the server answered with a failure
    /// - [`CallError::Timeout`] if no answer came within `request_timeout`
    /// - [`CallError::ConnectionClosed`] if the connection went away
    /// - [`CallError::TooManyPending`] if too many calls are outstanding
    pub async fn call(&self, command: &str, params: Map<String, Value>) -> Result<Value, CallError> {
        let socket = self.socket;
        let name = command.to_string();
        let pending = self
            .handle
            .request(move |router| match router.connection_mut(socket) {
                Some(conn) => conn.command(&name, params),
                None => Err(CallError::ConnectionClosed),
            })
            .await
            .map_err(|_| CallError::ConnectionClosed)??;

        let seq = pending.seq();
        let after = self.config.request_timeout;
        match tokio::time::timeout(after, pending).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(seq, command, ?after, "request timed out");
                let _ = self.handle.submit(move |router| {
                    if let Some(conn) = router.connection_mut(socket) {
                        conn.forget(seq);
                    }
                });
                Err(CallError::Timeout { seq, after })
            }
        }
    }

    /// Sends `command` without a seq. The server runs it but never answers.
    ///
    /// # Errors
    /// Returns [`CallError::ConnectionClosed`] or
    /// [`CallError::SendFailed`] if it could not be sent.
    pub async fn notify(&self, command: &str, params: Map<String, Value>) -> Result<(), CallError> {
        let socket = self.socket;
        let name = command.to_string();
        self.handle
            .request(move |router| match router.connection_mut(socket) {
                Some(conn) => conn
                    .state_mut()
                    .send_notification(&name, params)
                    .map_err(|e| match e {
                        RpcError::ConnectionClosed(_) => CallError::ConnectionClosed,
                        other => CallError::SendFailed(other.to_string()),
                    }),
                None => Err(CallError::ConnectionClosed),
            })
            .await
            .map_err(|_| CallError::ConnectionClosed)?
    }

    /// Creates an instance of `class` and returns its id.
    ///
    /// # Errors
    /// As [`call`](Self::call), plus [`CallError::UnexpectedResult`] if the
    /// server's answer carries no id.
    pub async fn new_object(&self, class: &str, args: Vec<Value>) -> Result<ObjectId, CallError> {
        let result = self
            .call("new", params(json!({ "class": class, "args": args })))
            .await?;
        result
            .get("id")
            .and_then(Value::as_u64)
            .map(ObjectId)
            .ok_or_else(|| CallError::UnexpectedResult(result.to_string()))
    }

    /// Invokes `method` on object `id`.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn call_method(&self, id: ObjectId, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        self.call(
            "call",
            params(json!({ "id": id, "method": method, "args": args })),
        )
        .await
    }

    /// Reads `property` of object `id`.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn get(&self, id: ObjectId, property: &str) -> Result<Value, CallError> {
        self.call("get", params(json!({ "id": id, "property": property })))
            .await
    }

    /// Assigns `value` to `property` of object `id`; returns the value.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn set(&self, id: ObjectId, property: &str, value: Value) -> Result<Value, CallError> {
        self.call(
            "set",
            params(json!({ "id": id, "property": property, "value": value })),
        )
        .await
    }

    /// Releases object `id` on the server.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn delete(&self, id: ObjectId) -> Result<(), CallError> {
        self.call("delete", params(json!({ "id": id }))).await?;
        Ok(())
    }

    /// Names of the classes the server exposes.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn list(&self) -> Result<Vec<String>, CallError> {
        typed(self.call("list", Map::new()).await?)
    }

    /// Objects alive on this connection, including shared ones.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn objects(&self) -> Result<Vec<ObjectInfo>, CallError> {
        typed(self.call("objects", Map::new()).await?)
    }

    /// Closes the connection and stops the client's reactor.
    ///
    /// Calls still waiting fail with [`CallError::ConnectionClosed`].
    ///
    /// # Errors
    /// Returns [`RpcError::ReactorStopped`] if the reactor already stopped.
    pub async fn close(self) -> Result<(), RpcError> {
        let socket = self.socket;
        self.handle
            .request(move |router| {
                if let Err(e) = router.close(socket, CloseStatus::NORMAL, "client closed") {
                    tracing::debug!(error = %e, "connection already gone");
                }
                router.shutdown();
            })
            .await
    }
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn typed<T: DeserializeOwned>(value: Value) -> Result<T, CallError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CallError::UnexpectedResult(format!("{e}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_object() {
        let map = params(json!({"id": 3, "property": "x"}));
        assert_eq!(map.len(), 2);
        assert!(params(json!([1])).is_empty());
    }

    #[test]
    fn test_typed_results() {
        let names: Vec<String> = typed(json!(["A", "B"])).unwrap();
        assert_eq!(names, vec!["A", "B"]);

        let objects: Vec<ObjectInfo> = typed(json!([{"id": 1, "name": "clock"}])).unwrap();
        assert_eq!(objects, vec![ObjectInfo {
            id: ObjectId(1),
            name: "clock".into()
        }]);

        let err = typed::<Vec<String>>(json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, CallError::UnexpectedResult(_)));
    }

    #[tokio::test]
    async fn test_connect_to_nothing_fails() {
        let result = RpcClient::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }
}
