//! `RpcServer` builder and server loop.
//!
//! This is the entry point for exposing objects over WebSocket. It ties
//! the layers together: transport → router → connection → registry.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use objrpc_registry::{ClassSchema, ClassTable, RegistryError};
use objrpc_transport::WebSocketListener;

use crate::router::{Reactor, ReactorHandle, Router};
use crate::server_connection::{ServerConnection, ServerContext};
use crate::{ConnectionConfig, ConnectionObserver, RpcError};

/// Builder for configuring and starting an objrpc server.
///
/// # Example
///
/// ```rust,no_run
/// use objrpc::prelude::*;
///
/// struct Adder;
///
/// # async fn run() -> Result<(), RpcError> {
/// let adder = ClassBuilder::<Adder>::new("Adder")
///     .constructor(|_| Ok(Adder))
///     .method("add", 2, |_, args| Ok(args.f64(0)? + args.f64(1)?))
///     .build();
///
/// let server = RpcServer::builder()
///     .bind("0.0.0.0:8080")
///     .register(adder)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RpcServerBuilder {
    bind_addr: String,
    config: ConnectionConfig,
    classes: ClassTable,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    error: Option<RegistryError>,
}

impl RpcServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: ConnectionConfig::default(),
            classes: ClassTable::new(),
            observers: Vec::new(),
            error: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Selects the codec by name.
    pub fn codec(mut self, name: &str) -> Self {
        self.config.codec = name.to_string();
        self
    }

    /// Sets the connection configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Exposes a class. Registering a name twice fails at
    /// [`build`](Self::build).
    pub fn register(mut self, schema: Arc<ClassSchema>) -> Self {
        if let Err(e) = self.classes.register(schema) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Exposes an existing object to every connection.
    pub fn register_object<T: Any + Send>(
        mut self,
        name: &str,
        schema: Arc<ClassSchema>,
        value: T,
    ) -> Self {
        if let Err(e) = self.classes.register_object(name, schema, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Adds a connection observer next to the default tracing one.
    pub fn observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Binds the listener and prepares the reactor.
    ///
    /// # Errors
    /// - [`RpcError::Registry`] if a registration failed
    /// - [`RpcError::Protocol`] if the codec name is unknown
    /// - [`RpcError::Transport`] if the address cannot be bound
    pub async fn build(self) -> Result<RpcServer, RpcError> {
        if let Some(e) = self.error {
            return Err(e.into());
        }
        let context = Arc::new(ServerContext::new(self.classes, self.config.clone()));
        let mut router = Router::<ServerConnection>::new(context, self.config)?;
        for observer in self.observers {
            router = router.observer(observer);
        }
        let listener = WebSocketListener::bind(&self.bind_addr).await?;
        let (reactor, handle) = Reactor::new(router);

        Ok(RpcServer {
            listener,
            reactor,
            handle,
        })
    }
}

impl Default for RpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound objrpc server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RpcServer {
    listener: WebSocketListener,
    reactor: Reactor<ServerConnection>,
    handle: ReactorHandle<ServerConnection>,
}

impl RpcServer {
    /// Creates a new builder.
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    ///
    /// # Errors
    /// Returns [`RpcError::Transport`] if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle for inspecting or shutting down the running server.
    pub fn handle(&self) -> ReactorHandle<ServerConnection> {
        self.handle.clone()
    }

    /// Accepts connections and serves them until
    /// [`ReactorHandle::shutdown`] is called.
    ///
    /// # Errors
    /// Returns [`RpcError::Transport`] if the listener has no local address.
    pub async fn run(self) -> Result<(), RpcError> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "objrpc server running");

        let accept = tokio::spawn(self.listener.serve(self.handle.events()));
        self.reactor.run().await;
        accept.abort();

        tracing::info!(%addr, "objrpc server stopped");
        Ok(())
    }
}
