//! # objrpc
//!
//! Expose Rust objects to a remote peer over a duplex socket.
//!
//! A peer creates instances of registered classes, calls their methods,
//! reads and writes their properties, and lists their members, all with
//! small JSON messages correlated by a sequence number. The server side
//! keeps one object registry per connection; the client side matches
//! responses to outstanding calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use objrpc::prelude::*;
//!
//! struct Adder;
//!
//! # async fn run() -> Result<(), RpcError> {
//! let server = RpcServer::builder()
//!     .bind("127.0.0.1:8080")
//!     .register(
//!         ClassBuilder::<Adder>::new("Adder")
//!             .constructor(|_| Ok(Adder))
//!             .method("add", 2, |_, args| Ok(args.f64(0)? + args.f64(1)?))
//!             .build(),
//!     )
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Layers
//!
//! | crate               | concern                                     |
//! |---------------------|---------------------------------------------|
//! | `objrpc-transport`  | sockets, transport events, WebSocket adapter |
//! | `objrpc-protocol`   | codecs, envelopes, values, descriptors       |
//! | `objrpc-registry`   | class schemas, class table, object registry  |
//! | `objrpc` (this one) | connections, router, reactor, server, client |

mod client;
mod client_connection;
pub mod commands;
mod config;
pub mod connection;
mod error;
mod observer;
pub mod router;
mod server;
mod server_connection;

pub use client::{ObjectInfo, RpcClient};
pub use client_connection::{ClientConnection, PendingCall};
pub use config::{ClientConfig, ConnectionConfig};
pub use connection::{Connection, ConnectionState, Outcome, Processor, Status};
pub use error::{CallError, RpcError};
pub use observer::{ConnectionEvent, ConnectionObserver, TracingObserver};
pub use router::{Reactor, ReactorHandle, Router};
pub use server::{RpcServer, RpcServerBuilder};
pub use server_connection::{ServerConnection, ServerContext};

/// Re-exports of everything an application usually needs.
pub mod prelude {
    pub use crate::{
        CallError, ClientConfig, ConnectionConfig, ConnectionEvent, ConnectionObserver,
        ObjectInfo, RpcClient, RpcError, RpcServer, TracingObserver,
    };
    pub use objrpc_protocol::{ObjectId, Value};
    pub use objrpc_registry::{Args, ClassBuilder, ClassSchema, ClassTable};
    pub use objrpc_transport::{CloseStatus, SocketId};
}
