//! Configuration for connections and clients.
//!
//! Plain structs with sensible defaults. Create one with `::default()` and
//! override just the fields you care about:
//!
//! ```rust
//! use objrpc::ConnectionConfig;
//!
//! let config = ConnectionConfig {
//!     codec: "json-pretty".into(),
//!     ..ConnectionConfig::default()
//! };
//! assert_eq!(config.close_reason_limit, 123);
//! ```

use std::time::Duration;

/// Settings shared by every connection a router creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Codec name: `"json"`, `"json-pretty"` or `"none"`.
    ///
    /// Default: `"json"`.
    pub codec: String,

    /// Longest close reason sent, in bytes. A WebSocket close frame has
    /// room for 123 bytes of reason.
    ///
    /// Default: 123.
    pub close_reason_limit: usize,

    /// How many sent responses a connection remembers for inspection.
    ///
    /// Default: 100. Set to 0 to keep none.
    pub response_history: usize,

    /// How many ancestor levels `properties` and `methods` list when the
    /// request gives no `depth`. `None` lists the whole chain.
    ///
    /// Default: `None`.
    pub member_depth: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            codec: "json".to_string(),
            close_reason_limit: 123,
            response_history: 100,
            member_depth: None,
        }
    }
}

/// Settings for [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a call waits for its response.
    ///
    /// Default: 30 seconds.
    pub request_timeout: Duration,

    /// Most calls that may be outstanding at once.
    ///
    /// Default: 100.
    pub max_pending: usize,

    /// Settings for the underlying connection.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_pending: 100,
            connection: ConnectionConfig::default(),
        }
    }
}
