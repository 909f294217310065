//! The server side: runs commands against a per-connection registry.

use std::sync::Arc;

use objrpc_protocol::{Request, Response, Value, seq_of};
use objrpc_registry::{ClassTable, ObjectRegistry};

use crate::commands::{Answer, CommandTable};
use crate::connection::{ConnectionState, Outcome, Processor};
use crate::ConnectionConfig;

/// Everything server connections share: what is exposed and how.
#[derive(Debug)]
pub struct ServerContext {
    pub classes: ClassTable,
    pub commands: CommandTable,
    pub config: ConnectionConfig,
}

impl ServerContext {
    /// Creates a context with the standard command set.
    pub fn new(classes: ClassTable, config: ConnectionConfig) -> Self {
        Self {
            classes,
            commands: CommandTable::standard(),
            config,
        }
    }
}

/// Server half of a connection.
///
/// Owns the objects the peer created; they go away with the connection.
#[derive(Debug)]
pub struct ServerConnection {
    pub(crate) context: Arc<ServerContext>,
    pub(crate) registry: ObjectRegistry,
}

impl ServerConnection {
    pub fn new(context: Arc<ServerContext>) -> Self {
        let registry = ObjectRegistry::seeded(&context.classes);
        Self { context, registry }
    }

    /// The objects currently owned by this connection.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    fn execute(&mut self, request: &Request) -> Outcome {
        let Some(handler) = self.context.commands.get(&request.command) else {
            return Outcome::Reply(
                Response::err(format!("No such command '{}'", request.command))
                    .with_seq(request.seq),
            );
        };
        tracing::debug!(command = %request.command, seq = ?request.seq, "executing command");

        match handler(self, request) {
            Ok(Answer::Value(result)) => Outcome::Reply(Response::ok(result).with_seq(request.seq)),
            Ok(Answer::Empty) => Outcome::Reply(Response::ok_empty().with_seq(request.seq)),
            Ok(Answer::Deferred(future)) => Outcome::Deferred {
                seq: request.seq,
                future,
            },
            Err(error) => Outcome::Reply(Response::err(error).with_seq(request.seq)),
        }
    }
}

impl Processor for ServerConnection {
    type Context = ServerContext;
    const KIND: &'static str = "server";

    fn create(context: &Arc<ServerContext>) -> Self {
        Self::new(Arc::clone(context))
    }

    fn process_message(&mut self, state: &mut ConnectionState, message: serde_json::Value) -> Outcome {
        let seq = seq_of(&message);
        let no_command = || Outcome::Reply(Response::err("No command specified").with_seq(seq));

        let serde_json::Value::Object(mut params) = message else {
            return no_command();
        };
        let Some(serde_json::Value::String(command)) = params.remove("command") else {
            return no_command();
        };
        params.remove("seq");

        let request = Request {
            command,
            seq,
            params,
        };
        state.record_request(request.clone());
        self.execute(&request)
    }

    fn settle(&mut self, result: Result<Value, String>) -> Response {
        match result {
            Ok(value) => Response::ok(value.to_wire(&self.registry)),
            Err(message) => Response::err(message),
        }
    }

    fn cleanup(&mut self, _state: &mut ConnectionState) {
        tracing::debug!(objects = self.registry.len(), "releasing connection objects");
        self.registry.clear();
    }
}
