//! Wire protocol for objrpc.
//!
//! This crate defines the "language" that the two ends of a connection
//! speak:
//!
//! - **Envelopes** ([`Request`], [`Response`], [`Envelope`]): the message
//!   shapes that travel on the wire.
//! - **Values** ([`Value`], [`ObjectId`], [`Descriptor`]): what method
//!   arguments and results may contain, and how non-plain values are
//!   annotated with type metadata.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`NoneCodec`]): how
//!   messages are turned into socket payloads and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (payloads) and the
//! connection engine (commands and objects). It knows nothing about
//! connections or registries.
//!
//! ```text
//! Transport (Payload) → Codec (serde_json::Value) → Envelope → Connection
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod descriptor;
mod envelope;
mod error;
mod value;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec, NoneCodec, codec_by_name};
pub use descriptor::Descriptor;
pub use envelope::{Envelope, Request, Response, seq_of};
pub use error::ProtocolError;
pub use value::{HandleResolver, NoHandles, ObjectId, Value};
