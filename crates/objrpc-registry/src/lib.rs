//! Exposed classes and live objects for objrpc.
//!
//! This crate answers two questions for the server:
//!
//! 1. **What can be exposed?** Each exposed type is described by an
//!    explicit [`ClassSchema`] (built with [`ClassBuilder`]) and collected
//!    in a [`ClassTable`], along with any ready-made singleton objects.
//! 2. **What is alive right now?** Each connection owns an
//!    [`ObjectRegistry`] mapping ids to instances.
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection layer (above)  ← runs commands against the registry
//!     ↕
//! Registry layer (this crate)  ← schemas, class table, object ids
//!     ↕
//! Protocol layer (below)  ← provides Value, ObjectId, HandleResolver
//! ```

mod classes;
mod error;
mod registry;
mod schema;

pub use classes::{ClassTable, Singleton};
pub use error::RegistryError;
pub use registry::{Entry, ObjectRegistry};
pub use schema::{
    Args, ClassBuilder, ClassSchema, Deferred, Instance, Level, Method, Property, Reply,
    panic_message,
};
