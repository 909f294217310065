//! Error types for the registry layer.
//!
//! The `Display` text of each variant is exactly what the remote peer sees
//! in the `error` field of a failure response, so these strings are part
//! of the wire contract.

use objrpc_protocol::ObjectId;

/// Errors that can occur while looking up, creating or using objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The id is not (or no longer) in the registry.
    #[error("No such object {0}")]
    NoSuchObject(ObjectId),

    /// `new` named a class that was never registered.
    #[error("No such class '{0}'")]
    NoSuchClass(String),

    /// The object's schema declares no method with this name.
    #[error("No such method on object {id}: {method}")]
    NoSuchMethod { id: ObjectId, method: String },

    /// The object's schema declares no property with this name.
    #[error("No such property on object {id}: {property}")]
    NoSuchProperty { id: ObjectId, property: String },

    /// The property exists but has no setter.
    #[error("Property is read-only on object {id}: {property}")]
    ReadOnly { id: ObjectId, property: String },

    /// The class was registered without a constructor.
    #[error("Class '{0}' cannot be constructed")]
    NotConstructible(String),

    /// A class with this name is already in the table.
    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    /// A singleton's value is not of the type its schema was built for.
    #[error("Object '{0}' does not match its class schema")]
    TypeMismatch(String),

    /// Constructor, method, getter or setter failed; carries its message.
    #[error("{0}")]
    Application(String),
}
