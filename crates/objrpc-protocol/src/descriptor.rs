//! Value descriptors: values annotated with type metadata.
//!
//! Member listings (`properties`, `methods`) and non-plain values (bytes,
//! handles) are sent as descriptors so the receiver can display or rebuild
//! them without knowing the server's types.
//!
//! ```text
//! 5                  → { "type": "number", "value": 5 }
//! [1, 2]             → { "type": "object", "class": "Array", "chain": ["Array", "Object"], "value": [1, 2] }
//! bytes [1, 2]       → { "type": "object", "class": "ArrayBuffer", "value": [1, 2] }
//! handle #3 (Adder)  → { "type": "object", "class": "Adder", "chain": ["Adder", "Object"], "handle": 3 }
//! method add/2       → { "type": "function", "length": 2 }
//! ```

use serde::{Deserialize, Serialize};

use crate::{HandleResolver, Value};

/// Wire shape of a described value.
///
/// Absent fields are omitted from the JSON entirely. `value` is present
/// (possibly `null`) for every non-function, non-handle value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,

    /// Declared argument count, for functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumerable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writable: Option<bool>,
}

impl Descriptor {
    /// Describes a value.
    pub fn of(value: &Value, resolver: &dyn HandleResolver) -> Self {
        let kind = value.type_name().to_string();
        match value {
            Value::Bytes(bytes) => Self {
                kind,
                class: Some("ArrayBuffer".into()),
                value: Some(serde_json::Value::from(bytes.clone())),
                ..Self::default()
            },
            Value::List(_) => Self {
                kind,
                class: Some("Array".into()),
                chain: Some(vec!["Array".into(), "Object".into()]),
                value: Some(value.to_wire(resolver)),
                ..Self::default()
            },
            Value::Map(_) => Self {
                kind,
                class: Some("Object".into()),
                chain: Some(vec!["Object".into()]),
                value: Some(value.to_wire(resolver)),
                ..Self::default()
            },
            Value::Handle(id) => {
                let chain = resolver
                    .class_chain(*id)
                    .unwrap_or_else(|| vec!["Object".into()]);
                Self {
                    kind,
                    class: chain.first().cloned(),
                    chain: Some(chain),
                    handle: Some(id.0),
                    ..Self::default()
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Self {
                    kind,
                    value: Some(value.to_wire(resolver)),
                    ..Self::default()
                }
            }
        }
    }

    /// Describes a member name, as used for listing keys.
    pub fn key(name: &str) -> Self {
        Self {
            kind: "string".into(),
            value: Some(serde_json::Value::String(name.to_string())),
            ..Self::default()
        }
    }

    /// Describes a method taking `arity` arguments.
    pub fn function(arity: usize) -> Self {
        Self {
            kind: "function".into(),
            length: Some(arity),
            ..Self::default()
        }
    }

    /// Records member flags that differ from the listing's defaults.
    ///
    /// Properties are listed against `(enumerable, writable) = (true, true)`,
    /// so only the unusual flags show up on the wire.
    pub fn with_flags(
        mut self,
        (enumerable, writable): (bool, bool),
        (default_enumerable, default_writable): (bool, bool),
    ) -> Self {
        if enumerable != default_enumerable {
            self.enumerable = Some(enumerable);
        }
        if writable != default_writable {
            self.writable = Some(writable);
        }
        self
    }

    /// Converts the descriptor into its wire value.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("type".into(), serde_json::Value::String(self.kind.clone()));
        if let Some(class) = &self.class {
            object.insert("class".into(), serde_json::Value::String(class.clone()));
        }
        if let Some(chain) = &self.chain {
            object.insert("chain".into(), serde_json::Value::from(chain.clone()));
        }
        if let Some(value) = &self.value {
            object.insert("value".into(), value.clone());
        }
        if let Some(handle) = self.handle {
            object.insert("handle".into(), serde_json::Value::from(handle));
        }
        if let Some(length) = self.length {
            object.insert("length".into(), serde_json::Value::from(length));
        }
        if let Some(enumerable) = self.enumerable {
            object.insert("enumerable".into(), serde_json::Value::Bool(enumerable));
        }
        if let Some(writable) = self.writable {
            object.insert("writable".into(), serde_json::Value::Bool(writable));
        }
        serde_json::Value::Object(object)
    }
}
