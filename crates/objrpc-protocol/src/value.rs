//! Values an exposed object can receive or return.
//!
//! Only a closed set of shapes can cross the wire: null, boolean, number,
//! string, byte sequence, ordered list, ordered map, and an opaque handle
//! to an object living in the remote registry. Functions and other
//! non-portable things are not representable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::Descriptor;

/// Identifier of an object in one connection's registry.
///
/// Serialized as a plain number; displayed as `#N`, which is how error
/// messages refer to objects ("No such object #3").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A transmissible value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to a registered object.
    Handle(ObjectId),
}

impl Value {
    /// Builds a number, keeping integral values integral.
    ///
    /// `Value::number(5.0)` is sent as `5`, not `5.0`. Non-finite numbers
    /// have no JSON form and become `Null`.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
            return Value::Number(Number::from(n as i64));
        }
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }

    /// The JavaScript-style type tag used in descriptors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Null
            | Value::Bytes(_)
            | Value::List(_)
            | Value::Map(_)
            | Value::Handle(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<ObjectId> {
        match self {
            Value::Handle(id) => Some(*id),
            _ => None,
        }
    }

    /// Reads a value that arrived on the wire.
    ///
    /// Plain JSON maps onto the matching variant. Objects shaped like the
    /// descriptors this crate emits for bytes (`class: "ArrayBuffer"`) and
    /// handles (`handle: N`) are turned back into `Bytes` and `Handle`.
    pub fn from_wire(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_wire).collect())
            }
            serde_json::Value::Object(object) => {
                if let Some(value) = descriptor_value(&object) {
                    return value;
                }
                Value::Map(
                    object
                        .into_iter()
                        .map(|(key, value)| (key, Value::from_wire(value)))
                        .collect(),
                )
            }
        }
    }

    /// Converts the value to JSON for sending.
    ///
    /// Bytes and handles are not plain JSON; they are written as
    /// descriptors so the receiver can tell them apart. `resolver` supplies
    /// the class chain of handled objects.
    pub fn to_wire(&self, resolver: &dyn HandleResolver) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(|item| item.to_wire(resolver)).collect(),
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_wire(resolver)))
                    .collect(),
            ),
            Value::Bytes(_) | Value::Handle(_) => {
                Descriptor::of(self, resolver).to_json()
            }
        }
    }
}

/// Recognises the descriptor shapes for bytes and handles.
fn descriptor_value(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Option<Value> {
    if object.get("type")?.as_str()? != "object" {
        return None;
    }
    if let Some(handle) = object.get("handle") {
        return handle.as_u64().map(|id| Value::Handle(ObjectId(id)));
    }
    if object.get("class")?.as_str()? == "ArrayBuffer" {
        let bytes = object
            .get("value")?
            .as_array()?
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()?;
        return Some(Value::Bytes(bytes));
    }
    None
}

/// Looks up what a handle points at.
///
/// Implemented by the object registry; descriptors use it to name the
/// class of handled objects.
pub trait HandleResolver {
    /// Class names from most derived to the root, or `None` if the id is
    /// not registered.
    fn class_chain(&self, id: ObjectId) -> Option<Vec<String>>;
}

/// A resolver that knows no objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHandles;

impl HandleResolver for NoHandles {
    fn class_chain(&self, _id: ObjectId) -> Option<Vec<String>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n as u64))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Handle(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_wire(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct OneHandle;

    impl HandleResolver for OneHandle {
        fn class_chain(&self, id: ObjectId) -> Option<Vec<String>> {
            (id == ObjectId(1)).then(|| vec!["Adder".into(), "Object".into()])
        }
    }

    #[test]
    fn test_object_id_display_and_serde() {
        assert_eq!(ObjectId(3).to_string(), "#3");
        assert_eq!(serde_json::to_value(ObjectId(3)).unwrap(), json!(3));
    }

    #[test]
    fn test_number_keeps_integers_integral() {
        assert_eq!(Value::number(5.0).to_wire(&NoHandles), json!(5));
        assert_eq!(Value::number(-2.0).to_wire(&NoHandles), json!(-2));
        assert_eq!(Value::number(2.5).to_wire(&NoHandles), json!(2.5));
        assert_eq!(Value::number(f64::NAN), Value::Null);
    }

    #[test]
    fn test_number_beyond_i64_stays_a_float() {
        let big = 2f64.powi(63);
        let wire = Value::number(big).to_wire(&NoHandles);
        assert_ne!(wire, json!(i64::MAX));
        assert_eq!(wire.as_i64(), None);
        assert_eq!(wire.as_f64(), Some(big));

        // The lower bound is exactly representable.
        assert_eq!(Value::number(-big).to_wire(&NoHandles), json!(i64::MIN));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "object");
        assert_eq!(Value::from(true).type_name(), "boolean");
        assert_eq!(Value::from(1).type_name(), "number");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::Bytes(vec![]).type_name(), "object");
    }

    #[test]
    fn test_from_wire_plain_json() {
        let value = Value::from_wire(json!({"a": [1, "two", null], "b": true}));
        let map = value.as_map().unwrap();
        assert_eq!(
            map["a"],
            Value::List(vec![Value::from(1), Value::from("two"), Value::Null])
        );
        assert_eq!(map["b"], Value::Bool(true));
    }

    #[test]
    fn test_bytes_travel_as_array_buffer_descriptor() {
        let wire = Value::Bytes(vec![1, 2, 255]).to_wire(&NoHandles);
        assert_eq!(
            wire,
            json!({"type": "object", "class": "ArrayBuffer", "value": [1, 2, 255]})
        );
        assert_eq!(Value::from_wire(wire), Value::Bytes(vec![1, 2, 255]));
    }

    #[test]
    fn test_handle_travels_as_descriptor_with_chain() {
        let wire = Value::Handle(ObjectId(1)).to_wire(&OneHandle);
        assert_eq!(
            wire,
            json!({
                "type": "object",
                "class": "Adder",
                "chain": ["Adder", "Object"],
                "handle": 1
            })
        );
        assert_eq!(Value::from_wire(wire), Value::Handle(ObjectId(1)));
    }

    #[test]
    fn test_nested_handles_are_described() {
        let value = Value::List(vec![Value::from(1), Value::Handle(ObjectId(1))]);
        let wire = value.to_wire(&OneHandle);
        assert_eq!(wire[0], json!(1));
        assert_eq!(wire[1]["handle"], json!(1));
    }

    #[test]
    fn test_lookalike_objects_stay_maps() {
        let wire = json!({"type": "object", "class": "ArrayBuffer", "value": [300]});
        assert!(matches!(Value::from_wire(wire), Value::Map(_)));

        let wire = json!({"type": "string", "handle": 1});
        assert!(matches!(Value::from_wire(wire), Value::Map(_)));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
