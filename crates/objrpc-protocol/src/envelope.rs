//! Message envelopes: the shapes that travel on the wire.
//!
//! Every message is one JSON object, either a request or a response:
//!
//! ```text
//! request   { "command": "call", "seq": 2, "id": 1, "method": "add", "args": [2, 3] }
//! success   { "success": true,  "result": 5,            "seq": 2 }
//! failure   { "success": false, "error": "No such ...", "seq": 2 }
//! ```
//!
//! `seq` is chosen by the sender of a request and echoed verbatim in the
//! response. A request without `seq` is a notification: it is executed but
//! never answered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A command invocation.
///
/// Command parameters sit next to `command` and `seq` at the top level of
/// the object; `#[serde(flatten)]` collects them into `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Name of the command to run.
    pub command: String,

    /// Correlation number. `None` makes this a notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    /// Every other top-level field.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Request {
    /// Creates a request with no seq.
    pub fn new(command: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            seq: None,
            params,
        }
    }

    /// Sets the sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Returns `true` if nobody waits for an answer.
    pub fn is_notification(&self) -> bool {
        self.seq.is_none()
    }

    /// Converts the request into its wire value.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.params.len() + 2);
        object.insert("command".into(), Value::String(self.command.clone()));
        if let Some(seq) = self.seq {
            object.insert("seq".into(), Value::from(seq));
        }
        for (key, value) in &self.params {
            if key != "command" && key != "seq" {
                object.insert(key.clone(), value.clone());
            }
        }
        Value::Object(object)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// The answer to a request.
///
/// Exactly one of `result` / `error` is meaningful, depending on
/// `success`. A successful response may omit `result` (e.g. `delete`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl Response {
    /// A success carrying `result`.
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            seq: None,
        }
    }

    /// A success with no result at all.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
            seq: None,
        }
    }

    /// A failure carrying `message`.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
            seq: None,
        }
    }

    /// Copies the seq of the request being answered.
    pub fn with_seq(mut self, seq: Option<u64>) -> Self {
        self.seq = seq;
        self
    }

    /// Converts the response into its wire value.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(3);
        object.insert("success".into(), Value::Bool(self.success));
        if let Some(result) = &self.result {
            object.insert("result".into(), result.clone());
        }
        if let Some(error) = &self.error {
            object.insert("error".into(), Value::String(error.clone()));
        }
        if let Some(seq) = self.seq {
            object.insert("seq".into(), Value::from(seq));
        }
        Value::Object(object)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Either kind of message, as decided by its fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
}

impl Envelope {
    /// Classifies a decoded value.
    ///
    /// Objects with a `command` field are requests, objects with a
    /// `success` field are responses.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` for anything else, or when
    /// the fields have the wrong types.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(object) = &value else {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected an object, got {}",
                json_type(&value)
            )));
        };
        if object.contains_key("command") {
            serde_json::from_value(value)
                .map(Envelope::Request)
                .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
        } else if object.contains_key("success") {
            serde_json::from_value(value)
                .map(Envelope::Response)
                .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
        } else {
            Err(ProtocolError::InvalidMessage(
                "neither a request nor a response".into(),
            ))
        }
    }

    /// Returns the seq of either kind.
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::Request(request) => request.seq,
            Self::Response(response) => response.seq,
        }
    }

    /// Converts the envelope into its wire value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request(request) => request.to_value(),
            Self::Response(response) => response.to_value(),
        }
    }
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Reads the `seq` field of a raw message, if it is a non-negative integer.
///
/// Integral floats (`3.0`) count; anything else is treated as absent.
pub fn seq_of(value: &Value) -> Option<u64> {
    let seq = value.get("seq")?;
    seq.as_u64().or_else(|| {
        seq.as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// JSON type name, for error messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_params_are_flattened() {
        let request: Request = serde_json::from_value(json!({
            "command": "call", "seq": 2, "id": 1, "method": "add", "args": [2, 3]
        }))
        .unwrap();

        assert_eq!(request.command, "call");
        assert_eq!(request.seq, Some(2));
        assert_eq!(request.params["method"], "add");
        assert!(!request.params.contains_key("command"));
        assert!(!request.params.contains_key("seq"));
    }

    #[test]
    fn test_request_without_seq_is_notification() {
        let request: Request =
            serde_json::from_value(json!({"command": "list"})).unwrap();
        assert!(request.is_notification());
        assert_eq!(request.to_value(), json!({"command": "list"}));
    }

    #[test]
    fn test_request_to_value_puts_params_at_top_level() {
        let mut params = Map::new();
        params.insert("id".into(), json!(1));
        let value = Request::new("keys", params).with_seq(9).to_value();
        assert_eq!(value, json!({"command": "keys", "seq": 9, "id": 1}));
    }

    #[test]
    fn test_success_response_shape() {
        let value = Response::ok(json!({"id": 1, "name": "Adder"}))
            .with_seq(Some(1))
            .to_value();
        assert_eq!(
            value,
            json!({"success": true, "result": {"id": 1, "name": "Adder"}, "seq": 1})
        );
    }

    #[test]
    fn test_empty_success_has_no_result_key() {
        let value = Response::ok_empty().with_seq(Some(4)).to_value();
        assert_eq!(value, json!({"success": true, "seq": 4}));
    }

    #[test]
    fn test_null_result_is_kept() {
        let value = Response::ok(Value::Null).to_value();
        assert_eq!(value, json!({"success": true, "result": null}));
    }

    #[test]
    fn test_failure_response_shape() {
        let value = Response::err("No command specified").to_value();
        assert_eq!(
            value,
            json!({"success": false, "error": "No command specified"})
        );
    }

    #[test]
    fn test_serialize_matches_to_value() {
        let response = Response::err("boom").with_seq(Some(3));
        assert_eq!(serde_json::to_value(&response).unwrap(), response.to_value());
    }

    #[test]
    fn test_envelope_from_value_classifies() {
        let request = Envelope::from_value(json!({"command": "list", "seq": 1}));
        assert!(matches!(request, Ok(Envelope::Request(_))));

        let response = Envelope::from_value(json!({"success": true, "seq": 1}));
        assert!(matches!(response, Ok(Envelope::Response(_))));
        assert_eq!(response.unwrap().seq(), Some(1));
    }

    #[test]
    fn test_envelope_from_value_rejects_other_shapes() {
        assert!(matches!(
            Envelope::from_value(json!([1, 2])),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            Envelope::from_value(json!({"hello": "world"})),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            Envelope::from_value(json!({"command": 5})),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_seq_of() {
        assert_eq!(seq_of(&json!({"seq": 7})), Some(7));
        assert_eq!(seq_of(&json!({"seq": 7.0})), Some(7));
        assert_eq!(seq_of(&json!({"seq": 7.5})), None);
        assert_eq!(seq_of(&json!({"seq": "7"})), None);
        assert_eq!(seq_of(&json!({"seq": -1})), None);
        assert_eq!(seq_of(&json!({})), None);
    }

    #[test]
    fn test_seq_of_rejects_floats_past_u64() {
        assert_eq!(seq_of(&json!({"seq": 18446744073709551616.0})), None);
        assert_eq!(seq_of(&json!({"seq": u64::MAX})), Some(u64::MAX));
        assert_eq!(seq_of(&json!({"seq": 9007199254740992.0})), Some(9007199254740992));
    }
}
