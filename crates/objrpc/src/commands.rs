//! The commands a server connection understands.
//!
//! Each command is a plain function from the connection and the request to
//! an [`Answer`]. Failures are strings because they go straight into the
//! `error` field of the response.
//!
//! | command      | params                                        |
//! |--------------|-----------------------------------------------|
//! | `new`        | `class` (or `name`), `args`                   |
//! | `list`       |                                               |
//! | `objects`    |                                               |
//! | `delete`     | `id`                                          |
//! | `call`       | `id`, `method`, `args`                        |
//! | `keys`       | `id`, `enumerable`                            |
//! | `names`      | `id`                                          |
//! | `symbols`    | `id`                                          |
//! | `properties` | `id`, `depth`, `keyDescriptor`, `valueDescriptor` |
//! | `methods`    | `id`, `depth`, `keyDescriptor`, `valueDescriptor` |
//! | `get`        | `id`, `property`                              |
//! | `set`        | `id`, `property`, `value`                     |

use std::collections::{BTreeMap, HashSet};

use objrpc_protocol::{Descriptor, ObjectId, Request, Value};
use objrpc_registry::{Args, Deferred, Entry, Level, Reply};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::ServerConnection;

/// What a command produced.
pub enum Answer {
    /// Success with this result.
    Value(serde_json::Value),
    /// Success without a result.
    Empty,
    /// The result arrives later.
    Deferred(Deferred),
}

impl std::fmt::Debug for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Signature every command implements.
pub type CommandFn = fn(&mut ServerConnection, &Request) -> Result<Answer, String>;

/// Commands by name.
#[derive(Clone)]
pub struct CommandTable {
    commands: BTreeMap<&'static str, CommandFn>,
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl CommandTable {
    /// The built-in command set.
    pub fn standard() -> Self {
        let mut commands: BTreeMap<&'static str, CommandFn> = BTreeMap::new();
        commands.insert("new", new);
        commands.insert("list", list);
        commands.insert("objects", objects);
        commands.insert("delete", delete);
        commands.insert("call", call);
        commands.insert("keys", keys);
        commands.insert("names", names);
        commands.insert("symbols", symbols);
        commands.insert("properties", properties);
        commands.insert("methods", methods);
        commands.insert("get", get);
        commands.insert("set", set);
        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<CommandFn> {
        self.commands.get(name).copied()
    }

    /// Command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(request: &Request) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::Object(request.params.clone()))
        .map_err(|e| format!("Invalid parameters for '{}': {e}", request.command))
}

fn args(values: Vec<serde_json::Value>) -> Args {
    Args::new(values.into_iter().map(Value::from_wire).collect())
}

#[derive(Deserialize)]
struct Target {
    id: ObjectId,
}

#[derive(Deserialize)]
struct NewParams {
    #[serde(alias = "name")]
    class: String,
    #[serde(default)]
    args: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct CallParams {
    method: String,
    #[serde(default)]
    args: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct KeysParams {
    #[serde(default = "yes")]
    enumerable: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberParams {
    #[serde(default)]
    depth: Option<usize>,
    #[serde(default = "yes")]
    key_descriptor: bool,
    #[serde(default = "yes")]
    value_descriptor: bool,
}

#[derive(Deserialize)]
struct GetParams {
    property: String,
}

#[derive(Deserialize)]
struct SetParams {
    property: String,
    #[serde(default)]
    value: serde_json::Value,
}

fn yes() -> bool {
    true
}

/// Resolves the `id` of an object command.
fn target<'a>(conn: &'a ServerConnection, request: &Request) -> Result<&'a Entry, String> {
    let Target { id } = parse(request)?;
    conn.registry.get(id).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Class commands
// ---------------------------------------------------------------------------

fn new(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let params: NewParams = parse(request)?;
    let (schema, instance) = conn
        .context
        .classes
        .construct(&params.class, &args(params.args))
        .map_err(|e| e.to_string())?;
    let id = conn.registry.insert(params.class.clone(), schema, instance);
    Ok(Answer::Value(json!({ "id": id, "name": params.class })))
}

fn list(conn: &mut ServerConnection, _request: &Request) -> Result<Answer, String> {
    Ok(Answer::Value(json!(conn.context.classes.names())))
}

fn objects(conn: &mut ServerConnection, _request: &Request) -> Result<Answer, String> {
    let live: Vec<serde_json::Value> = conn
        .registry
        .iter()
        .map(|entry| json!({ "id": entry.id, "name": entry.name }))
        .collect();
    Ok(Answer::Value(serde_json::Value::Array(live)))
}

// ---------------------------------------------------------------------------
// Object commands
// ---------------------------------------------------------------------------

fn delete(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let Target { id } = parse(request)?;
    conn.registry.remove(id).map_err(|e| e.to_string())?;
    Ok(Answer::Empty)
}

fn call(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: CallParams = parse(request)?;
    match entry
        .call(&params.method, &args(params.args))
        .map_err(|e| e.to_string())?
    {
        Reply::Ready(value) => Ok(Answer::Value(value.to_wire(&conn.registry))),
        Reply::Deferred(future) => Ok(Answer::Deferred(future)),
    }
}

fn keys(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: KeysParams = parse(request)?;
    Ok(Answer::Value(json!(entry.schema.keys(params.enumerable))))
}

fn names(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    Ok(Answer::Value(json!(entry.schema.own_names())))
}

/// Schemas only declare plain names, so there are never any symbols.
fn symbols(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    target(conn, request)?;
    Ok(Answer::Value(json!([])))
}

fn get(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: GetParams = parse(request)?;
    let value = entry.get(&params.property).map_err(|e| e.to_string())?;
    Ok(Answer::Value(value.to_wire(&conn.registry)))
}

fn set(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: SetParams = parse(request)?;
    let assigned = entry
        .set(&params.property, Value::from_wire(params.value))
        .map_err(|e| e.to_string())?;
    Ok(Answer::Value(assigned.to_wire(&conn.registry)))
}

// ---------------------------------------------------------------------------
// Member listings
// ---------------------------------------------------------------------------

/// Levels a listing covers: `0..=depth`, or all of them.
fn levels(entry: &Entry, depth: Option<usize>) -> &[Level] {
    let all = entry.schema.levels();
    match depth {
        Some(depth) => &all[..all.len().min(depth.saturating_add(1))],
        None => all,
    }
}

fn key(name: &str, descriptor: bool) -> serde_json::Value {
    if descriptor {
        Descriptor::key(name).to_json()
    } else {
        serde_json::Value::String(name.to_string())
    }
}

fn properties(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: MemberParams = parse(request)?;
    let depth = params.depth.or(conn.context.config.member_depth);

    let mut seen = HashSet::new();
    let mut listed = Vec::new();
    let mut this = entry.instance.lock();
    for level in levels(entry, depth) {
        for property in level.properties() {
            if !seen.insert(property.name()) {
                continue;
            }
            let value = property.read(&mut *this)?;
            let value = if params.value_descriptor {
                Descriptor::of(&value, &conn.registry)
                    .with_flags(
                        (property.is_enumerable(), property.is_writable()),
                        (true, true),
                    )
                    .to_json()
            } else {
                value.to_wire(&conn.registry)
            };
            listed.push(json!([key(property.name(), params.key_descriptor), value]));
        }
    }
    Ok(Answer::Value(serde_json::Value::Array(listed)))
}

fn methods(conn: &mut ServerConnection, request: &Request) -> Result<Answer, String> {
    let entry = target(conn, request)?;
    let params: MemberParams = parse(request)?;
    let depth = params.depth.or(conn.context.config.member_depth);

    let mut seen = HashSet::new();
    let mut listed = Vec::new();
    for level in levels(entry, depth) {
        for method in level.methods() {
            if !seen.insert(method.name()) {
                continue;
            }
            let value = if params.value_descriptor {
                Descriptor::function(method.arity()).to_json()
            } else {
                json!(format!("function {}() {{ [native code] }}", method.name()))
            };
            listed.push(json!([key(method.name(), params.key_descriptor), value]));
        }
    }
    Ok(Answer::Value(serde_json::Value::Array(listed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use objrpc_registry::{ClassBuilder, ClassSchema, ClassTable};
    use serde_json::Map;

    use crate::{ConnectionConfig, ServerContext};

    struct Shape {
        sides: u32,
    }

    struct Square {
        shape: Shape,
        size: f64,
    }

    fn shape() -> Arc<ClassSchema> {
        ClassBuilder::<Shape>::new("Shape")
            .property("sides", |this| this.sides)
            .hidden_property("secret", |_| "hidden")
            .method("describe", 0, |this, _| Ok(format!("{} sides", this.sides)))
            .build()
    }

    fn square() -> Arc<ClassSchema> {
        ClassBuilder::<Square>::new("Square")
            .constructor(|args| {
                Ok(Square {
                    shape: Shape { sides: 4 },
                    size: args.f64(0).unwrap_or(1.0),
                })
            })
            .writable_property(
                "size",
                |this| this.size,
                |this, value| {
                    this.size = value.as_f64().ok_or("size must be a number")?;
                    Ok(())
                },
            )
            .method("area", 0, |this, _| Ok(this.size * this.size))
            .method("describe", 0, |this, _| Ok(format!("square of {}", this.size)))
            .extends(&shape(), |this| &mut this.shape)
            .build()
    }

    fn connection() -> ServerConnection {
        let mut classes = ClassTable::new();
        classes.register(square()).unwrap();
        let context = ServerContext::new(classes, ConnectionConfig::default());
        ServerConnection::new(Arc::new(context))
    }

    fn request(command: &str, params: serde_json::Value) -> Request {
        let params: Map<String, serde_json::Value> = match params {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        Request::new(command, params)
    }

    fn run(conn: &mut ServerConnection, command: &str, params: serde_json::Value) -> Result<serde_json::Value, String> {
        let handler = CommandTable::standard().get(command).unwrap();
        match handler(conn, &request(command, params))? {
            Answer::Value(value) => Ok(value),
            Answer::Empty => Ok(serde_json::Value::Null),
            Answer::Deferred(_) => panic!("unexpected deferred answer"),
        }
    }

    fn with_square() -> ServerConnection {
        let mut conn = connection();
        run(&mut conn, "new", json!({"class": "Square", "args": [3]})).unwrap();
        conn
    }

    #[test]
    fn test_standard_table_names() {
        let names: Vec<_> = CommandTable::standard().names().collect();
        assert_eq!(
            names,
            vec![
                "call", "delete", "get", "keys", "list", "methods", "names", "new", "objects",
                "properties", "set", "symbols"
            ]
        );
    }

    #[test]
    fn test_new_accepts_name_alias() {
        let mut conn = connection();
        let result = run(&mut conn, "new", json!({"name": "Square"})).unwrap();
        assert_eq!(result, json!({"id": 1, "name": "Square"}));
    }

    #[test]
    fn test_new_without_class_is_invalid() {
        let mut conn = connection();
        let err = run(&mut conn, "new", json!({})).unwrap_err();
        assert!(err.starts_with("Invalid parameters for 'new': "), "{err}");
    }

    #[test]
    fn test_object_commands_resolve_id_first() {
        let mut conn = connection();
        let err = run(&mut conn, "get", json!({"id": 9})).unwrap_err();
        assert_eq!(err, "No such object #9");
    }

    #[test]
    fn test_keys_walks_chain() {
        let mut conn = with_square();
        assert_eq!(
            run(&mut conn, "keys", json!({"id": 1})).unwrap(),
            json!(["size", "sides"])
        );
        assert_eq!(
            run(&mut conn, "keys", json!({"id": 1, "enumerable": false})).unwrap(),
            json!(["size", "area", "describe", "sides", "secret"])
        );
    }

    #[test]
    fn test_names_and_symbols() {
        let mut conn = with_square();
        assert_eq!(
            run(&mut conn, "names", json!({"id": 1})).unwrap(),
            json!(["size", "area", "describe"])
        );
        assert_eq!(run(&mut conn, "symbols", json!({"id": 1})).unwrap(), json!([]));
    }

    #[test]
    fn test_properties_with_descriptors() {
        let mut conn = with_square();
        let listed = run(&mut conn, "properties", json!({"id": 1})).unwrap();
        assert_eq!(
            listed,
            json!([
                [{"type": "string", "value": "size"}, {"type": "number", "value": 3}],
                [{"type": "string", "value": "sides"}, {"type": "number", "value": 4, "writable": false}],
                [{"type": "string", "value": "secret"},
                 {"type": "string", "value": "hidden", "enumerable": false, "writable": false}],
            ])
        );
    }

    #[test]
    fn test_properties_plain_and_limited_depth() {
        let mut conn = with_square();
        let listed = run(
            &mut conn,
            "properties",
            json!({"id": 1, "depth": 0, "keyDescriptor": false, "valueDescriptor": false}),
        )
        .unwrap();
        assert_eq!(listed, json!([["size", 3]]));
    }

    #[test]
    fn test_methods_listing() {
        let mut conn = with_square();
        let listed = run(&mut conn, "methods", json!({"id": 1, "keyDescriptor": false})).unwrap();
        assert_eq!(
            listed,
            json!([
                ["area", {"type": "function", "length": 0}],
                ["describe", {"type": "function", "length": 0}],
            ])
        );

        let listed = run(
            &mut conn,
            "methods",
            json!({"id": 1, "depth": 0, "keyDescriptor": false, "valueDescriptor": false}),
        )
        .unwrap();
        assert_eq!(listed[0], json!(["area", "function area() { [native code] }"]));
    }

    #[test]
    fn test_inherited_method_and_override() {
        let mut conn = with_square();
        assert_eq!(
            run(&mut conn, "call", json!({"id": 1, "method": "describe"})).unwrap(),
            json!("square of 3")
        );
        assert_eq!(
            run(&mut conn, "get", json!({"id": 1, "property": "sides"})).unwrap(),
            json!(4)
        );
    }

    #[test]
    fn test_set_returns_assigned_value() {
        let mut conn = with_square();
        assert_eq!(
            run(&mut conn, "set", json!({"id": 1, "property": "size", "value": 5})).unwrap(),
            json!(5)
        );
        assert_eq!(
            run(&mut conn, "call", json!({"id": 1, "method": "area"})).unwrap(),
            json!(25)
        );
        assert_eq!(
            run(&mut conn, "set", json!({"id": 1, "property": "sides", "value": 5})).unwrap_err(),
            "Property is read-only on object #1: sides"
        );
    }

    #[test]
    fn test_objects_lists_live_entries() {
        let mut conn = with_square();
        run(&mut conn, "new", json!({"class": "Square"})).unwrap();
        run(&mut conn, "delete", json!({"id": 1})).unwrap();
        assert_eq!(
            run(&mut conn, "objects", json!({})).unwrap(),
            json!([{"id": 2, "name": "Square"}])
        );
    }
}
