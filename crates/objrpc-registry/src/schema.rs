//! Class schemas: the explicit member tables of exposed types.
//!
//! Nothing is discovered by poking at live objects. Each exposed Rust type
//! gets a [`ClassSchema`] built once, at registration time, with a
//! [`ClassBuilder`]: its constructor, its methods (with their arity) and
//! its properties (with getters, optional setters, and an enumerable flag).
//!
//! A schema is a stack of *levels*, most derived first. A class that
//! [`extends`](ClassBuilder::extends) another one gets its own level on
//! top of all of the parent's levels; lookups walk the levels in order, so
//! an own member shadows an inherited one with the same name.
//!
//! ```text
//! ScientificCalculator   own level   [sqrt, pow]      [precision]
//! Calculator             level 1     [add, sub, ...]  [memory, ops]
//! ```
//!
//! # Example
//!
//! ```rust
//! use objrpc_registry::{Args, ClassBuilder};
//!
//! struct Adder { total: f64 }
//!
//! let schema = ClassBuilder::<Adder>::new("Adder")
//!     .constructor(|_args| Ok(Adder { total: 0.0 }))
//!     .method("add", 2, |_this, args| Ok(args.f64(0)? + args.f64(1)?))
//!     .property("total", |this| this.total)
//!     .build();
//!
//! assert_eq!(schema.name(), "Adder");
//! assert!(schema.find_method("add").is_some());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;

use objrpc_protocol::Value;
use parking_lot::Mutex;

/// A live exposed object.
///
/// Behind a mutex so a singleton can be shared by every connection's
/// registry; the reactor is the only task that ever locks it.
pub type Instance = Arc<Mutex<dyn Any + Send>>;

/// A method result that is not known yet.
pub type Deferred = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// What a method invocation produced.
pub enum Reply {
    /// The value is available now.
    Ready(Value),
    /// The value settles later; the response is sent when it does.
    Deferred(Deferred),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

type Constructor = Box<dyn Fn(&Args) -> Result<Instance, String> + Send + Sync>;
type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send), &Args) -> Result<Reply, String> + Send + Sync>;
type Getter = Arc<dyn Fn(&mut (dyn Any + Send)) -> Result<Value, String> + Send + Sync>;
type Setter =
    Arc<dyn Fn(&mut (dyn Any + Send), Value) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

/// Positional arguments of a constructor or method call.
///
/// The typed accessors fail with a message naming the argument, which is
/// sent back to the caller as the error of the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns argument `index`, if given.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Returns argument `index`, or `Null` when it was not given.
    pub fn value(&self, index: usize) -> Value {
        self.0.get(index).cloned().unwrap_or_default()
    }

    pub fn f64(&self, index: usize) -> Result<f64, String> {
        self.typed(index, "a number", Value::as_f64)
    }

    pub fn i64(&self, index: usize) -> Result<i64, String> {
        self.typed(index, "an integer", Value::as_i64)
    }

    /// Like [`f64`](Self::f64), but a missing or `null` argument yields
    /// `default`. Any other non-number is still an error.
    pub fn f64_or(&self, index: usize, default: f64) -> Result<f64, String> {
        if self.is_absent(index) {
            return Ok(default);
        }
        self.f64(index)
    }

    /// Like [`i64`](Self::i64), with a default for a missing argument.
    pub fn i64_or(&self, index: usize, default: i64) -> Result<i64, String> {
        if self.is_absent(index) {
            return Ok(default);
        }
        self.i64(index)
    }

    fn is_absent(&self, index: usize) -> bool {
        self.0.get(index).is_none_or(Value::is_null)
    }

    pub fn bool(&self, index: usize) -> Result<bool, String> {
        self.typed(index, "a boolean", Value::as_bool)
    }

    pub fn str(&self, index: usize) -> Result<&str, String> {
        self.typed(index, "a string", Value::as_str)
    }

    pub fn bytes(&self, index: usize) -> Result<&[u8], String> {
        self.typed(index, "bytes", Value::as_bytes)
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    fn typed<'a, R>(
        &'a self,
        index: usize,
        expected: &str,
        read: impl FnOnce(&'a Value) -> Option<R>,
    ) -> Result<R, String> {
        match self.0.get(index) {
            Some(value) => read(value).ok_or_else(|| {
                format!(
                    "argument {index} must be {expected}, got {}",
                    value.type_name()
                )
            }),
            None => Err(format!("argument {index} must be {expected}, got nothing")),
        }
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Runs user code, turning a panic into the call's error.
fn guarded<R>(what: &str, name: &str, f: impl FnOnce() -> Result<R, String>) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let detail = panic_message(payload.as_ref());
        tracing::error!(member = name, detail, "{what} panicked");
        Err(format!("{what} '{name}' panicked: {detail}"))
    })
}

/// The message a panic was raised with, when it has one.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// A callable member.
#[derive(Clone)]
pub struct Method {
    name: String,
    arity: usize,
    call: MethodFn,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared arguments.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Runs the method against a locked instance.
    pub fn invoke(&self, this: &mut (dyn Any + Send), args: &Args) -> Result<Reply, String> {
        guarded("method", &self.name, || (self.call)(this, args))
    }
}

/// A data member.
#[derive(Clone)]
pub struct Property {
    name: String,
    enumerable: bool,
    get: Getter,
    set: Option<Setter>,
}

impl Property {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the property shows up in enumerable key listings.
    pub fn is_enumerable(&self) -> bool {
        self.enumerable
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    /// Reads the current value.
    pub fn read(&self, this: &mut (dyn Any + Send)) -> Result<Value, String> {
        guarded("getter", &self.name, || (self.get)(this))
    }

    /// Writes a new value. Returns `Ok(false)` when there is no setter.
    pub fn write(&self, this: &mut (dyn Any + Send), value: Value) -> Result<bool, String> {
        match &self.set {
            Some(set) => guarded("setter", &self.name, || set(this, value)).map(|()| true),
            None => Ok(false),
        }
    }
}

/// The members one class in a hierarchy declares itself.
#[derive(Clone)]
pub struct Level {
    class: String,
    methods: Vec<Method>,
    properties: Vec<Property>,
}

impl Level {
    fn new(class: String) -> Self {
        Self {
            class,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Name of the class that declared these members.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Every member name: properties first, then methods.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .map(Property::name)
            .chain(self.methods.iter().map(Method::name))
    }
}

// ---------------------------------------------------------------------------
// ClassSchema
// ---------------------------------------------------------------------------

/// The complete, immutable description of an exposed class.
pub struct ClassSchema {
    name: String,
    type_id: TypeId,
    constructor: Option<Constructor>,
    levels: Vec<Level>,
}

impl fmt::Debug for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSchema")
            .field("name", &self.name)
            .field("chain", &self.chain())
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

impl ClassSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `new` can create instances of this class.
    pub fn is_constructible(&self) -> bool {
        self.constructor.is_some()
    }

    /// `true` if values of type `T` are what this schema operates on.
    pub fn accepts<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Levels from the class itself up to its root ancestor.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Class names from most derived to `Object`.
    pub fn chain(&self) -> Vec<String> {
        self.levels
            .iter()
            .map(|level| level.class.clone())
            .chain(std::iter::once("Object".to_string()))
            .collect()
    }

    /// Builds a new instance. `None` if the class has no constructor.
    pub fn construct(&self, args: &Args) -> Option<Result<Instance, String>> {
        self.constructor
            .as_ref()
            .map(|construct| guarded("constructor", &self.name, || construct(args)))
    }

    /// Finds a method, most derived level first.
    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.levels
            .iter()
            .find_map(|level| level.methods.iter().find(|m| m.name == name))
    }

    /// Finds a property, most derived level first.
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.levels
            .iter()
            .find_map(|level| level.properties.iter().find(|p| p.name == name))
    }

    /// Member names across the whole hierarchy, first occurrence wins.
    ///
    /// With `enumerable_only` this is just the enumerable properties;
    /// otherwise every property and method.
    pub fn keys(&self, enumerable_only: bool) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for level in &self.levels {
            let names: Vec<&str> = if enumerable_only {
                level
                    .properties
                    .iter()
                    .filter(|p| p.enumerable)
                    .map(Property::name)
                    .collect()
            } else {
                level.names().collect()
            };
            for name in names {
                if !keys.iter().any(|k| k == name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys
    }

    /// Member names declared by the class itself.
    pub fn own_names(&self) -> Vec<String> {
        self.levels
            .first()
            .map(|level| level.names().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ClassBuilder
// ---------------------------------------------------------------------------

/// Builds the [`ClassSchema`] of a Rust type `T`.
pub struct ClassBuilder<T> {
    name: String,
    constructor: Option<Constructor>,
    own: Level,
    inherited: Vec<Level>,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any + Send> ClassBuilder<T> {
    /// Starts a schema for class `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            own: Level::new(name.clone()),
            name,
            constructor: None,
            inherited: Vec::new(),
            _type: PhantomData,
        }
    }

    /// Sets the function `new` uses to build instances.
    pub fn constructor<F>(mut self, construct: F) -> Self
    where
        F: Fn(&Args) -> Result<T, String> + Send + Sync + 'static,
    {
        self.constructor = Some(Box::new(move |args: &Args| {
            let value = construct(args)?;
            let instance: Instance = Arc::new(Mutex::new(value));
            Ok(instance)
        }));
        self
    }

    /// Declares a method that answers immediately.
    pub fn method<F, R>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&mut T, &Args) -> Result<R, String> + Send + Sync + 'static,
        R: Into<Value>,
    {
        let class = self.name.clone();
        self.own.methods.push(Method {
            name: name.to_string(),
            arity,
            call: Arc::new(move |this: &mut (dyn Any + Send), args: &Args| {
                let this = downcast::<T>(this, &class)?;
                f(this, args).map(|result| Reply::Ready(result.into()))
            }),
        });
        self
    }

    /// Declares a method whose result settles later.
    ///
    /// The closure runs synchronously with the instance locked and returns
    /// a `'static` future; anything the future needs must be moved into it.
    pub fn deferred<F, Fut>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&mut T, &Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let class = self.name.clone();
        self.own.methods.push(Method {
            name: name.to_string(),
            arity,
            call: Arc::new(move |this: &mut (dyn Any + Send), args: &Args| {
                let this = downcast::<T>(this, &class)?;
                let future: Deferred = Box::pin(f(this, args));
                Ok(Reply::Deferred(future))
            }),
        });
        self
    }

    /// Declares a read-only, enumerable property.
    pub fn property<G, R>(self, name: &str, get: G) -> Self
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.push_property(name, true, get, None)
    }

    /// Declares a read-only property left out of enumerable listings.
    pub fn hidden_property<G, R>(self, name: &str, get: G) -> Self
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.push_property(name, false, get, None)
    }

    /// Declares an enumerable property with a setter.
    pub fn writable_property<G, S, R>(self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<(), String> + Send + Sync + 'static,
        R: Into<Value>,
    {
        let class = self.name.clone();
        let setter: Setter = Arc::new(move |this: &mut (dyn Any + Send), value: Value| {
            let this = downcast::<T>(this, &class)?;
            set(this, value)
        });
        self.push_property(name, true, get, Some(setter))
    }

    /// Inherits every level of `parent`.
    ///
    /// `project` gives the parent's view of a `T`, typically a field that
    /// embeds the parent type. Inherited members are called through it.
    pub fn extends<P: Any + Send>(
        mut self,
        parent: &ClassSchema,
        project: fn(&mut T) -> &mut P,
    ) -> Self {
        for level in &parent.levels {
            let mut inherited = Level::new(level.class.clone());
            for method in &level.methods {
                let inner = method.call.clone();
                let class = self.name.clone();
                inherited.methods.push(Method {
                    name: method.name.clone(),
                    arity: method.arity,
                    call: Arc::new(move |this: &mut (dyn Any + Send), args: &Args| {
                        let this = downcast::<T>(this, &class)?;
                        let part: &mut (dyn Any + Send) = project(this);
                        inner(part, args)
                    }),
                });
            }
            for property in &level.properties {
                let class = self.name.clone();
                let get = property.get.clone();
                let set = property.set.clone().map(|set| {
                    let class = class.clone();
                    let setter: Setter = Arc::new(move |this: &mut (dyn Any + Send), value: Value| {
                        let this = downcast::<T>(this, &class)?;
                        let part: &mut (dyn Any + Send) = project(this);
                        set(part, value)
                    });
                    setter
                });
                inherited.properties.push(Property {
                    name: property.name.clone(),
                    enumerable: property.enumerable,
                    get: Arc::new(move |this: &mut (dyn Any + Send)| {
                        let this = downcast::<T>(this, &class)?;
                        let part: &mut (dyn Any + Send) = project(this);
                        get(part)
                    }),
                    set,
                });
            }
            self.inherited.push(inherited);
        }
        self
    }

    /// Finishes the schema.
    pub fn build(self) -> Arc<ClassSchema> {
        let mut levels = Vec::with_capacity(self.inherited.len() + 1);
        levels.push(self.own);
        levels.extend(self.inherited);
        Arc::new(ClassSchema {
            name: self.name,
            type_id: TypeId::of::<T>(),
            constructor: self.constructor,
            levels,
        })
    }

    fn push_property<G, R>(
        mut self,
        name: &str,
        enumerable: bool,
        get: G,
        set: Option<Setter>,
    ) -> Self
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        let class = self.name.clone();
        self.own.properties.push(Property {
            name: name.to_string(),
            enumerable,
            get: Arc::new(move |this: &mut (dyn Any + Send)| {
                let this = downcast::<T>(this, &class)?;
                Ok(get(this).into())
            }),
            set,
        });
        self
    }
}

fn downcast<'a, T: Any>(
    this: &'a mut (dyn Any + Send),
    class: &str,
) -> Result<&'a mut T, String> {
    this.downcast_mut::<T>()
        .ok_or_else(|| format!("instance is not a {class}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        count: i64,
        label: String,
    }

    struct Stopwatch {
        counter: Counter,
        running: bool,
    }

    fn counter_schema() -> Arc<ClassSchema> {
        ClassBuilder::<Counter>::new("Counter")
            .constructor(|args| {
                Ok(Counter {
                    count: args.get(0).and_then(Value::as_i64).unwrap_or(0),
                    label: "counter".into(),
                })
            })
            .method("increment", 0, |this, _| {
                this.count += 1;
                Ok(this.count)
            })
            .method("describe", 0, |this, _| Ok(this.label.clone()))
            .writable_property(
                "count",
                |this| this.count,
                |this, value| {
                    this.count = value.as_i64().ok_or("count must be an integer")?;
                    Ok(())
                },
            )
            .hidden_property("label", |this| this.label.clone())
            .build()
    }

    fn stopwatch_schema() -> Arc<ClassSchema> {
        ClassBuilder::<Stopwatch>::new("Stopwatch")
            .constructor(|_| {
                Ok(Stopwatch {
                    counter: Counter {
                        count: 0,
                        label: "stopwatch".into(),
                    },
                    running: false,
                })
            })
            .method("start", 0, |this, _| {
                this.running = true;
                Ok(Value::Null)
            })
            .method("describe", 0, |_, _| Ok("a stopwatch"))
            .property("running", |this| this.running)
            .extends(&counter_schema(), |this| &mut this.counter)
            .build()
    }

    fn construct(schema: &ClassSchema, args: Vec<Value>) -> Instance {
        schema.construct(&Args::new(args)).unwrap().unwrap()
    }

    fn call(schema: &ClassSchema, instance: &Instance, name: &str) -> Value {
        let method = schema.find_method(name).unwrap();
        match method.invoke(&mut *instance.lock(), &Args::default()).unwrap() {
            Reply::Ready(value) => value,
            Reply::Deferred(_) => panic!("expected an immediate reply"),
        }
    }

    #[test]
    fn test_args_typed_accessors() {
        let args = Args::new(vec![Value::from(2), Value::from("x")]);
        assert_eq!(args.f64(0), Ok(2.0));
        assert_eq!(args.str(1), Ok("x"));
        assert_eq!(
            args.f64(1),
            Err("argument 1 must be a number, got string".to_string())
        );
        assert_eq!(
            args.bool(5),
            Err("argument 5 must be a boolean, got nothing".to_string())
        );
        assert_eq!(args.value(9), Value::Null);
    }

    #[test]
    fn test_construct_and_call() {
        let schema = counter_schema();
        let instance = construct(&schema, vec![Value::from(10)]);
        assert_eq!(call(&schema, &instance, "increment"), Value::from(11));
        assert_eq!(call(&schema, &instance, "increment"), Value::from(12));
    }

    #[test]
    fn test_property_read_and_write() {
        let schema = counter_schema();
        let instance = construct(&schema, vec![]);
        let count = schema.find_property("count").unwrap();
        assert!(count.is_writable());

        let written = count.write(&mut *instance.lock(), Value::from(7)).unwrap();
        assert!(written);
        assert_eq!(count.read(&mut *instance.lock()), Ok(Value::from(7)));

        let err = count.write(&mut *instance.lock(), Value::from("seven"));
        assert_eq!(err, Err("count must be an integer".to_string()));
    }

    #[test]
    fn test_read_only_property_refuses_write() {
        let schema = counter_schema();
        let instance = construct(&schema, vec![]);
        let label = schema.find_property("label").unwrap();
        assert!(!label.is_writable());
        assert_eq!(label.write(&mut *instance.lock(), Value::Null), Ok(false));
    }

    #[test]
    fn test_keys_enumerable_and_all() {
        let schema = counter_schema();
        assert_eq!(schema.keys(true), vec!["count"]);
        assert_eq!(
            schema.keys(false),
            vec!["count", "label", "increment", "describe"]
        );
        assert_eq!(schema.own_names(), schema.keys(false));
    }

    #[test]
    fn test_extends_builds_chain_and_inherits_members() {
        let schema = stopwatch_schema();
        assert_eq!(schema.chain(), vec!["Stopwatch", "Counter", "Object"]);
        assert_eq!(schema.levels().len(), 2);

        let instance = construct(&schema, vec![]);
        assert_eq!(call(&schema, &instance, "increment"), Value::from(1));
        assert_eq!(call(&schema, &instance, "start"), Value::Null);

        let running = schema.find_property("running").unwrap();
        assert_eq!(running.read(&mut *instance.lock()), Ok(Value::Bool(true)));
        let count = schema.find_property("count").unwrap();
        assert_eq!(count.read(&mut *instance.lock()), Ok(Value::from(1)));
    }

    #[test]
    fn test_own_member_shadows_inherited() {
        let schema = stopwatch_schema();
        let instance = construct(&schema, vec![]);
        assert_eq!(call(&schema, &instance, "describe"), Value::from("a stopwatch"));

        let keys = schema.keys(false);
        assert_eq!(keys.iter().filter(|k| *k == "describe").count(), 1);
        assert_eq!(schema.own_names(), vec!["running", "start", "describe"]);
    }

    #[test]
    fn test_schema_without_constructor() {
        let schema = ClassBuilder::<Counter>::new("Fixed").build();
        assert!(!schema.is_constructible());
        assert!(schema.construct(&Args::default()).is_none());
        assert!(schema.accepts::<Counter>());
        assert!(!schema.accepts::<Stopwatch>());
    }

    #[test]
    fn test_wrong_instance_type_is_an_error() {
        let schema = counter_schema();
        let other: Instance = Arc::new(Mutex::new(5u8));
        let method = schema.find_method("increment").unwrap();
        let result = method.invoke(&mut *other.lock(), &Args::default());
        assert_eq!(result.unwrap_err(), "instance is not a Counter");
    }

    #[tokio::test]
    async fn test_deferred_method_settles() {
        let schema = ClassBuilder::<Counter>::new("Slow")
            .deferred("later", 1, |this, args| {
                let base = this.count;
                let add = args.i64(0);
                async move {
                    let add = add?;
                    Ok::<Value, String>(Value::from(base + add))
                }
            })
            .build();
        let instance: Instance = Arc::new(Mutex::new(Counter {
            count: 40,
            label: String::new(),
        }));

        let method = schema.find_method("later").unwrap();
        let reply = method
            .invoke(&mut *instance.lock(), &Args::new(vec![Value::from(2)]))
            .unwrap();
        match reply {
            Reply::Deferred(future) => assert_eq!(future.await, Ok(Value::from(42))),
            Reply::Ready(_) => panic!("expected a deferred reply"),
        }
    }

    #[test]
    fn test_optional_arguments() {
        let args = Args::new(vec![Value::Null, Value::from("x"), Value::from(7)]);
        assert_eq!(args.f64_or(0, 1.5), Ok(1.5));
        assert_eq!(args.f64_or(5, 2.0), Ok(2.0));
        assert_eq!(
            args.f64_or(1, 0.0),
            Err("argument 1 must be a number, got string".to_string())
        );
        assert_eq!(args.i64_or(2, 0), Ok(7));
        assert_eq!(args.i64_or(3, 100), Ok(100));
    }

    #[test]
    fn test_panicking_members_fail_only_their_call() {
        let schema = ClassBuilder::<Counter>::new("Fragile")
            .constructor(|args| {
                if args.get(0).is_some() {
                    panic!("no arguments please");
                }
                Ok(Counter {
                    count: 0,
                    label: String::new(),
                })
            })
            .method("boom", 0, |_, _| -> Result<Value, String> { panic!("kaboom") })
            .property("count", |this| this.count)
            .writable_property(
                "label",
                |this| this.label.clone(),
                |_, _| panic!("{}", String::from("setter exploded")),
            )
            .build();

        assert_eq!(
            schema.construct(&Args::new(vec![Value::Null])).unwrap().err(),
            Some("constructor 'Fragile' panicked: no arguments please".to_string())
        );

        let instance = construct(&schema, vec![]);
        let boom = schema.find_method("boom").unwrap();
        assert_eq!(
            boom.invoke(&mut *instance.lock(), &Args::default()).err(),
            Some("method 'boom' panicked: kaboom".to_string())
        );
        let label = schema.find_property("label").unwrap();
        assert_eq!(
            label.write(&mut *instance.lock(), Value::from("x")),
            Err("setter 'label' panicked: setter exploded".to_string())
        );

        // The instance is still usable afterwards.
        let count = schema.find_property("count").unwrap();
        assert_eq!(count.read(&mut *instance.lock()), Ok(Value::from(0i64)));
    }
}
