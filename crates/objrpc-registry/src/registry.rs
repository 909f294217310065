//! The per-connection object registry.
//!
//! Every server connection owns one `ObjectRegistry`. It maps the ids the
//! remote peer uses to the live instances behind them. Ids come from a
//! counter that starts at 1 and only ever goes up, so an id is never
//! reused while the connection lives, not even after `delete`.
//!
//! # Concurrency note
//!
//! Like the rest of the engine state, the registry is a plain map owned by
//! the reactor task. The instances inside are behind mutexes only because
//! singletons are shared between connections.

use std::collections::BTreeMap;
use std::sync::Arc;

use objrpc_protocol::{HandleResolver, ObjectId, Value};

use crate::{Args, ClassSchema, ClassTable, Instance, RegistryError, Reply};

/// One registered object.
#[derive(Clone)]
pub struct Entry {
    pub id: ObjectId,
    /// Class name for constructed objects, registration name for singletons.
    pub name: String,
    pub schema: Arc<ClassSchema>,
    pub instance: Instance,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("class", &self.schema.name())
            .finish()
    }
}

impl Entry {
    /// Invokes `method`.
    ///
    /// # Errors
    /// - [`RegistryError::NoSuchMethod`] if the schema has no such method
    /// - [`RegistryError::Application`] if the method itself fails
    pub fn call(&self, method: &str, args: &Args) -> Result<Reply, RegistryError> {
        let found = self
            .schema
            .find_method(method)
            .ok_or_else(|| RegistryError::NoSuchMethod {
                id: self.id,
                method: method.to_string(),
            })?;
        let mut this = self.instance.lock();
        found
            .invoke(&mut *this, args)
            .map_err(RegistryError::Application)
    }

    /// Reads `property`.
    ///
    /// # Errors
    /// - [`RegistryError::NoSuchProperty`] for unknown names and methods
    /// - [`RegistryError::Application`] if the getter fails
    pub fn get(&self, property: &str) -> Result<Value, RegistryError> {
        let found = self.property(property)?;
        let mut this = self.instance.lock();
        found.read(&mut *this).map_err(RegistryError::Application)
    }

    /// Assigns `value` to `property` and returns the assigned value.
    ///
    /// # Errors
    /// - [`RegistryError::NoSuchProperty`] for unknown names and methods
    /// - [`RegistryError::ReadOnly`] if the property has no setter
    /// - [`RegistryError::Application`] if the setter rejects the value
    pub fn set(&self, property: &str, value: Value) -> Result<Value, RegistryError> {
        let found = self.property(property)?;
        let mut this = self.instance.lock();
        match found.write(&mut *this, value.clone()) {
            Ok(true) => Ok(value),
            Ok(false) => Err(RegistryError::ReadOnly {
                id: self.id,
                property: property.to_string(),
            }),
            Err(message) => Err(RegistryError::Application(message)),
        }
    }

    fn property(&self, property: &str) -> Result<&crate::Property, RegistryError> {
        self.schema
            .find_property(property)
            .ok_or_else(|| RegistryError::NoSuchProperty {
                id: self.id,
                property: property.to_string(),
            })
    }
}

/// Live objects of one connection, keyed by id.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    entries: BTreeMap<ObjectId, Entry>,
    last_id: u64,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the table's singletons, in registration
    /// order, under ids 1, 2, ...
    pub fn seeded(classes: &ClassTable) -> Self {
        let mut registry = Self::new();
        for singleton in classes.singletons() {
            registry.insert(
                singleton.name.clone(),
                singleton.schema.clone(),
                singleton.instance.clone(),
            );
        }
        registry
    }

    /// Registers an instance under the next id.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        schema: Arc<ClassSchema>,
        instance: Instance,
    ) -> ObjectId {
        self.last_id += 1;
        let id = ObjectId(self.last_id);
        let name = name.into();
        tracing::debug!(%id, %name, "object registered");
        self.entries.insert(
            id,
            Entry {
                id,
                name,
                schema,
                instance,
            },
        );
        id
    }

    /// Looks up an object.
    ///
    /// # Errors
    /// Returns [`RegistryError::NoSuchObject`] if `id` is not registered.
    pub fn get(&self, id: ObjectId) -> Result<&Entry, RegistryError> {
        self.entries.get(&id).ok_or(RegistryError::NoSuchObject(id))
    }

    /// Removes an object.
    ///
    /// # Errors
    /// Returns [`RegistryError::NoSuchObject`] if `id` is not registered.
    pub fn remove(&mut self, id: ObjectId) -> Result<Entry, RegistryError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(RegistryError::NoSuchObject(id))?;
        tracing::debug!(%id, name = %entry.name, "object removed");
        Ok(entry)
    }

    /// Drops every object. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// The most recently allocated id (0 if none yet).
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl HandleResolver for ObjectRegistry {
    fn class_chain(&self, id: ObjectId) -> Option<Vec<String>> {
        self.entries.get(&id).map(|entry| entry.schema.chain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassBuilder;

    struct Point {
        x: f64,
        y: f64,
    }

    fn point() -> Arc<ClassSchema> {
        ClassBuilder::<Point>::new("Point")
            .constructor(|args| {
                Ok(Point {
                    x: args.f64(0).unwrap_or(0.0),
                    y: args.f64(1).unwrap_or(0.0),
                })
            })
            .method("length", 0, |this, _| Ok((this.x * this.x + this.y * this.y).sqrt()))
            .writable_property(
                "x",
                |this| this.x,
                |this, value| {
                    this.x = value.as_f64().ok_or("x must be a number")?;
                    Ok(())
                },
            )
            .property("y", |this| this.y)
            .build()
    }

    fn registry_with_point(x: f64, y: f64) -> (ObjectRegistry, ObjectId) {
        let schema = point();
        let instance = schema
            .construct(&Args::new(vec![Value::from(x), Value::from(y)]))
            .unwrap()
            .unwrap();
        let mut registry = ObjectRegistry::new();
        let id = registry.insert("Point", schema, instance);
        (registry, id)
    }

    #[test]
    fn test_insert_allocates_increasing_ids() {
        let schema = point();
        let mut registry = ObjectRegistry::new();
        let ids: Vec<ObjectId> = (0..5)
            .map(|_| {
                let instance = schema.construct(&Args::default()).unwrap().unwrap();
                registry.insert("Point", schema.clone(), instance)
            })
            .collect();
        assert_eq!(ids, (1..=5).map(ObjectId).collect::<Vec<_>>());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_ids_are_not_reused_after_remove() {
        let (mut registry, id) = registry_with_point(0.0, 0.0);
        registry.remove(id).unwrap();
        assert!(registry.is_empty());

        let schema = point();
        let instance = schema.construct(&Args::default()).unwrap().unwrap();
        let next = registry.insert("Point", schema, instance);
        assert_eq!(next, ObjectId(2));
    }

    #[test]
    fn test_get_and_remove_unknown_id() {
        let mut registry = ObjectRegistry::new();
        assert_eq!(
            registry.get(ObjectId(7)).unwrap_err(),
            RegistryError::NoSuchObject(ObjectId(7))
        );
        assert_eq!(
            registry.remove(ObjectId(7)).unwrap_err().to_string(),
            "No such object #7"
        );
    }

    #[test]
    fn test_entry_call() {
        let (registry, id) = registry_with_point(3.0, 4.0);
        let entry = registry.get(id).unwrap();
        match entry.call("length", &Args::default()).unwrap() {
            Reply::Ready(value) => assert_eq!(value, Value::from(5)),
            Reply::Deferred(_) => panic!("expected immediate reply"),
        }
        assert_eq!(
            entry.call("area", &Args::default()).unwrap_err().to_string(),
            "No such method on object #1: area"
        );
    }

    #[test]
    fn test_entry_get_set() {
        let (registry, id) = registry_with_point(1.0, 2.0);
        let entry = registry.get(id).unwrap();

        assert_eq!(entry.get("y"), Ok(Value::from(2)));
        assert_eq!(entry.set("x", Value::from(9)), Ok(Value::from(9)));
        assert_eq!(entry.get("x"), Ok(Value::from(9)));

        assert_eq!(
            entry.get("length").unwrap_err().to_string(),
            "No such property on object #1: length"
        );
        assert_eq!(
            entry.set("y", Value::from(1)).unwrap_err().to_string(),
            "Property is read-only on object #1: y"
        );
        assert_eq!(
            entry.set("x", Value::from("nine")).unwrap_err().to_string(),
            "x must be a number"
        );
    }

    #[test]
    fn test_clear_keeps_counter() {
        let (mut registry, _) = registry_with_point(0.0, 0.0);
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.last_id(), 1);
    }

    #[test]
    fn test_seeded_registry_shares_singletons() {
        let mut table = ClassTable::new();
        table
            .register_object("origin", point(), Point { x: 0.0, y: 0.0 })
            .unwrap();

        let a = ObjectRegistry::seeded(&table);
        let b = ObjectRegistry::seeded(&table);
        assert_eq!(a.get(ObjectId(1)).unwrap().name, "origin");

        a.get(ObjectId(1)).unwrap().set("x", Value::from(5)).unwrap();
        assert_eq!(b.get(ObjectId(1)).unwrap().get("x"), Ok(Value::from(5)));
    }

    #[test]
    fn test_resolver_reports_chain() {
        let (registry, id) = registry_with_point(0.0, 0.0);
        assert_eq!(
            registry.class_chain(id),
            Some(vec!["Point".to_string(), "Object".to_string()])
        );
        assert_eq!(registry.class_chain(ObjectId(99)), None);
    }
}
