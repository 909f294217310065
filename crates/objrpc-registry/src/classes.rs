//! The class table: everything an application exposes.
//!
//! Built once before the server starts and shared (read-only) by every
//! connection. It holds two kinds of entries:
//!
//! - **classes**, which `new` can instantiate and `list` reports
//! - **singletons**, existing objects that are placed into every
//!   connection's registry when the connection is created

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Args, ClassSchema, Instance, RegistryError};

/// A pre-built object shared by all connections.
#[derive(Clone)]
pub struct Singleton {
    pub name: String,
    pub schema: Arc<ClassSchema>,
    pub instance: Instance,
}

impl std::fmt::Debug for Singleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Singleton")
            .field("name", &self.name)
            .field("class", &self.schema.name())
            .finish()
    }
}

/// Registered classes and singletons.
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: BTreeMap<String, Arc<ClassSchema>>,
    singletons: Vec<Singleton>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class under its schema name.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateClass`] if the name is taken.
    pub fn register(&mut self, schema: Arc<ClassSchema>) -> Result<(), RegistryError> {
        let name = schema.name().to_string();
        if self.classes.contains_key(&name) {
            return Err(RegistryError::DuplicateClass(name));
        }
        tracing::debug!(class = %name, chain = ?schema.chain(), "class registered");
        self.classes.insert(name, schema);
        Ok(())
    }

    /// Registers an existing object, exposed to every connection.
    ///
    /// # Errors
    /// Returns [`RegistryError::TypeMismatch`] if `schema` was not built
    /// for `T`.
    pub fn register_object<T: Any + Send>(
        &mut self,
        name: impl Into<String>,
        schema: Arc<ClassSchema>,
        value: T,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if !schema.accepts::<T>() {
            return Err(RegistryError::TypeMismatch(name));
        }
        tracing::debug!(object = %name, class = %schema.name(), "singleton registered");
        let instance: Instance = Arc::new(Mutex::new(value));
        self.singletons.push(Singleton {
            name,
            schema,
            instance,
        });
        Ok(())
    }

    /// Class names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    /// Looks up a class by name.
    ///
    /// # Errors
    /// Returns [`RegistryError::NoSuchClass`] if it was never registered.
    pub fn get(&self, name: &str) -> Result<&Arc<ClassSchema>, RegistryError> {
        self.classes
            .get(name)
            .ok_or_else(|| RegistryError::NoSuchClass(name.to_string()))
    }

    /// Builds a new instance of class `name`.
    ///
    /// # Errors
    /// - [`RegistryError::NoSuchClass`] for an unknown class
    /// - [`RegistryError::NotConstructible`] if it has no constructor
    /// - [`RegistryError::Application`] if the constructor fails
    pub fn construct(
        &self,
        name: &str,
        args: &Args,
    ) -> Result<(Arc<ClassSchema>, Instance), RegistryError> {
        let schema = self.get(name)?;
        match schema.construct(args) {
            Some(Ok(instance)) => Ok((schema.clone(), instance)),
            Some(Err(message)) => Err(RegistryError::Application(message)),
            None => Err(RegistryError::NotConstructible(name.to_string())),
        }
    }

    /// Registered singletons, in registration order.
    pub fn singletons(&self) -> &[Singleton] {
        &self.singletons
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
