//! Type-keyed value collections.
//!
//! - [`ValueCollection`] carries shared, cloneable values: the seeds handed to
//!   an invocation by the transport.
//! - [`Returns`] carries owned values travelling *upward* from an endpoint or
//!   middleware to the continuation that asked for them.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::key::{TypeKey, Value};

/// Values keyed by their type.
///
/// At most one value is held per type; inserting a second value of the same
/// type replaces the first.
#[derive(Clone, Default)]
pub struct ValueCollection {
    values: HashMap<TypeKey, Value>,
}

impl ValueCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value (builder pattern).
    pub fn with<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeKey::of::<T>(), Arc::new(value));
    }

    /// Returns the value of type `T`, if present.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeKey::of::<T>())
            .and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeKey::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the keys present in this collection.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.values.keys().copied()
    }

    pub(crate) fn value(&self, key: &TypeKey) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

impl fmt::Debug for ValueCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Owned values returned from downstream handlers.
#[derive(Default)]
pub struct Returns {
    values: HashMap<TypeKey, Box<dyn Any + Send>>,
}

impl Returns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a returned value.
    pub fn insert<T: Send + 'static>(&mut self, value: T) {
        self.values.insert(TypeKey::of::<T>(), Box::new(value));
    }

    /// Removes and returns the value of type `T`.
    pub fn take<T: 'static>(&mut self) -> Option<T> {
        let key = TypeKey::of::<T>();
        let boxed = self.values.remove(&key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(boxed) => {
                self.values.insert(key, boxed);
                None
            }
        }
    }

    /// Returns a reference to the value of type `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeKey::of::<T>())
            .and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeKey::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.values.keys().copied()
    }

    pub(crate) fn insert_boxed(&mut self, key: TypeKey, value: Box<dyn Any + Send>) {
        self.values.insert(key, value);
    }
}

impl fmt::Debug for Returns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
