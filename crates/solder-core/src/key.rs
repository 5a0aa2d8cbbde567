//! Type identity used to match producers with consumers.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A produced value as stored in a value collection.
pub type Value = Arc<dyn Any + Send + Sync>;

/// The identity of one type slot.
///
/// Two keys are equal exactly when their `TypeId`s are equal. The type name is
/// carried along for diagnostics only. Rust type aliases share the `TypeId` of
/// the aliased type; use a newtype to declare a distinct slot.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the Rust type name of this key.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `()` stands for "no value" wherever a single output is declared.
    pub fn is_unit(&self) -> bool {
        self.id == TypeId::of::<()>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Returns the keys of a single declared output, treating `()` as none.
pub(crate) fn single<T: ?Sized + 'static>() -> Vec<TypeKey> {
    let key = TypeKey::of::<T>();
    if key.is_unit() { Vec::new() } else { vec![key] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Meters(f64);

    #[test]
    fn test_newtype_is_distinct_from_inner() {
        assert_ne!(TypeKey::of::<Meters>(), TypeKey::of::<f64>());
        assert_eq!(TypeKey::of::<f64>(), TypeKey::of::<f64>());
    }

    #[test]
    fn test_unit_has_no_single_output() {
        assert!(single::<()>().is_empty());
        assert_eq!(single::<Meters>(), vec![TypeKey::of::<Meters>()]);
    }
}
