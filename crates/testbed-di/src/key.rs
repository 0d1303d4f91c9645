//! Type identities and type-erased service handles
//!
//! Services are stored as `Arc<dyn Any + Send + Sync>` whose payload is the
//! `Arc<T>` handed out to callers. Wrapping the typed `Arc` instead of the
//! value itself lets `T` be unsized, so `dyn Trait` services resolve the same
//! way concrete ones do.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased service instance. The payload is always an `Arc<T>`.
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Identity of a declared service type, including trait-object types.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name, for diagnostics only
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// Equality and hashing go through the TypeId only; names are not guaranteed unique.
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

/// Registration key: a service type plus an optional string key for keyed services
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub type_key: TypeKey,
    pub key: Option<String>,
}

impl ServiceKey {
    pub fn unkeyed(type_key: TypeKey) -> Self {
        Self { type_key, key: None }
    }

    pub fn keyed(type_key: TypeKey, key: impl Into<String>) -> Self {
        Self {
            type_key,
            key: Some(key.into()),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} (key: {})", self.type_key, key),
            None => write!(f, "{}", self.type_key),
        }
    }
}

/// Erase a typed service into a [`ServiceHandle`]
pub fn erase<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> ServiceHandle {
    Arc::new(service)
}

/// Recover the typed service from a handle produced by [`erase`]
pub fn downcast<T: ?Sized + Send + Sync + 'static>(handle: &ServiceHandle) -> Option<Arc<T>> {
    handle.downcast_ref::<Arc<T>>().cloned()
}
