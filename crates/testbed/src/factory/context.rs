//! Value sources available to one instantiation request

use std::fmt;
use std::sync::Arc;

use testbed_di::{erase, ServiceHandle, ServiceLookup, TypeKey};
use tracing::debug;

use crate::logging::TestOutput;

/// A value together with every declared type it may be bound as.
///
/// Rust has no runtime subtyping, so assignability is explicit: an `Arg`
/// matches a parameter when one of its views has the parameter's declared
/// type. `Arg::new(Arc<Concrete>)` matches `Concrete` parameters;
/// add `.also(arc as Arc<dyn Trait>)` to also match `dyn Trait` parameters.
#[derive(Clone)]
pub struct Arg {
    type_name: &'static str,
    views: Vec<(TypeKey, ServiceHandle)>,
}

impl Arg {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            views: vec![(TypeKey::of::<T>(), erase(value))],
        }
    }

    /// Wrap an owned value
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    /// Add another type this value can be bound as.
    /// An existing view for the same type is replaced.
    pub fn also<U: ?Sized + Send + Sync + 'static>(mut self, view: Arc<U>) -> Self {
        let key = TypeKey::of::<U>();
        self.views.retain(|(existing, _)| *existing != key);
        self.views.push((key, erase(view)));
        self
    }

    /// The handle to bind for `declared`, if this value is assignable to it
    pub fn view(&self, declared: &TypeKey) -> Option<&ServiceHandle> {
        self.views
            .iter()
            .find(|(key, _)| key == declared)
            .map(|(_, handle)| handle)
    }

    pub fn is_assignable_to(&self, declared: &TypeKey) -> bool {
        self.view(declared).is_some()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arg")
            .field("type_name", &self.type_name)
            .field(
                "views",
                &self.views.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Read-only view over the parameter sources of one `create_instance` call
pub struct ResolutionContext<'a> {
    explicit_values: &'a [Arg],
    diagnostic_sink: Arg,
    owner: Arg,
    registry: &'a dyn ServiceLookup,
}

impl<'a> ResolutionContext<'a> {
    /// `owner` is the fixture offering registry access, with the views it may be injected as
    pub fn new(
        owner: Arg,
        registry: &'a dyn ServiceLookup,
        diagnostic_sink: Arc<dyn TestOutput>,
        explicit_values: &'a [Arg],
    ) -> Self {
        Self {
            explicit_values,
            diagnostic_sink: Arg::new(diagnostic_sink),
            owner,
            registry,
        }
    }

    pub fn explicit_values(&self) -> &[Arg] {
        self.explicit_values
    }

    pub fn diagnostic_sink(&self) -> &Arg {
        &self.diagnostic_sink
    }

    pub fn owner(&self) -> &Arg {
        &self.owner
    }

    /// Look `declared` up in the general registry. Failures read as absent.
    pub fn lookup(&self, declared: &TypeKey) -> Option<ServiceHandle> {
        match self.registry.lookup(declared) {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!(service = %declared, error = %err, "Registry lookup treated as absent");
                None
            }
        }
    }

    /// Look `declared` up among registrations stored under `key`. Failures read as absent.
    pub fn lookup_keyed(&self, declared: &TypeKey, key: &str) -> Option<ServiceHandle> {
        match self.registry.lookup_keyed(declared, key) {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!(service = %declared, key, error = %err, "Keyed registry lookup treated as absent");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {}
    struct Square;
    impl Shape for Square {}

    #[test]
    fn test_views_decide_assignability() {
        let square = Arc::new(Square);
        let arg = Arg::new(square.clone()).also(square as Arc<dyn Shape>);

        assert!(arg.is_assignable_to(&TypeKey::of::<Square>()));
        assert!(arg.is_assignable_to(&TypeKey::of::<dyn Shape>()));
        assert!(!arg.is_assignable_to(&TypeKey::of::<String>()));
    }

    #[test]
    fn test_also_replaces_same_view() {
        let arg = Arg::value(1_u32).also(Arc::new(2_u32));
        let handle = arg.view(&TypeKey::of::<u32>()).unwrap();
        assert_eq!(*testbed_di::downcast::<u32>(handle).unwrap(), 2);
    }
}
