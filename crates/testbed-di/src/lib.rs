//! Service registry for testbed fixtures
//!
//! This crate provides the container that test fixtures populate with their
//! services. Services are registered with a lifetime (singleton, scoped or
//! transient), optionally under a string key, and resolved by type.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use testbed_di::DIContainer;
//!
//! trait Calculator: Send + Sync {
//!     fn add(&self, x: i32, y: i32) -> i32;
//! }
//!
//! struct Simple;
//!
//! impl Calculator for Simple {
//!     fn add(&self, x: i32, y: i32) -> i32 {
//!         x + y
//!     }
//! }
//!
//! let container = DIContainer::new();
//! container
//!     .register_transient(|_| Ok(Arc::new(Simple) as Arc<dyn Calculator>))
//!     .unwrap();
//!
//! let calculator = container.resolve::<dyn Calculator>().unwrap();
//! assert_eq!(calculator.add(2, 3), 5);
//! ```

pub mod key;
pub mod scope;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

pub use key::{downcast, erase, ServiceHandle, ServiceKey, TypeKey};
pub use scope::ServiceScope;

/// Errors that can occur during dependency injection operations
#[derive(Debug, thiserror::Error)]
pub enum DIError {
    #[error("Service not registered: {service_type}")]
    ServiceNotRegistered { service_type: String },

    #[error("Service already registered: {service_type}")]
    ServiceAlreadyRegistered { service_type: String },

    #[error("Invalid service type: {message}")]
    InvalidServiceType { message: String },

    #[error("Dependency resolution failed: {message}")]
    DependencyResolutionFailed { message: String },

    #[error("Scoped service {service_type} cannot be resolved without a scope")]
    ScopeRequired { service_type: String },

    #[error("Cannot resolve from a disposed {what}")]
    Disposed { what: String },
}

pub type DIResult<T> = Result<T, DIError>;

/// Service lifetime management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// Service is created once and reused for the lifetime of the container
    Singleton,
    /// Service is created each time it's requested
    Transient,
    /// Service is created once per [`ServiceScope`]
    Scoped,
}

type ErasedFactory = Box<dyn Fn(&ServiceResolver<'_>) -> DIResult<ServiceHandle> + Send + Sync>;

/// Service descriptor containing registration information
struct ServiceDescriptor {
    factory: ErasedFactory,
    lifetime: ServiceLifetime,
    instance: Mutex<Option<ServiceHandle>>,
}

/// Resolution context handed to service factories.
///
/// Carries the scope of the outer resolution so a scoped or transient
/// factory can pull its own scoped dependencies from the same scope.
/// Singleton factories always run without a scope.
pub struct ServiceResolver<'a> {
    container: &'a DIContainer,
    scope: Option<&'a ServiceScope>,
}

impl<'a> ServiceResolver<'a> {
    pub fn container(&self) -> &'a DIContainer {
        self.container
    }

    pub fn scope(&self) -> Option<&'a ServiceScope> {
        self.scope
    }

    pub fn resolve<T>(&self) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve_with_scope::<T>(self.scope)
    }

    pub fn resolve_keyed<T>(&self, key: &str) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve_keyed_with_scope::<T>(key, self.scope)
    }

    /// Resolve a dependency, treating any failure as absent
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>().ok()
    }
}

/// Type-erased lookup used by callers that only know a [`TypeKey`] at runtime.
pub trait ServiceLookup: Send + Sync {
    /// Resolve the unkeyed registration for `type_key`
    fn lookup(&self, type_key: &TypeKey) -> DIResult<ServiceHandle>;

    /// Resolve the registration stored under `key` for `type_key`.
    /// Unkeyed registrations are never consulted.
    fn lookup_keyed(&self, type_key: &TypeKey, key: &str) -> DIResult<ServiceHandle>;
}

/// The dependency injection container
pub struct DIContainer {
    services: RwLock<HashMap<ServiceKey, Arc<ServiceDescriptor>>>,
    disposed: AtomicBool,
}

impl DIContainer {
    /// Create a new empty DI container
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn insert<F, T>(
        &self,
        service_key: ServiceKey,
        lifetime: ServiceLifetime,
        factory: F,
        instance: Option<ServiceHandle>,
    ) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        let mut services = self.services.write();

        if services.contains_key(&service_key) {
            return Err(DIError::ServiceAlreadyRegistered {
                service_type: service_key.to_string(),
            });
        }

        let wrapped_factory: ErasedFactory = Box::new(move |resolver: &ServiceResolver<'_>| {
            let result = factory(resolver)?;
            Ok(erase(result))
        });

        debug!("Registered {:?} service: {}", lifetime, service_key);

        services.insert(
            service_key,
            Arc::new(ServiceDescriptor {
                factory: wrapped_factory,
                lifetime,
                instance: Mutex::new(instance),
            }),
        );
        Ok(())
    }

    /// Register a singleton service with a factory function
    pub fn register<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::unkeyed(TypeKey::of::<T>()),
            ServiceLifetime::Singleton,
            factory,
            None,
        )
    }

    /// Register a transient service
    pub fn register_transient<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::unkeyed(TypeKey::of::<T>()),
            ServiceLifetime::Transient,
            factory,
            None,
        )
    }

    /// Register a scoped service
    pub fn register_scoped<F, T>(&self, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::unkeyed(TypeKey::of::<T>()),
            ServiceLifetime::Scoped,
            factory,
            None,
        )
    }

    /// Register an already constructed singleton
    pub fn register_instance<T>(&self, instance: Arc<T>) -> DIResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let stored = instance.clone();
        self.insert(
            ServiceKey::unkeyed(TypeKey::of::<T>()),
            ServiceLifetime::Singleton,
            move |_| Ok(stored.clone()),
            Some(erase(instance)),
        )
    }

    /// Register a keyed singleton service
    pub fn register_keyed<F, T>(&self, key: impl Into<String>, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::keyed(TypeKey::of::<T>(), key),
            ServiceLifetime::Singleton,
            factory,
            None,
        )
    }

    /// Register a keyed transient service
    pub fn register_keyed_transient<F, T>(&self, key: impl Into<String>, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::keyed(TypeKey::of::<T>(), key),
            ServiceLifetime::Transient,
            factory,
            None,
        )
    }

    /// Register a keyed scoped service
    pub fn register_keyed_scoped<F, T>(&self, key: impl Into<String>, factory: F) -> DIResult<()>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(
            ServiceKey::keyed(TypeKey::of::<T>(), key),
            ServiceLifetime::Scoped,
            factory,
            None,
        )
    }

    /// Resolve a service instance outside of any scope
    pub fn resolve<T>(&self) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_with_scope::<T>(None)
    }

    /// Resolve a service, using `scope` for scoped registrations
    pub fn resolve_with_scope<T>(&self, scope: Option<&ServiceScope>) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let handle = self.resolve_erased(&ServiceKey::unkeyed(TypeKey::of::<T>()), scope)?;
        Self::typed(handle)
    }

    /// Resolve the service registered under `key`
    pub fn resolve_keyed<T>(&self, key: &str) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_keyed_with_scope::<T>(key, None)
    }

    pub fn resolve_keyed_with_scope<T>(
        &self,
        key: &str,
        scope: Option<&ServiceScope>,
    ) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let handle = self.resolve_erased(&ServiceKey::keyed(TypeKey::of::<T>(), key), scope)?;
        Self::typed(handle)
    }

    /// Resolve a service, treating any failure as absent
    pub fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>().ok()
    }

    fn typed<T>(handle: ServiceHandle) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        downcast::<T>(&handle).ok_or_else(|| DIError::InvalidServiceType {
            message: format!(
                "Service type mismatch during downcast to {}",
                std::any::type_name::<T>()
            ),
        })
    }

    /// Resolve a registration by its erased key.
    ///
    /// The registry lock is released before any factory runs, so factories may
    /// resolve their own dependencies. Dependency cycles are not detected.
    pub fn resolve_erased(
        &self,
        service_key: &ServiceKey,
        scope: Option<&ServiceScope>,
    ) -> DIResult<ServiceHandle> {
        if self.is_disposed() {
            return Err(DIError::Disposed {
                what: "DI container".to_string(),
            });
        }

        let descriptor = self
            .services
            .read()
            .get(service_key)
            .cloned()
            .ok_or_else(|| DIError::ServiceNotRegistered {
                service_type: service_key.to_string(),
            })?;

        match descriptor.lifetime {
            ServiceLifetime::Singleton => {
                let mut slot = descriptor.instance.lock();
                if let Some(instance) = slot.as_ref() {
                    return Ok(instance.clone());
                }

                let resolver = ServiceResolver {
                    container: self,
                    scope: None,
                };
                let instance = (descriptor.factory)(&resolver)?;
                *slot = Some(instance.clone());
                Ok(instance)
            }
            ServiceLifetime::Transient => {
                let resolver = ServiceResolver {
                    container: self,
                    scope,
                };
                (descriptor.factory)(&resolver)
            }
            ServiceLifetime::Scoped => {
                let scope = scope.ok_or_else(|| DIError::ScopeRequired {
                    service_type: service_key.to_string(),
                })?;
                scope.get_or_create(service_key, || {
                    let resolver = ServiceResolver {
                        container: self,
                        scope: Some(scope),
                    };
                    (descriptor.factory)(&resolver)
                })
            }
        }
    }

    /// Create a new scope for scoped services
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope::new()
    }

    /// Check if a service is registered
    pub fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .read()
            .contains_key(&ServiceKey::unkeyed(TypeKey::of::<T>()))
    }

    /// Check if a keyed service is registered
    pub fn is_keyed_registered<T>(&self, key: &str) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .read()
            .contains_key(&ServiceKey::keyed(TypeKey::of::<T>(), key))
    }

    /// Lifetime of a registration, if present
    pub fn lifetime_of(&self, service_key: &ServiceKey) -> Option<ServiceLifetime> {
        self.services.read().get(service_key).map(|d| d.lifetime)
    }

    /// Get the number of registered services, keyed ones included
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Clear all registered services
    pub fn clear(&self) {
        self.services.write().clear();
        info!("Cleared all services from DI container");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Drop every cached singleton and refuse further resolutions.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let released = self
            .services
            .read()
            .values()
            .filter_map(|descriptor| descriptor.instance.lock().take())
            .count();

        info!(released, "Disposed DI container");
    }
}

impl Default for DIContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLookup for DIContainer {
    fn lookup(&self, type_key: &TypeKey) -> DIResult<ServiceHandle> {
        self.resolve_erased(&ServiceKey::unkeyed(*type_key), None)
    }

    fn lookup_keyed(&self, type_key: &TypeKey, key: &str) -> DIResult<ServiceHandle> {
        self.resolve_erased(&ServiceKey::keyed(*type_key, key), None)
    }
}

/// A container viewed through one scope, so scoped registrations resolve
pub struct ScopedLookup<'a> {
    container: &'a DIContainer,
    scope: &'a ServiceScope,
}

impl<'a> ScopedLookup<'a> {
    pub fn new(container: &'a DIContainer, scope: &'a ServiceScope) -> Self {
        Self { container, scope }
    }
}

impl ServiceLookup for ScopedLookup<'_> {
    fn lookup(&self, type_key: &TypeKey) -> DIResult<ServiceHandle> {
        self.container
            .resolve_erased(&ServiceKey::unkeyed(*type_key), Some(self.scope))
    }

    fn lookup_keyed(&self, type_key: &TypeKey, key: &str) -> DIResult<ServiceHandle> {
        self.container
            .resolve_erased(&ServiceKey::keyed(*type_key, key), Some(self.scope))
    }
}

/// Builder pattern for configuring the DI container
pub struct DIContainerBuilder {
    container: DIContainer,
}

impl DIContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            container: DIContainer::new(),
        }
    }

    /// Register a singleton service
    pub fn register<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register(factory)?;
        Ok(self)
    }

    /// Register a transient service
    pub fn register_transient<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register_transient(factory)?;
        Ok(self)
    }

    /// Register a scoped service
    pub fn register_scoped<F, T>(self, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register_scoped(factory)?;
        Ok(self)
    }

    /// Register an already constructed singleton
    pub fn register_instance<T>(self, instance: Arc<T>) -> DIResult<Self>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register_instance(instance)?;
        Ok(self)
    }

    /// Register a keyed singleton service
    pub fn register_keyed<F, T>(self, key: impl Into<String>, factory: F) -> DIResult<Self>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register_keyed(key, factory)?;
        Ok(self)
    }

    /// Register a keyed transient service
    pub fn register_keyed_transient<F, T>(
        self,
        key: impl Into<String>,
        factory: F,
    ) -> DIResult<Self>
    where
        F: Fn(&ServiceResolver<'_>) -> DIResult<Arc<T>> + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register_keyed_transient(key, factory)?;
        Ok(self)
    }

    /// Build the container
    pub fn build(self) -> DIContainer {
        self.container
    }
}

impl Default for DIContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience macro for registering services
#[macro_export]
macro_rules! register_service {
    ($container:expr, $service_type:ty, $factory:expr) => {
        $container.register::<_, $service_type>($factory)
    };
}

/// Convenience macro for resolving services
#[macro_export]
macro_rules! resolve_service {
    ($container:expr, $service_type:ty) => {
        $container.resolve::<$service_type>()
    };
}
