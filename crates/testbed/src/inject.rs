//! Field injection for test classes
//!
//! Types implementing [`Inject`] pull their services out of the fixture
//! container through an [`Injector`]. Anything that cannot be resolved is
//! left as `None`.

use std::ops::Deref;
use std::sync::Arc;

use testbed_di::{downcast, DIContainer, ServiceHandle, ServiceKey, ServiceScope, TypeKey};
use tracing::debug;

use crate::error::TestBedResult;
use crate::fixture::{Fixture, TestBedFixture};
use crate::logging::TestOutput;
use crate::test_bed::TestBed;

/// Resolves services for injected fields
pub struct Injector {
    container: Option<Arc<DIContainer>>,
    scope: Option<Arc<ServiceScope>>,
}

impl Injector {
    pub fn new(container: Option<Arc<DIContainer>>) -> Self {
        Self {
            container,
            scope: None,
        }
    }

    /// Resolve scoped services from `scope`
    pub fn with_scope(mut self, scope: Arc<ServiceScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Look up `declared`, under `key` when one is given. Every failure reads as `None`.
    pub fn resolve_handle(&self, declared: &TypeKey, key: Option<&str>) -> Option<ServiceHandle> {
        let container = self.container.as_ref()?;
        let service_key = match key.filter(|k| !k.is_empty()) {
            Some(key) => ServiceKey::keyed(*declared, key),
            None => ServiceKey::unkeyed(*declared),
        };
        match container.resolve_erased(&service_key, self.scope.as_deref()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                debug!(service = %service_key, error = %err, "Injection left unresolved");
                None
            }
        }
    }

    pub fn resolve<T>(&self, key: Option<&str>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_handle(&TypeKey::of::<T>(), key)
            .and_then(|handle| downcast::<T>(&handle))
    }

    /// Fill `slot` if the service resolves; otherwise leave it untouched.
    /// Returns whether it resolved.
    pub fn fill<T>(&self, slot: &mut Option<Arc<T>>, key: Option<&str>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.resolve::<T>(key) {
            Some(service) => {
                *slot = Some(service);
                true
            }
            None => false,
        }
    }
}

/// Types whose fields are populated from a fixture container
pub trait Inject {
    fn inject(&mut self, injector: &Injector);
}

/// A [`TestBed`] that also offers service lookup and field injection
pub struct TestBedWithDi<F: TestBedFixture> {
    bed: TestBed<F>,
}

impl<F: TestBedFixture> TestBedWithDi<F> {
    pub fn new(output: Arc<dyn TestOutput>, fixture: Arc<Fixture<F>>) -> Self {
        Self {
            bed: TestBed::new(output, fixture),
        }
    }

    fn injector(&self) -> Injector {
        let container = match self.bed.fixture().service_provider(self.bed.output()) {
            Ok(container) => Some(container),
            Err(err) => {
                debug!(error = %err, "Fixture container unavailable for injection");
                None
            }
        };
        Injector::new(container).with_scope(self.bed.fixture().root_scope().clone())
    }

    /// Look a service up by runtime type, keyed when `key` is non-empty
    pub fn resolve_service(&self, declared: &TypeKey, key: Option<&str>) -> Option<ServiceHandle> {
        self.injector().resolve_handle(declared, key)
    }

    pub fn get_service<T>(&self) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bed.fixture().get_service::<T>(self.bed.output())
    }

    pub fn get_scoped_service<T>(&self) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bed.fixture().get_scoped_service::<T>(self.bed.output())
    }

    pub fn get_keyed_service<T>(&self, key: &str) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bed.fixture().get_keyed_service::<T>(key, self.bed.output())
    }

    /// Populate `target` from the fixture container
    pub fn inject<S: Inject>(&self, target: &mut S) {
        target.inject(&self.injector());
    }

    /// A default `S` with its injectable fields populated
    pub fn create<S: Inject + Default>(&self) -> S {
        let mut target = S::default();
        self.inject(&mut target);
        target
    }
}

impl<F: TestBedFixture> Deref for TestBedWithDi<F> {
    type Target = TestBed<F>;

    fn deref(&self) -> &TestBed<F> {
        &self.bed
    }
}
