//! Shared fixtures
//!
//! A fixture is created once per test class (or collection) and shared by
//! its tests. Users describe it by implementing [`TestBedFixture`]; the
//! [`Fixture`] host loads configuration, builds the service container on
//! first use and hands out services.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use config::builder::DefaultState;
use config::ConfigBuilder;
use parking_lot::Mutex;
use testbed_di::{DIContainer, DIError, DIResult, ScopedLookup, ServiceScope};
use tracing::{debug, info};

use crate::error::{TestBedError, TestBedResult};
use crate::factory::{create_instance, Arg, Construct, ResolutionContext, TypeDescriptor};
use crate::logging::{LoggerProvider, LoggingBuilder, OutputLoggerProvider, TestOutput};
use crate::settings::{build_configuration, Configuration, TestAppSettings};

/// User-supplied description of a fixture
#[async_trait]
pub trait TestBedFixture: Send + Sync + 'static {
    /// Register the services tests will resolve
    fn add_services(
        &self,
        services: &DIContainer,
        configuration: Option<&Configuration>,
    ) -> TestBedResult<()>;

    /// Configuration files to load. Configuration is skipped entirely unless
    /// every entry names a file; with no entries only the environment is read.
    fn test_app_settings(&self) -> Vec<TestAppSettings> {
        Vec::new()
    }

    /// Add configuration sources after the settings files, e.g. local secrets
    fn configure_sources(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> ConfigBuilder<DefaultState> {
        builder
    }

    /// Decide where container logging goes. The default forwards to the test output.
    fn add_logging_provider(&self, logging: &mut LoggingBuilder, provider: Arc<dyn LoggerProvider>) {
        logging.add_provider(provider);
    }

    /// Release resources that need asynchronous teardown
    async fn dispose_async_core(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Scope handed out by [`Fixture::get_async_scope`], bound to the fixture container
pub struct AsyncServiceScope {
    container: Arc<DIContainer>,
    scope: ServiceScope,
}

impl AsyncServiceScope {
    pub fn resolve<T>(&self) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve_with_scope::<T>(Some(&self.scope))
    }

    pub fn resolve_keyed<T>(&self, key: &str) -> DIResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.resolve_keyed_with_scope::<T>(key, Some(&self.scope))
    }

    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    pub async fn dispose_async(self) {
        self.scope.dispose_async().await;
    }
}

/// Host for a [`TestBedFixture`]
pub struct Fixture<F: TestBedFixture> {
    definition: Arc<F>,
    configuration: Option<Configuration>,
    container: Mutex<Option<Arc<DIContainer>>>,
    root_scope: Arc<ServiceScope>,
    disposed: AtomicBool,
    disposed_async: AtomicBool,
    this: Weak<Fixture<F>>,
}

impl<F: TestBedFixture> Fixture<F> {
    /// Create the fixture, loading configuration relative to the current directory
    pub fn new(definition: F) -> TestBedResult<Arc<Self>> {
        let base_path = std::env::current_dir()?;
        Self::with_base_path(definition, &base_path)
    }

    /// Create the fixture, loading configuration files relative to `base_path`
    pub fn with_base_path(definition: F, base_path: &Path) -> TestBedResult<Arc<Self>> {
        let settings = definition.test_app_settings();
        let configuration = build_configuration(&settings, base_path, |builder| {
            definition.configure_sources(builder)
        })?;

        Ok(Arc::new_cyclic(|this| Self {
            definition: Arc::new(definition),
            configuration,
            container: Mutex::new(None),
            root_scope: Arc::new(ServiceScope::new()),
            disposed: AtomicBool::new(false),
            disposed_async: AtomicBool::new(false),
            this: this.clone(),
        }))
    }

    pub fn definition(&self) -> &Arc<F> {
        &self.definition
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// The fixture container, built on first call.
    ///
    /// Logging is wired to the output of the first caller; later callers get
    /// the same container.
    pub fn service_provider(&self, output: &Arc<dyn TestOutput>) -> TestBedResult<Arc<DIContainer>> {
        let mut slot = self.container.lock();
        if let Some(container) = slot.as_ref() {
            return Ok(container.clone());
        }
        if self.disposed.load(Ordering::Acquire) {
            return Err(DIError::Disposed {
                what: "fixture".to_string(),
            }
            .into());
        }

        let container = DIContainer::new();
        self.definition
            .add_services(&container, self.configuration.as_ref())?;

        let mut logging = LoggingBuilder::new();
        self.definition.add_logging_provider(
            &mut logging,
            Arc::new(OutputLoggerProvider::new(output.clone())),
        );
        container.register_instance(Arc::new(logging.build()))?;

        info!(
            fixture = std::any::type_name::<F>(),
            services = container.service_count(),
            "Built fixture service container"
        );

        let container = Arc::new(container);
        *slot = Some(container.clone());
        Ok(container)
    }

    /// Scope that lives as long as the fixture. Scoped services resolved
    /// through the fixture itself come from here.
    pub fn root_scope(&self) -> &Arc<ServiceScope> {
        &self.root_scope
    }

    pub fn get_service<T>(&self, output: &Arc<dyn TestOutput>) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let container = self.service_provider(output)?;
        absent_if_unregistered(container.resolve_with_scope::<T>(Some(&self.root_scope)))
    }

    /// Resolve `T` inside a fresh scope that is disposed before returning
    pub fn get_scoped_service<T>(
        &self,
        output: &Arc<dyn TestOutput>,
    ) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let container = self.service_provider(output)?;
        let scope = container.create_scope();
        let resolved = container.resolve_with_scope::<T>(Some(&scope));
        scope.dispose();
        absent_if_unregistered(resolved)
    }

    pub fn get_keyed_service<T>(
        &self,
        key: &str,
        output: &Arc<dyn TestOutput>,
    ) -> TestBedResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let container = self.service_provider(output)?;
        let resolved = container.resolve_keyed_with_scope::<T>(key, Some(&self.root_scope));
        absent_if_unregistered(resolved)
    }

    /// A scope the caller owns and disposes
    pub fn get_async_scope(&self, output: &Arc<dyn TestOutput>) -> TestBedResult<AsyncServiceScope> {
        let container = self.service_provider(output)?;
        let scope = container.create_scope();
        Ok(AsyncServiceScope { container, scope })
    }

    /// Build a `T` through its own descriptor, see [`crate::factory`]
    pub fn create_test_instance<T: Construct>(
        &self,
        output: &Arc<dyn TestOutput>,
        explicit_values: &[Arg],
    ) -> TestBedResult<T> {
        self.create_test_instance_with(&T::descriptor(), output, explicit_values)
    }

    /// Build a `T` through `descriptor`, injecting `explicit_values` first
    pub fn create_test_instance_with<T>(
        &self,
        descriptor: &TypeDescriptor<T>,
        output: &Arc<dyn TestOutput>,
        explicit_values: &[Arg],
    ) -> TestBedResult<T> {
        let container = self.service_provider(output)?;
        let registry = ScopedLookup::new(&container, &self.root_scope);
        let context = ResolutionContext::new(
            self.owner_arg(),
            &registry,
            output.clone(),
            explicit_values,
        );
        Ok(create_instance(descriptor, &context)?)
    }

    /// The fixture as an injectable value: as `Fixture<F>` and as the definition `F`
    fn owner_arg(&self) -> Arg {
        match self.this.upgrade() {
            Some(this) => Arg::new(this).also(self.definition.clone()),
            None => Arg::new(self.definition.clone()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose the container. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.root_scope.dispose();
        if let Some(container) = self.container.lock().take() {
            container.dispose();
        }
        debug!(fixture = std::any::type_name::<F>(), "Disposed fixture");
    }

    /// Run the definition's asynchronous teardown, then [`Fixture::dispose`]. Idempotent.
    pub async fn dispose_async(&self) -> TestBedResult<()> {
        if self.disposed_async.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.definition
            .dispose_async_core()
            .await
            .map_err(TestBedError::Teardown)?;
        self.dispose();
        Ok(())
    }
}

impl<F: TestBedFixture> Drop for Fixture<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn absent_if_unregistered<T: ?Sized>(resolved: DIResult<Arc<T>>) -> TestBedResult<Option<Arc<T>>> {
    match resolved {
        Ok(service) => Ok(Some(service)),
        Err(DIError::ServiceNotRegistered { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

