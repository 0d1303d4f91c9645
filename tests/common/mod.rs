//! Services and fixtures shared by the integration suites

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};
use serde::Deserialize;
use testbed::factory::{Arguments, Parameter};
use testbed::logging::{Logger, LoggerFactory};
use testbed::{
    async_trait, configure_options, Configuration, Construct, Fixture, Options, TestAppSettings,
    TestBedFixture, TestBedResult, TypeDescriptor,
};
use testbed_di::{DIContainer, DIResult, ServiceResolver};

pub const APP_SETTINGS: &str = "tests/appsettings.json";
pub const USER_SECRETS: &str = "tests/usersecrets.json";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CalculatorOptions {
    pub rate: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SecretValues {
    pub user: String,
    pub password: String,
}

pub trait Calculator: Send + Sync {
    fn add(&self, x: i32, y: i32) -> i32;
}

/// Adds and scales by the configured rate
pub struct RateCalculator {
    logger: Arc<dyn Logger>,
    options: Arc<Options<CalculatorOptions>>,
}

impl Calculator for RateCalculator {
    fn add(&self, x: i32, y: i32) -> i32 {
        let result = (x + y) * self.options.rate;
        self.logger.info(&format!("The result is {result}"));
        result
    }
}

fn rate_calculator(resolver: &ServiceResolver<'_>) -> DIResult<Arc<dyn Calculator>> {
    let loggers = resolver.resolve::<LoggerFactory>()?;
    let options = resolver.resolve::<Options<CalculatorOptions>>()?;
    Ok(Arc::new(RateCalculator {
        logger: loggers.logger_for::<RateCalculator>(),
        options,
    }))
}

pub trait CarMaker: Send + Sync {
    fn manufacturer(&self) -> &str;
}

pub struct Porsche;

impl CarMaker for Porsche {
    fn manufacturer(&self) -> &str {
        "Porsche"
    }
}

pub struct Toyota;

impl CarMaker for Toyota {
    fn manufacturer(&self) -> &str {
        "Toyota"
    }
}

fn next_instance_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub struct TransientService {
    pub instance_id: u64,
}

pub struct ScopedService {
    pub instance_id: u64,
}

pub struct SingletonService {
    pub instance_id: u64,
}

fn register_car_makers(services: &DIContainer) -> DIResult<()> {
    services.register_keyed_transient("Porsche", |_| Ok(Arc::new(Porsche) as Arc<dyn CarMaker>))?;
    services.register_keyed_transient("Toyota", |_| Ok(Arc::new(Toyota) as Arc<dyn CarMaker>))?;
    Ok(())
}

/// Full example fixture: calculator, car makers, every lifetime, options and secrets
pub struct TestProjectFixture;

impl TestBedFixture for TestProjectFixture {
    fn add_services(
        &self,
        services: &DIContainer,
        configuration: Option<&Configuration>,
    ) -> TestBedResult<()> {
        services.register_transient(rate_calculator)?;
        register_car_makers(services)?;
        services.register_transient(|_| {
            Ok(Arc::new(TransientService {
                instance_id: next_instance_id(),
            }))
        })?;
        services.register_scoped(|_| {
            Ok(Arc::new(ScopedService {
                instance_id: next_instance_id(),
            }))
        })?;
        services.register(|_| {
            Ok(Arc::new(SingletonService {
                instance_id: next_instance_id(),
            }))
        })?;
        configure_options::<CalculatorOptions>(services, configuration, "options")?;
        configure_options::<SecretValues>(services, configuration, "secretvalues")?;
        Ok(())
    }

    fn test_app_settings(&self) -> Vec<TestAppSettings> {
        vec![TestAppSettings::required(APP_SETTINGS)]
    }

    fn configure_sources(&self, builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        builder.add_source(
            File::with_name(USER_SECRETS)
                .format(FileFormat::Json)
                .required(false),
        )
    }
}

/// Shared across a suite, the way a class fixture is
pub fn project_fixture() -> &'static Arc<Fixture<TestProjectFixture>> {
    static FIXTURE: OnceLock<Arc<Fixture<TestProjectFixture>>> = OnceLock::new();
    FIXTURE.get_or_init(|| Fixture::new(TestProjectFixture).expect("project fixture"))
}

/// Fixture for factory-built subjects
pub struct FactoryTestProjectFixture;

impl TestBedFixture for FactoryTestProjectFixture {
    fn add_services(
        &self,
        services: &DIContainer,
        configuration: Option<&Configuration>,
    ) -> TestBedResult<()> {
        services.register_transient(rate_calculator)?;
        register_car_makers(services)?;
        configure_options::<CalculatorOptions>(services, configuration, "options")?;
        Ok(())
    }

    fn test_app_settings(&self) -> Vec<TestAppSettings> {
        vec![TestAppSettings::required(APP_SETTINGS)]
    }
}

pub fn factory_fixture() -> &'static Arc<Fixture<FactoryTestProjectFixture>> {
    static FIXTURE: OnceLock<Arc<Fixture<FactoryTestProjectFixture>>> = OnceLock::new();
    FIXTURE.get_or_init(|| Fixture::new(FactoryTestProjectFixture).expect("factory fixture"))
}

/// Subject with keyed dependencies, only reachable through its non-public constructor
pub struct CalculatorService {
    calculator: Arc<dyn Calculator>,
    options: Arc<Options<CalculatorOptions>>,
    porsche: Arc<dyn CarMaker>,
    toyota: Arc<dyn CarMaker>,
}

impl CalculatorService {
    pub fn calculate(&self, x: i32, y: i32) -> i32 {
        self.calculator.add(x, y)
    }

    pub fn rate(&self) -> i32 {
        self.options.rate
    }

    pub fn porsche_info(&self) -> String {
        format!("Manufacturer: {}", self.porsche.manufacturer())
    }

    pub fn toyota_info(&self) -> String {
        format!("Manufacturer: {}", self.toyota.manufacturer())
    }
}

impl Construct for CalculatorService {
    fn descriptor() -> TypeDescriptor<Self> {
        TypeDescriptor::new().non_public_constructor(
            vec![
                Parameter::of::<dyn Calculator>(),
                Parameter::of::<Options<CalculatorOptions>>(),
                Parameter::of::<dyn CarMaker>().keyed("Porsche"),
                Parameter::of::<dyn CarMaker>().keyed("Toyota"),
            ],
            |args: &mut Arguments| {
                Ok(CalculatorService {
                    calculator: args.take()?,
                    options: args.take()?,
                    porsche: args.take()?,
                    toyota: args.take()?,
                })
            },
        )
    }
}

/// Subject without keyed dependencies
pub struct SimpleService {
    calculator: Arc<dyn Calculator>,
    options: Arc<Options<CalculatorOptions>>,
}

impl SimpleService {
    pub fn calculate(&self, x: i32, y: i32) -> i32 {
        self.calculator.add(x, y)
    }

    pub fn rate(&self) -> i32 {
        self.options.rate
    }
}

impl Construct for SimpleService {
    fn descriptor() -> TypeDescriptor<Self> {
        TypeDescriptor::new().constructor(
            vec![
                Parameter::of::<dyn Calculator>(),
                Parameter::of::<Options<CalculatorOptions>>(),
            ],
            |args| {
                Ok(SimpleService {
                    calculator: args.take()?,
                    options: args.take()?,
                })
            },
        )
    }
}

/// Needs a registered calculator plus a value only the caller can supply
pub struct CustomTestClass {
    pub calculator: Arc<dyn Calculator>,
    pub custom_data: Arc<String>,
}

impl Construct for CustomTestClass {
    fn descriptor() -> TypeDescriptor<Self> {
        TypeDescriptor::new().constructor(
            vec![Parameter::of::<dyn Calculator>(), Parameter::of::<String>()],
            |args| {
                Ok(CustomTestClass {
                    calculator: args.take()?,
                    custom_data: args.take()?,
                })
            },
        )
    }
}

/// Fixture that only reads the environment
pub struct TestProjectFixtureWithoutAppsettings;

impl TestBedFixture for TestProjectFixtureWithoutAppsettings {
    fn add_services(&self, _services: &DIContainer, _configuration: Option<&Configuration>) -> TestBedResult<()> {
        Ok(())
    }
}

/// A service that has to be released asynchronously
#[derive(Default)]
pub struct AsyncDisposableService {
    disposed_async: AtomicBool,
}

impl AsyncDisposableService {
    pub async fn dispose_async(&self) {
        tokio::task::yield_now().await;
        self.disposed_async.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed_async(&self) -> bool {
        self.disposed_async.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct AsyncDisposableFixture {
    service: Arc<AsyncDisposableService>,
}

#[async_trait]
impl TestBedFixture for AsyncDisposableFixture {
    fn add_services(&self, services: &DIContainer, _configuration: Option<&Configuration>) -> TestBedResult<()> {
        services.register_instance(self.service.clone())?;
        Ok(())
    }

    fn test_app_settings(&self) -> Vec<TestAppSettings> {
        vec![TestAppSettings::default()]
    }

    async fn dispose_async_core(&self) -> anyhow::Result<()> {
        self.service.dispose_async().await;
        Ok(())
    }
}
