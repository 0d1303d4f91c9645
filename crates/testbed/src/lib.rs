//! Dependency injection for tests
//!
//! `testbed` wires a service container into shared test fixtures and builds
//! test subjects by resolving their constructor parameters from it.
//!
//! - [`fixture`]: [`TestBedFixture`] describes the services and settings of a
//!   fixture; [`Fixture`] hosts it and owns the container.
//! - [`factory`]: constructor selection for arbitrary types, mixing explicit
//!   values, the test output, the fixture itself and registry lookups.
//! - [`inject`]: field injection through [`Inject`].
//! - [`logging`]: loggers and a `tracing` writer that target the test output.
//! - [`settings`]: JSON settings files layered with environment variables.
//! - [`order`]: priority ordering of test cases.
//!
//! ```rust
//! use std::sync::Arc;
//! use testbed::{Configuration, Fixture, TestAppSettings, TestBedFixture, TestBedResult};
//! use testbed::logging::{NullOutput, TestOutput};
//! use testbed_di::DIContainer;
//!
//! struct Calculator;
//!
//! impl Calculator {
//!     fn add(&self, x: i32, y: i32) -> i32 {
//!         x + y
//!     }
//! }
//!
//! struct CalculatorFixture;
//!
//! impl TestBedFixture for CalculatorFixture {
//!     fn add_services(&self, services: &DIContainer, _: Option<&Configuration>) -> TestBedResult<()> {
//!         services.register_transient(|_| Ok(Arc::new(Calculator)))?;
//!         Ok(())
//!     }
//!
//!     fn test_app_settings(&self) -> Vec<TestAppSettings> {
//!         Vec::new()
//!     }
//! }
//!
//! let fixture = Fixture::new(CalculatorFixture).unwrap();
//! let output: Arc<dyn TestOutput> = Arc::new(NullOutput);
//! let calculator = fixture.get_service::<Calculator>(&output).unwrap().unwrap();
//! assert_eq!(calculator.add(2, 3), 5);
//! ```

pub mod error;
pub mod factory;
pub mod fixture;
pub mod inject;
pub mod logging;
pub mod order;
pub mod settings;
pub mod test_bed;

pub use error::{TestBedError, TestBedResult};
pub use factory::{create, create_instance, Arg, Construct, FactoryError, Parameter, TypeDescriptor};
pub use fixture::{AsyncServiceScope, Fixture, TestBedFixture};
pub use inject::{Inject, Injector, TestBedWithDi};
pub use order::{order_test_cases, OrderedTest, TestCase, TestOrder};
pub use settings::{configure_options, Configuration, Options, TestAppSettings};
pub use test_bed::TestBed;

pub use async_trait::async_trait;
