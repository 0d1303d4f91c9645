//! Transient, scoped and singleton lifetimes seen from a fixture

mod common;

use std::sync::Arc;

use common::{project_fixture, ScopedService, SingletonService, TransientService};
use testbed::factory::{Parameter, TypeDescriptor};
use testbed::logging::{NullOutput, TestOutput};
use testbed::{Inject, Injector, TestBedWithDi};

fn output() -> Arc<dyn TestOutput> {
    Arc::new(NullOutput)
}

#[test]
fn test_transient_services_are_new_each_time() {
    let fixture = project_fixture();

    let first = fixture.get_service::<TransientService>(&output()).unwrap().unwrap();
    let second = fixture.get_service::<TransientService>(&output()).unwrap().unwrap();

    assert_ne!(first.instance_id, second.instance_id);
}

#[test]
fn test_singleton_is_shared() {
    let fixture = project_fixture();

    let first = fixture.get_service::<SingletonService>(&output()).unwrap().unwrap();
    let second = fixture.get_service::<SingletonService>(&output()).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.instance_id, second.instance_id);
}

#[test]
fn test_scoped_service_is_stable_within_a_scope() {
    let scope = project_fixture().get_async_scope(&output()).unwrap();

    let first = scope.resolve::<ScopedService>().unwrap();
    let second = scope.resolve::<ScopedService>().unwrap();

    assert_eq!(first.instance_id, second.instance_id);
}

#[test]
fn test_scoped_service_differs_between_scopes() {
    let fixture = project_fixture();

    let first = fixture.get_scoped_service::<ScopedService>(&output()).unwrap().unwrap();
    let second = fixture.get_scoped_service::<ScopedService>(&output()).unwrap().unwrap();

    assert_ne!(first.instance_id, second.instance_id);
}

#[derive(Default)]
struct TwoScoped {
    first: Option<Arc<ScopedService>>,
    second: Option<Arc<ScopedService>>,
}

impl Inject for TwoScoped {
    fn inject(&mut self, injector: &Injector) {
        injector.fill(&mut self.first, None);
        injector.fill(&mut self.second, None);
    }
}

#[test]
fn test_scoped_service_from_fixture_is_one_instance() {
    let bed = TestBedWithDi::new(output(), project_fixture().clone());
    let injected: TwoScoped = bed.create();

    let first = injected.first.expect("first scoped field injected");
    let second = injected.second.expect("second scoped field injected");
    assert_eq!(first.instance_id, second.instance_id);

    let direct = bed.get_service::<ScopedService>().unwrap().unwrap();
    assert_eq!(direct.instance_id, first.instance_id);

    let descriptor = TypeDescriptor::<Arc<ScopedService>>::new()
        .constructor(vec![Parameter::of::<ScopedService>()], |args| {
            args.take::<ScopedService>()
        });
    let created = project_fixture()
        .create_test_instance_with(&descriptor, &output(), &[])
        .unwrap();
    assert_eq!(created.instance_id, first.instance_id);
}

#[tokio::test]
async fn test_async_scope_releases_its_services() {
    let scope = project_fixture().get_async_scope(&output()).unwrap();
    let service = scope.resolve::<ScopedService>().unwrap();
    assert_eq!(scope.scope().instance_count(), 1);

    scope.dispose_async().await;

    assert_eq!(Arc::strong_count(&service), 1);
}
