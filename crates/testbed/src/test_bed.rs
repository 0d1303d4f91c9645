//! Per-test wrapper around a shared fixture

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn, Level};

use crate::error::{TestBedError, TestBedResult};
use crate::fixture::{Fixture, TestBedFixture};
use crate::logging::{output_subscriber, TestOutput};

type ClearHook = Box<dyn FnOnce() + Send>;
type AsyncHook = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// One test's view of a fixture: its output channel plus teardown hooks
pub struct TestBed<F: TestBedFixture> {
    output: Arc<dyn TestOutput>,
    fixture: Arc<Fixture<F>>,
    clear_hooks: Mutex<Vec<ClearHook>>,
    async_hooks: Mutex<Vec<AsyncHook>>,
    disposed: AtomicBool,
    disposed_async: AtomicBool,
}

impl<F: TestBedFixture> TestBed<F> {
    pub fn new(output: Arc<dyn TestOutput>, fixture: Arc<Fixture<F>>) -> Self {
        Self {
            output,
            fixture,
            clear_hooks: Mutex::new(Vec::new()),
            async_hooks: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            disposed_async: AtomicBool::new(false),
        }
    }

    pub fn output(&self) -> &Arc<dyn TestOutput> {
        &self.output
    }

    pub fn fixture(&self) -> &Arc<Fixture<F>> {
        &self.fixture
    }

    /// Run `hook` when the test bed is disposed
    pub fn on_clear(&self, hook: impl FnOnce() + Send + 'static) {
        self.clear_hooks.lock().push(Box::new(hook));
    }

    /// Run `hook` when the test bed is disposed asynchronously
    pub fn on_dispose_async<H, Fut>(&self, hook: H)
    where
        H: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.async_hooks
            .lock()
            .push(Box::new(move || -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(hook())
            }));
    }

    /// Route `tracing` events from this thread to the test output until the guard drops
    pub fn trace_output(&self, level: Level) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(output_subscriber(self.output.clone(), level))
    }

    /// Run the clear hooks once, in registration order
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.clear_hooks.lock());
        debug!(hooks = hooks.len(), "Clearing test bed");
        for hook in hooks {
            hook();
        }
    }

    /// Run the asynchronous hooks once, in registration order.
    ///
    /// Every hook runs even if an earlier one fails; the first failure is returned.
    pub async fn dispose_async(&self) -> TestBedResult<()> {
        if self.disposed_async.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let hooks = std::mem::take(&mut *self.async_hooks.lock());
        let mut first_failure = None;
        for hook in hooks {
            if let Err(err) = hook().await {
                warn!(error = %err, "Asynchronous test bed teardown failed");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(TestBedError::Teardown(err)),
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<F: TestBedFixture> Drop for TestBed<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}
