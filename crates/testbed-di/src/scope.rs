//! Service scopes
//!
//! A scope owns one instance per scoped registration. Instances are dropped
//! when the scope is disposed or goes out of scope.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::key::{ServiceHandle, ServiceKey};
use crate::{DIError, DIResult};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work for scoped services
pub struct ServiceScope {
    id: u64,
    instances: Mutex<HashMap<ServiceKey, ServiceHandle>>,
    disposed: AtomicBool,
}

impl ServiceScope {
    /// Create a new, empty scope
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            instances: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of scoped instances created so far
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Return the cached instance for `key`, creating it with `create` on first use.
    ///
    /// The lock is not held while `create` runs so scoped factories may resolve
    /// other scoped services from the same scope. If two callers race, the
    /// first stored instance wins.
    pub(crate) fn get_or_create<F>(&self, key: &ServiceKey, create: F) -> DIResult<ServiceHandle>
    where
        F: FnOnce() -> DIResult<ServiceHandle>,
    {
        if self.is_disposed() {
            return Err(DIError::Disposed {
                what: format!("service scope {}", self.id),
            });
        }

        if let Some(existing) = self.instances.lock().get(key) {
            return Ok(existing.clone());
        }

        let created = create()?;
        let mut instances = self.instances.lock();
        let stored = instances.entry(key.clone()).or_insert(created);
        Ok(stored.clone())
    }

    /// Drop every scoped instance. Later resolutions through this scope fail.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = {
            let mut instances = self.instances.lock();
            let count = instances.len();
            instances.clear();
            count
        };
        debug!(scope = self.id, released, "Disposed service scope");
    }

    /// Asynchronous counterpart of [`ServiceScope::dispose`]
    pub async fn dispose_async(&self) {
        self.dispose();
    }
}

impl Default for ServiceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.id)
            .field("instances", &self.instance_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
