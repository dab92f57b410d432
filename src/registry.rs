//! A name-keyed cache of alerters.
//!
//! [`AlerterRegistry`] can be created and passed around explicitly. For code
//! that prefers looking alerters up by name from anywhere, [`global`] holds a
//! lazily created process-wide instance.

use crate::alerter::Alerter;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tracing::debug;

static GLOBAL_REGISTRY: LazyLock<AlerterRegistry> = LazyLock::new(AlerterRegistry::new);

/// Maps names to alerters, creating each on first request.
///
/// Entries are never evicted: every lookup of the same name returns the same
/// `Arc`.
#[derive(Debug, Default)]
pub struct AlerterRegistry {
    alerters: Mutex<HashMap<String, Arc<Alerter>>>,
}

impl AlerterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the alerter named `key`, creating it (with its default log
    /// handler) if this is the first request for that name.
    pub fn get_alerter(&self, key: &str) -> Arc<Alerter> {
        let mut alerters = self.lock();
        if let Some(alerter) = alerters.get(key) {
            return alerter.clone();
        }
        debug!(alerter = key, "Creating alerter");
        let alerter = Arc::new(Alerter::new(key));
        alerters.insert(key.to_string(), alerter.clone());
        alerter
    }

    /// Whether an alerter named `key` has been created.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Names of all created alerters, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Alerter>>> {
        self.alerters.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// The process-wide registry.
pub fn global() -> &'static AlerterRegistry {
    &GLOBAL_REGISTRY
}

/// Looks up `key` in the process-wide registry.
pub fn get_alerter(key: &str) -> Arc<Alerter> {
    global().get_alerter(key)
}
