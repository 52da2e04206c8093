pub mod finalizer_race;
pub mod get_or_create;
pub mod snapshot;
pub mod stress;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stand-in for a native object handed out to several proxies.
pub struct Database {
    pub url: String,
    destroyed: Arc<AtomicU64>,
}

impl Database {
    pub fn new(url: impl Into<String>, destroyed: Arc<AtomicU64>) -> Self {
        Self {
            url: url.into(),
            destroyed,
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(url = self.url.as_str(), "database destroyed");
    }
}
