//! Application state shared across request handlers.

use std::sync::Arc;

use crate::store::RunStore;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn RunStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store }),
        }
    }

    /// The Run store backing the API.
    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.inner.store
    }
}
