//! Where completed exchanges are delivered.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ExchangeError;

/// Receives the outcome of each token exchange.
pub trait ResponseHandler: Send + Sync {
    /// Called with the parsed response body, whatever the HTTP status.
    fn on_response(&self, response: &Value);

    /// Called when an exchange produced no JSON to deliver.
    fn on_error(&self, _error: &ExchangeError) {}
}

impl<F> ResponseHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn on_response(&self, response: &Value) {
        self(response)
    }
}

/// Single registration point for a [`ResponseHandler`].
///
/// Cloned slots share the registration. The handler is looked up when an
/// exchange completes, so it can be set before or after forms are bound
/// and swapped while requests are in flight.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    inner: Arc<RwLock<Option<Arc<dyn ResponseHandler>>>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(handler: impl ResponseHandler + 'static) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(Arc::new(handler)))),
        }
    }

    pub async fn register(&self, handler: impl ResponseHandler + 'static) {
        *self.inner.write().await = Some(Arc::new(handler));
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn current(&self) -> Option<Arc<dyn ResponseHandler>> {
        self.inner.read().await.clone()
    }
}
