//! Application handler abstraction
//!
//! Handlers receive the request envelope by value and return the response
//! envelope. Errors use `anyhow` so application code can attach context
//! freely; the pipeline converts them to 500 envelopes.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use types::Envelope;

/// Application request handler
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<Envelope>;
}

/// Shared handler value. Two clones of the same `Arc` are the same handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Adapts an async closure into a [`Handler`]
pub struct FnHandler<F> {
    func: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Envelope>> + Send,
{
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<Envelope> {
        (self.func)(envelope).await
    }
}

/// Wrap an async closure as a shared handler
///
/// ```rust
/// use relay_core::handler_fn;
/// use types::Envelope;
/// use serde_json::json;
///
/// let echo = handler_fn(|request: Envelope| async move {
///     anyhow::Ok(Envelope::success(request.body.unwrap_or(json!(null))))
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> SharedHandler
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Envelope>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_fn_success() {
        let handler = handler_fn(|request: Envelope| async move {
            anyhow::Ok(Envelope::success(json!({ "path": request.path })))
        });

        let response = handler.handle(Envelope::new("/orders")).await.unwrap();
        assert_eq!(response.data, Some(json!({ "path": "/orders" })));
    }

    #[test]
    fn test_handler_fn_error() {
        let handler = handler_fn(|_request: Envelope| async move {
            Err::<Envelope, _>(anyhow!("inventory service rejected the order"))
        });

        let err = tokio_test::block_on(handler.handle(Envelope::new("/orders"))).unwrap_err();
        assert_eq!(err.to_string(), "inventory service rejected the order");
    }
}
