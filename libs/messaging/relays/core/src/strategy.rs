//! Inbound routing strategies
//!
//! A strategy decides which of a port's handlers receive an envelope:
//! - **First**: only the first registered handler; its error propagates as is
//! - **Broadcast**: every handler concurrently, failures isolated per handler
//! - **RoundRobin**: one handler per call, rotating through the list

use crate::common::{RelayError, RelayResult};
use crate::handler::SharedHandler;
use async_trait::async_trait;
use futures::future::{self, FutureExt};
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{Envelope, StrategyKind, STATUS_INTERNAL_ERROR};

/// Dispatch algorithm over a port's handler list
#[async_trait]
pub trait RoutingStrategy: Send + Sync + Debug {
    fn kind(&self) -> StrategyKind;

    /// Invoke the selected handler(s) and collect their responses
    async fn dispatch(
        &self,
        handlers: &[SharedHandler],
        envelope: Envelope,
    ) -> RelayResult<Vec<Envelope>>;
}

/// Build a fresh strategy instance (with its own cursor) for `kind`
pub fn strategy_for(kind: StrategyKind) -> Arc<dyn RoutingStrategy> {
    match kind {
        StrategyKind::First => Arc::new(FirstStrategy),
        StrategyKind::Broadcast => Arc::new(BroadcastStrategy),
        StrategyKind::RoundRobin => Arc::new(RoundRobinStrategy::new()),
    }
}

fn no_handlers() -> RelayError {
    RelayError::config("port has no handlers bound")
}

/// Invoke only the first handler
#[derive(Debug, Default)]
pub struct FirstStrategy;

#[async_trait]
impl RoutingStrategy for FirstStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::First
    }

    async fn dispatch(
        &self,
        handlers: &[SharedHandler],
        envelope: Envelope,
    ) -> RelayResult<Vec<Envelope>> {
        let handler = handlers.first().ok_or_else(no_handlers)?;
        let response = handler.handle(envelope).await?;
        Ok(vec![response])
    }
}

/// Invoke every handler, converting individual failures into 500 envelopes
#[derive(Debug, Default)]
pub struct BroadcastStrategy;

#[async_trait]
impl RoutingStrategy for BroadcastStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Broadcast
    }

    async fn dispatch(
        &self,
        handlers: &[SharedHandler],
        envelope: Envelope,
    ) -> RelayResult<Vec<Envelope>> {
        if handlers.is_empty() {
            return Err(no_handlers());
        }

        // join_all keeps input order regardless of completion order
        let calls = handlers.iter().map(|handler| {
            AssertUnwindSafe(handler.handle(envelope.clone())).catch_unwind()
        });
        let outcomes = future::join_all(calls).await;

        let mut failures = 0;
        let responses: Vec<Envelope> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    failures += 1;
                    warn!("Broadcast handler {} failed: {:#}", index, err);
                    Envelope::error(STATUS_INTERNAL_ERROR, err.to_string())
                }
                Err(panic) => {
                    failures += 1;
                    let message = crate::panic_message(panic.as_ref());
                    warn!("Broadcast handler {} panicked: {}", index, message);
                    Envelope::error(STATUS_INTERNAL_ERROR, message)
                }
            })
            .collect();

        debug!(
            "Broadcast to {} handlers: {} failed",
            responses.len(),
            failures
        );
        Ok(responses)
    }
}

/// Invoke one handler per call, rotating through the list
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of selections made so far
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    fn select(&self, len: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }
}

#[async_trait]
impl RoutingStrategy for RoundRobinStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    async fn dispatch(
        &self,
        handlers: &[SharedHandler],
        envelope: Envelope,
    ) -> RelayResult<Vec<Envelope>> {
        if handlers.is_empty() {
            return Err(no_handlers());
        }
        let index = self.select(handlers.len());
        let response = handlers[index].handle(envelope).await?;
        Ok(vec![response])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use anyhow::anyhow;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn returning(n: u64) -> SharedHandler {
        handler_fn(move |_request: Envelope| async move {
            anyhow::Ok(Envelope::success(json!({ "n": n })))
        })
    }

    fn failing(message: &'static str) -> SharedHandler {
        handler_fn(move |_request: Envelope| async move {
            Err::<Envelope, _>(anyhow!(message))
        })
    }

    #[tokio::test]
    async fn test_first_invokes_only_first() {
        let handlers = vec![returning(1), returning(2)];
        let responses = FirstStrategy
            .dispatch(&handlers, Envelope::new("/x"))
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data, Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn test_first_propagates_handler_error() {
        let handlers = vec![failing("first failed"), returning(2)];
        let err = FirstStrategy
            .dispatch(&handlers, Envelope::new("/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Handler(_)));
        assert_eq!(err.to_string(), "first failed");
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures_in_order() {
        let handlers = vec![returning(1), failing("second failed"), returning(3)];
        let responses = BroadcastStrategy
            .dispatch(&handlers, Envelope::new("/x"))
            .await
            .unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].data, Some(json!({ "n": 1 })));
        assert_eq!(responses[1].status_code, 500);
        assert_eq!(responses[1].error_message.as_deref(), Some("second failed"));
        assert_eq!(responses[2].data, Some(json!({ "n": 3 })));
    }

    #[tokio::test]
    async fn test_broadcast_order_ignores_completion_time() {
        let slow = handler_fn(|_request: Envelope| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            anyhow::Ok(Envelope::success(json!("slow")))
        });
        let fast = handler_fn(|_request: Envelope| async move {
            anyhow::Ok(Envelope::success(json!("fast")))
        });

        let responses = BroadcastStrategy
            .dispatch(&[slow, fast], Envelope::new("/x"))
            .await
            .unwrap();
        assert_eq!(responses[0].data, Some(json!("slow")));
        assert_eq!(responses[1].data, Some(json!("fast")));
    }

    #[tokio::test]
    async fn test_broadcast_contains_panics() {
        let panicking = handler_fn(|_request: Envelope| async move {
            if true {
                panic!("handler exploded");
            }
            anyhow::Ok(Envelope::success(json!(null)))
        });

        let responses = BroadcastStrategy
            .dispatch(&[panicking, returning(2)], Envelope::new("/x"))
            .await
            .unwrap();
        assert_eq!(responses[0].status_code, 500);
        assert_eq!(responses[0].error_message.as_deref(), Some("handler exploded"));
        assert!(responses[1].is_success());
    }

    #[tokio::test]
    async fn test_round_robin_rotates() {
        let handlers = vec![returning(0), returning(1), returning(2)];
        let strategy = RoundRobinStrategy::new();

        let mut seen = Vec::new();
        for _ in 0..6 {
            let responses = strategy
                .dispatch(&handlers, Envelope::new("/x"))
                .await
                .unwrap();
            assert_eq!(responses.len(), 1);
            seen.push(responses[0].data.clone().unwrap()["n"].as_u64().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(strategy.position(), 6);
    }

    #[tokio::test]
    async fn test_empty_handler_list_is_config_error() {
        for kind in [
            StrategyKind::First,
            StrategyKind::Broadcast,
            StrategyKind::RoundRobin,
        ] {
            let err = strategy_for(kind)
                .dispatch(&[], Envelope::new("/x"))
                .await
                .unwrap_err();
            assert!(matches!(err, RelayError::Config(_)));
        }
    }

    proptest! {
        #[test]
        fn prop_round_robin_selects_modulo(len in 1usize..16, calls in 1usize..64) {
            let strategy = RoundRobinStrategy::new();
            for call in 0..calls {
                prop_assert_eq!(strategy.select(len), call % len);
            }
        }
    }
}
