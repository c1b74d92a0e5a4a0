//! # Request Pipeline
//!
//! The single inbound entry point. For each envelope the pipeline:
//!
//! 1. reads `metadata["port_name"]` (missing: 400, no handler runs)
//! 2. resolves the port's handler through the [`HandlerLoader`] (unknown: 404)
//! 3. waits for a permit from the port's concurrency gate
//! 4. runs the middleware chain around the handler
//! 5. releases the permit and returns the response
//!
//! Errors and panics from handlers or middleware are converted into error
//! envelopes; callers of [`Pipeline::process`] never see them raw.

pub mod context;
pub mod gates;

pub use context::{keys, ContextValue, PipelineContext, DEFAULT_STAGE};
pub use gates::{ConcurrencyGates, GatePermit};

use crate::common::RelayError;
use crate::middleware::{Middleware, MiddlewareChain, Next};
use crate::registry::HandlerLoader;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};
use types::{Envelope, STATUS_INTERNAL_ERROR};

/// Inbound request orchestrator
#[derive(Clone)]
pub struct Pipeline {
    loader: Arc<dyn HandlerLoader>,
    middleware: MiddlewareChain,
    gates: Arc<ConcurrencyGates>,
    stage: String,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware_names())
            .field("gates", &self.gates)
            .field("stage", &self.stage)
            .finish()
    }
}

impl Pipeline {
    pub fn new(loader: Arc<dyn HandlerLoader>) -> Self {
        Self {
            loader,
            middleware: Vec::<Arc<dyn Middleware>>::new().into(),
            gates: Arc::new(ConcurrencyGates::new()),
            stage: DEFAULT_STAGE.to_string(),
        }
    }

    /// Append a middleware; the first added is the outermost
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        let mut chain = self.middleware.to_vec();
        chain.push(middleware);
        self.middleware = chain.into();
        self
    }

    pub fn with_gates(mut self, gates: Arc<ConcurrencyGates>) -> Self {
        self.gates = gates;
        self
    }

    /// Stage label given to every request context
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn gates(&self) -> &Arc<ConcurrencyGates> {
        &self.gates
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware
            .iter()
            .map(|middleware| middleware.name().to_string())
            .collect()
    }

    /// Process one inbound envelope into a response envelope
    pub async fn process(&self, envelope: Envelope) -> Envelope {
        let Some(port_name) = envelope.port_name().map(str::to_string) else {
            warn!("Rejected {}: missing port_name metadata", envelope.path);
            let mut response =
                RelayError::validation("missing port_name in envelope metadata").to_envelope();
            response.inherit_trace(&envelope);
            return response;
        };

        let handler = match self.loader.load(&port_name) {
            Ok(handler) => handler,
            Err(err) => {
                warn!("Cannot route {} to port {}: {}", envelope.path, port_name, err);
                let mut response = err.to_envelope();
                response.inherit_trace(&envelope);
                return response;
            }
        };

        let _permit = self.gates.acquire(&port_name).await;
        debug!(
            "Admitted {} on port {} ({} in flight)",
            envelope.path,
            port_name,
            self.gates.in_flight(&port_name)
        );

        let mut ctx = PipelineContext::new(envelope, port_name).with_stage(self.stage.clone());
        let next = Next::new(Arc::clone(&self.middleware), handler);
        let outcome = AssertUnwindSafe(next.run(&mut ctx)).catch_unwind().await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                error!(
                    "Handler failed on port {} (path {}, trace {}): {:#}",
                    ctx.port_name,
                    ctx.envelope.path,
                    ctx.envelope.trace_id.as_deref().unwrap_or("-"),
                    err
                );
                let mut response = RelayError::envelope_for(&err);
                response.inherit_trace(&ctx.envelope);
                response
            }
            Err(panic) => {
                let message = crate::panic_message(panic.as_ref());
                error!(
                    "Handler panicked on port {} (path {}): {}",
                    ctx.port_name, ctx.envelope.path, message
                );
                let mut response = Envelope::error(STATUS_INTERNAL_ERROR, message);
                response.inherit_trace(&ctx.envelope);
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::registry::PortRegistry;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use types::StrategyKind;

    fn registry_with(port: &str, handler: crate::handler::SharedHandler) -> Arc<PortRegistry> {
        let registry = Arc::new(PortRegistry::new());
        registry.register_handler(port, handler);
        registry
    }

    #[tokio::test]
    async fn test_missing_port_name_is_400() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = handler_fn(move |_request: Envelope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { anyhow::Ok(Envelope::success(json!(null))) }
        });
        let pipeline = Pipeline::new(registry_with("p", handler));

        let response = pipeline.process(Envelope::new("/x")).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_port_is_404() {
        let pipeline = Pipeline::new(Arc::new(PortRegistry::new()));
        let response = pipeline
            .process(Envelope::new("/x").with_port("ghost"))
            .await;
        assert_eq!(response.status_code, 404);
        assert!(response.error_message.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_success() {
        let handler = handler_fn(|request: Envelope| async move {
            anyhow::Ok(Envelope::success(json!({ "path": request.path })))
        });
        let pipeline = Pipeline::new(registry_with("orders", handler));

        let response = pipeline
            .process(Envelope::new("/orders/1").with_port("orders"))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.data, Some(json!({ "path": "/orders/1" })));
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let handler = handler_fn(|_request: Envelope| async move {
            Err::<Envelope, _>(anyhow!("payment gateway unreachable"))
        });
        let pipeline = Pipeline::new(registry_with("pay", handler));

        let response = pipeline
            .process(Envelope::new("/pay").with_port("pay"))
            .await;
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.error_message.as_deref(),
            Some("payment gateway unreachable")
        );
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_handler_panic_is_500() {
        let handler = handler_fn(|request: Envelope| async move {
            if request.path == "/boom" {
                panic!("unexpected state");
            }
            anyhow::Ok(Envelope::success(json!(null)))
        });
        let pipeline = Pipeline::new(registry_with("p", handler));

        let response = pipeline.process(Envelope::new("/boom").with_port("p")).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.error_message.as_deref(), Some("unexpected state"));
        assert_eq!(pipeline.gates().in_flight("p"), 0);
    }

    #[tokio::test]
    async fn test_broadcast_port_aggregates() {
        let registry = Arc::new(PortRegistry::new());
        for n in [1, 2] {
            registry.register_handler(
                "fan",
                handler_fn(move |_request: Envelope| async move {
                    anyhow::Ok(Envelope::success(json!({ "n": n })))
                }),
            );
        }
        registry.set_strategy("fan", StrategyKind::Broadcast).unwrap();
        let pipeline = Pipeline::new(registry);

        let response = pipeline.process(Envelope::new("/x").with_port("fan")).await;
        assert_eq!(response.data, Some(json!([{ "n": 1 }, { "n": 2 }])));
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (active_h, peak_h) = (Arc::clone(&active), Arc::clone(&peak));
        let handler = handler_fn(move |_request: Envelope| {
            let (active, peak) = (Arc::clone(&active_h), Arc::clone(&peak_h));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(Envelope::success(json!(null)))
            }
        });

        let gates = Arc::new(ConcurrencyGates::with_limits([("slow", 2)]).unwrap());
        let pipeline = Pipeline::new(registry_with("slow", handler)).with_gates(gates);

        let calls = (0..5).map(|_| pipeline.process(Envelope::new("/x").with_port("slow")));
        let responses = futures::future::join_all(calls).await;

        assert!(responses.iter().all(Envelope::is_success));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.gates().in_flight("slow"), 0);
    }

    #[test]
    fn test_middleware_order_is_registration_order() {
        let pipeline = Pipeline::new(Arc::new(PortRegistry::new()))
            .with_middleware(Arc::new(crate::middleware::TimeoutMiddleware::new(
                config::TimeoutConfig::default(),
            )))
            .with_stage("ingress");
        assert_eq!(pipeline.middleware_names(), vec!["timeout"]);
    }
}
