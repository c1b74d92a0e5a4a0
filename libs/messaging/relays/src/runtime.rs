//! # Relay Runtime
//!
//! Boundary between adapters and the routing core.
//!
//! - **Inbound**: [`Runtime::process`] hands an envelope to the pipeline.
//! - **Outbound**: [`Runtime::emit`] (request/response) and
//!   [`Runtime::deliver`] (fire-and-forget) select a target through the
//!   outbound route registry, propagate trace context in the target's header
//!   format and call the target's adapter. Failover routes try each target in
//!   order and report one aggregated error when all of them fail.

use anyhow::Context;
use config::{MiddlewareConfig, RuntimeConfig};
use message_sink::{
    OutboundPortRegistry, OutboundRouteRegistry, OutboundTarget, SharedAdapter, SinkError,
};
use parking_lot::RwLock;
use relay_core::{
    ConcurrencyGates, HandlerTable, ObservabilityMiddleware, Pipeline, PipelineMetrics,
    PortRegistry, TimeoutMiddleware,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::trace::inject;
use types::{Envelope, Tracer};

/// Inbound pipeline plus outbound emit/deliver
pub struct Runtime {
    pipeline: Pipeline,
    ports: Arc<PortRegistry>,
    routes: Arc<OutboundRouteRegistry>,
    outbound_ports: Arc<OutboundPortRegistry>,
    adapters: RwLock<HashMap<String, SharedAdapter>>,
    tracer: Arc<Tracer>,
    metrics: Arc<PipelineMetrics>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pipeline", &self.pipeline)
            .field("ports", &self.ports.list_ports())
            .field("routes", &self.routes.list_routes())
            .field("adapters", &self.adapter_names())
            .finish()
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Wire a runtime from configuration.
    ///
    /// Handler references are resolved against `handlers` once, here. Any
    /// unknown reference, invalid target or limit fails the whole bootstrap.
    pub fn from_config(config: &RuntimeConfig, handlers: &HandlerTable) -> anyhow::Result<Self> {
        config.validate()?;

        let ports = Arc::new(PortRegistry::new());
        handlers
            .install(&config.ports, &ports)
            .context("Failed to bind inbound ports")?;

        let gates = ConcurrencyGates::with_limits(config.concurrency_limits())
            .context("Invalid port concurrency limits")?;

        let routes = Arc::new(OutboundRouteRegistry::new());
        for (name, outbound) in &config.outbound {
            let targets = outbound
                .targets
                .iter()
                .map(OutboundTarget::from_config)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Invalid targets for outbound port '{}'", name))?;
            routes
                .register_route(name.clone(), targets)
                .with_context(|| format!("Failed to register outbound port '{}'", name))?;
        }

        let runtime = Runtime::builder()
            .ports(ports)
            .routes(routes)
            .gates(Arc::new(gates))
            .middleware(config.middleware.clone())
            .build();
        info!(
            "Runtime ready: {} inbound port(s), {} outbound route(s)",
            runtime.ports.len(),
            runtime.routes.len()
        );
        Ok(runtime)
    }

    /// Inbound entry point; always returns an envelope
    pub async fn process(&self, envelope: Envelope) -> Envelope {
        self.pipeline.process(envelope).await
    }

    /// Register an outbound adapter under its name, replacing any previous one
    pub fn register_adapter(&self, adapter: SharedAdapter) {
        let name = adapter.name().to_string();
        if self.adapters.write().insert(name.clone(), adapter).is_some() {
            warn!("Replaced outbound adapter: {}", name);
        } else {
            info!("Registered outbound adapter: {}", name);
        }
    }

    pub fn adapter(&self, name: &str) -> Result<SharedAdapter, SinkError> {
        self.adapters
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SinkError::AdapterNotFound(name.to_string()))
    }

    /// Registered adapter names, sorted
    pub fn adapter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Request/response through the route's selected target
    pub async fn emit(&self, port: &str, envelope: Envelope) -> Result<Envelope, SinkError> {
        self.dispatch(port, envelope, |adapter, target, outbound| async move {
            adapter.request(&target, outbound).await
        })
        .await
    }

    /// Build the envelope with the port's factory, then [`emit`](Self::emit)
    pub async fn emit_with(&self, port: &str, payload: Value) -> Result<Envelope, SinkError> {
        let envelope = self.outbound_ports.build(port, payload)?;
        self.emit(port, envelope).await
    }

    /// Fire-and-forget through the route's selected target
    pub async fn deliver(&self, port: &str, envelope: Envelope) -> Result<(), SinkError> {
        self.dispatch(port, envelope, |adapter, target, outbound| async move {
            adapter.send(&target, outbound).await
        })
        .await
    }

    /// Build the envelope with the port's factory, then [`deliver`](Self::deliver)
    pub async fn deliver_with(&self, port: &str, payload: Value) -> Result<(), SinkError> {
        let envelope = self.outbound_ports.build(port, payload)?;
        self.deliver(port, envelope).await
    }

    async fn dispatch<T, F, Fut>(
        &self,
        port: &str,
        mut envelope: Envelope,
        call: F,
    ) -> Result<T, SinkError>
    where
        F: Fn(SharedAdapter, OutboundTarget, Envelope) -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let selection = self.routes.select_target(port, &envelope)?;
        let child = envelope.create_child_context();

        let mut attempts = Vec::new();
        for target in selection.candidates() {
            let mut outbound = envelope.clone();
            outbound.trace_id = child.trace_id.clone();
            outbound.span_id = child.span_id.clone();
            outbound.parent_span_id = child.parent_span_id.clone();
            inject(&child, &mut outbound.headers, target.trace_format());

            let result = match self.adapter(target.adapter_name()) {
                Ok(adapter) => call(adapter, target.clone(), outbound).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(value) => {
                    debug!("Outbound {} via {} succeeded", port, target.adapter_name());
                    return Ok(value);
                }
                Err(err) if selection.is_failover() => {
                    warn!(
                        "Outbound {} via {} failed, trying next target: {}",
                        port,
                        target.adapter_name(),
                        err
                    );
                    attempts.push(format!("{}: {}", target.adapter_name(), err));
                }
                Err(err) => {
                    warn!("Outbound {} via {} failed: {}", port, target.adapter_name(), err);
                    return Err(err);
                }
            }
        }

        Err(SinkError::FailoverExhausted {
            port: port.to_string(),
            attempts,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn ports(&self) -> &Arc<PortRegistry> {
        &self.ports
    }

    pub fn routes(&self) -> &Arc<OutboundRouteRegistry> {
        &self.routes
    }

    pub fn outbound_ports(&self) -> &Arc<OutboundPortRegistry> {
        &self.outbound_ports
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }
}

/// Assembles a [`Runtime`]. Every collaborator defaults to a fresh instance,
/// so runtimes built in tests never share state.
#[derive(Default)]
pub struct RuntimeBuilder {
    ports: Option<Arc<PortRegistry>>,
    routes: Option<Arc<OutboundRouteRegistry>>,
    outbound_ports: Option<Arc<OutboundPortRegistry>>,
    gates: Option<Arc<ConcurrencyGates>>,
    tracer: Option<Arc<Tracer>>,
    metrics: Option<Arc<PipelineMetrics>>,
    middleware: MiddlewareConfig,
}

impl RuntimeBuilder {
    pub fn ports(mut self, ports: Arc<PortRegistry>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn routes(mut self, routes: Arc<OutboundRouteRegistry>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn outbound_ports(mut self, outbound_ports: Arc<OutboundPortRegistry>) -> Self {
        self.outbound_ports = Some(outbound_ports);
        self
    }

    pub fn gates(mut self, gates: Arc<ConcurrencyGates>) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn middleware(mut self, middleware: MiddlewareConfig) -> Self {
        self.middleware = middleware;
        self
    }

    /// Observability (when enabled) wraps timeout (when enabled), so timed
    /// out requests are still traced and counted.
    pub fn build(self) -> Runtime {
        let ports = self.ports.unwrap_or_default();
        let tracer = self.tracer.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();

        let mut pipeline = Pipeline::new(ports.clone()).with_gates(self.gates.unwrap_or_default());
        if self.middleware.observability.enabled {
            pipeline = pipeline.with_middleware(Arc::new(ObservabilityMiddleware::new(
                Arc::clone(&tracer),
                Arc::clone(&metrics),
            )));
        }
        if self.middleware.timeout.enabled {
            pipeline = pipeline.with_middleware(Arc::new(TimeoutMiddleware::new(
                self.middleware.timeout.clone(),
            )));
        }

        Runtime {
            pipeline,
            ports,
            routes: self.routes.unwrap_or_default(),
            outbound_ports: self.outbound_ports.unwrap_or_default(),
            adapters: RwLock::new(HashMap::new()),
            tracer,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use message_sink::test_utils::{CollectorAdapter, FailingAdapter};
    use relay_core::handler_fn;
    use serde_json::json;

    fn failover_runtime(first: SharedAdapter, second: SharedAdapter) -> Runtime {
        let runtime = Runtime::builder().build();
        runtime
            .routes()
            .register_route(
                "billing",
                vec![
                    OutboundTarget::simple(first.name(), "failover").unwrap(),
                    OutboundTarget::simple(second.name(), "failover").unwrap(),
                ],
            )
            .unwrap();
        runtime.register_adapter(first);
        runtime.register_adapter(second);
        runtime
    }

    #[tokio::test]
    async fn test_process_delegates_to_pipeline() {
        let runtime = Runtime::builder().build();
        runtime.ports().register_handler(
            "echo",
            handler_fn(|request: Envelope| async move {
                anyhow::Ok(Envelope::success(json!({ "path": request.path })))
            }),
        );

        let response = runtime.process(Envelope::new("/e").with_port("echo")).await;
        assert_eq!(response.data, Some(json!({ "path": "/e" })));
        assert_eq!(runtime.metrics().snapshot("echo").unwrap().succeeded, 1);
        assert_eq!(runtime.tracer().find_by_name("pipeline.echo").len(), 1);
    }

    #[tokio::test]
    async fn test_failover_uses_next_target() {
        let failing = Arc::new(FailingAdapter::new("primary"));
        let collector = Arc::new(CollectorAdapter::new("secondary"));
        let runtime = failover_runtime(failing.clone(), collector.clone());

        let response = runtime
            .emit("billing", Envelope::new("/charge").with_body(json!(10)))
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({ "adapter": "secondary", "echo": 10 })));
        assert_eq!(failing.attempts(), 1);
        assert_eq!(collector.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_failover_exhaustion_is_aggregated() {
        let runtime = failover_runtime(
            Arc::new(FailingAdapter::with_reason("primary", "refused")),
            Arc::new(FailingAdapter::with_reason("secondary", "timed out")),
        );

        let err = runtime
            .deliver("billing", Envelope::new("/charge"))
            .await
            .unwrap_err();
        match err {
            SinkError::FailoverExhausted { port, attempts } => {
                assert_eq!(port, "billing");
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].contains("refused"));
                assert!(attempts[1].contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_adapter_and_route() {
        let runtime = Runtime::builder().build();
        runtime
            .routes()
            .register_route("out", vec![OutboundTarget::simple("ghost", "first").unwrap()])
            .unwrap();

        assert_eq!(
            runtime.emit("out", Envelope::new("/x")).await.unwrap_err(),
            SinkError::AdapterNotFound("ghost".to_string())
        );
        assert_eq!(
            runtime.emit("nowhere", Envelope::new("/x")).await.unwrap_err(),
            SinkError::NoTargets("nowhere".to_string())
        );
        assert_eq!(
            runtime.emit_with("nowhere", json!(null)).await.unwrap_err(),
            SinkError::PortNotFound("nowhere".to_string())
        );
    }

    #[tokio::test]
    async fn test_emit_with_uses_factory() {
        let runtime = Runtime::builder().build();
        let collector = Arc::new(CollectorAdapter::new("memory"));
        runtime.register_adapter(collector.clone());
        runtime
            .routes()
            .register_route("audit", vec![OutboundTarget::simple("memory", "first").unwrap()])
            .unwrap();
        runtime
            .outbound_ports()
            .register_port("audit", |payload| Envelope::new("/audit").with_body(payload));

        runtime.deliver_with("audit", json!({ "event": "login" })).await.unwrap();

        let sent = collector.envelopes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/audit");
        assert_eq!(sent[0].body, Some(json!({ "event": "login" })));
        assert!(sent[0].headers.contains_key("X-Trace-Id"));
    }

    #[test]
    fn test_builder_middleware_order() {
        let runtime = Runtime::builder()
            .middleware(MiddlewareConfig {
                timeout: config::TimeoutConfig::enabled(1.0),
                ..MiddlewareConfig::default()
            })
            .build();
        assert_eq!(
            runtime.pipeline().middleware_names(),
            vec!["observability", "timeout"]
        );

        let bare = Runtime::builder()
            .middleware(MiddlewareConfig {
                observability: config::ObservabilityConfig { enabled: false },
                ..MiddlewareConfig::default()
            })
            .build();
        assert!(bare.pipeline().middleware_names().is_empty());
    }
}
