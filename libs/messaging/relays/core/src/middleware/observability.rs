//! Observability middleware
//!
//! Opens a span per invocation (joining any trace context carried by the
//! request headers), exposes it to later middleware on the context, and
//! records pipeline metrics. The span is always finished: on success from the
//! response envelope, on error with the error tagged, and on unwinding by a
//! drop guard.

use super::{Middleware, Next};
use crate::metrics::{Outcome, PipelineMetrics};
use crate::pipeline::{keys, ContextValue, PipelineContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use types::trace::{extract_any, span::TAG_ERROR, span::TAG_ERROR_MESSAGE};
use types::{Envelope, Span, Tracer};

/// Finishes the span if the invocation unwinds before completing it
struct FinishOnDrop(Arc<Span>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if !self.0.is_finished() {
            self.0.set_tag(TAG_ERROR, "true");
            self.0.set_tag(TAG_ERROR_MESSAGE, "invocation aborted");
            self.0.finish();
        }
    }
}

/// Span and metrics per pipeline invocation
pub struct ObservabilityMiddleware {
    tracer: Arc<Tracer>,
    metrics: Arc<PipelineMetrics>,
}

impl ObservabilityMiddleware {
    pub fn new(tracer: Arc<Tracer>, metrics: Arc<PipelineMetrics>) -> Self {
        Self { tracer, metrics }
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl Middleware for ObservabilityMiddleware {
    fn name(&self) -> &str {
        "observability"
    }

    async fn handle(&self, ctx: &mut PipelineContext, next: Next) -> anyhow::Result<Envelope> {
        let incoming = extract_any(&ctx.envelope.headers);
        ctx.envelope.merge_trace_ids(&incoming);

        let port = ctx.port_name.clone();
        let span = ctx.envelope.start_span_with_tags(
            &self.tracer,
            format!("{}.{}", ctx.stage, port),
            [("port", port.as_str()), ("stage", ctx.stage.as_str())],
        );
        let guard = FinishOnDrop(Arc::clone(&span));
        ctx.set(keys::ACTIVE_SPAN, ContextValue::Span(Arc::clone(&span)));

        self.metrics.record_start(&port);
        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(mut response) => {
                response.inherit_trace(&ctx.envelope);
                response.adopt_span(&span);
                response.finish_span();

                let outcome = if response.is_timeout() || ctx.is_timed_out() {
                    Outcome::Timeout
                } else if response.is_error() {
                    Outcome::Failure
                } else {
                    Outcome::Success
                };
                self.metrics.record_outcome(&port, outcome, elapsed);
                debug!(
                    "Port {} completed with {} in {:?}",
                    port, response.status_code, elapsed
                );
                Ok(response)
            }
            Err(err) => {
                span.set_tag(TAG_ERROR, "true");
                span.set_tag(TAG_ERROR_MESSAGE, err.to_string());
                span.finish();
                self.metrics.record_outcome(&port, Outcome::Failure, elapsed);
                warn!("Port {} failed after {:?}: {:#}", port, elapsed, err);
                Err(err)
            }
        };
        drop(guard);
        outcome
    }
}
