//! Span collector
//!
//! The tracer owns every span created in-process. Spans are append-only until
//! [`Tracer::reset`] is called; envelopes only hold weak references, so
//! resetting the tracer is what ends a span's storage lifetime.

use super::context::TraceIds;
use super::ids::{generate_span_id, generate_trace_id};
use super::span::{Span, SpanRecord};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

static GLOBAL_TRACER: Lazy<Arc<Tracer>> = Lazy::new(|| Arc::new(Tracer::new()));

/// In-process span collector
#[derive(Debug, Default)]
pub struct Tracer {
    spans: RwLock<Vec<Arc<Span>>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide tracer for top-level wiring. Components should take an
    /// `Arc<Tracer>` instead of calling this.
    pub fn global() -> Arc<Tracer> {
        Arc::clone(&GLOBAL_TRACER)
    }

    /// Start a span. With a parent context carrying a trace id the span joins
    /// that trace as a child of the parent's span id; otherwise it roots a new
    /// trace.
    pub fn start_span(&self, name: impl Into<String>, parent: Option<&TraceIds>) -> Arc<Span> {
        let (trace_id, parent_span_id) = match parent.and_then(|p| p.trace_id.clone()) {
            Some(trace_id) => (trace_id, parent.and_then(|p| p.span_id.clone())),
            None => (generate_trace_id(), None),
        };

        let span = Arc::new(Span::new(
            name,
            trace_id,
            generate_span_id(),
            parent_span_id,
        ));
        debug!(
            "Span started: {} trace={} span={}",
            span.name(),
            span.trace_id(),
            span.span_id()
        );

        self.spans.write().push(Arc::clone(&span));
        span
    }

    /// Start a span that roots a new trace
    pub fn start_root_span(&self, name: impl Into<String>) -> Arc<Span> {
        self.start_span(name, None)
    }

    /// All spans, in creation order
    pub fn spans(&self) -> Vec<Arc<Span>> {
        self.spans.read().clone()
    }

    pub fn finished_spans(&self) -> Vec<Arc<Span>> {
        self.spans
            .read()
            .iter()
            .filter(|span| span.is_finished())
            .cloned()
            .collect()
    }

    pub fn spans_for_trace(&self, trace_id: &str) -> Vec<Arc<Span>> {
        self.spans
            .read()
            .iter()
            .filter(|span| span.trace_id() == trace_id)
            .cloned()
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Vec<Arc<Span>> {
        self.spans
            .read()
            .iter()
            .filter(|span| span.name() == name)
            .cloned()
            .collect()
    }

    /// Exportable snapshot of every span
    pub fn snapshot(&self) -> Vec<SpanRecord> {
        self.spans.read().iter().map(|span| span.record()).collect()
    }

    pub fn len(&self) -> usize {
        self.spans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.read().is_empty()
    }

    /// Drop every collected span
    pub fn reset(&self) {
        let mut spans = self.spans.write();
        debug!("Tracer reset, dropping {} spans", spans.len());
        spans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_child_spans_share_trace() {
        let tracer = Tracer::new();
        let root = tracer.start_root_span("root");
        let child = tracer.start_span("child", Some(&root.ids()));

        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(tracer.spans_for_trace(root.trace_id()).len(), 2);
    }

    #[test]
    fn test_parent_without_trace_id_roots_new_trace() {
        let tracer = Tracer::new();
        let parent = TraceIds {
            trace_id: None,
            span_id: Some("abc".to_string()),
            parent_span_id: None,
        };
        let span = tracer.start_span("orphan", Some(&parent));
        assert!(span.parent_span_id().is_none());
    }

    #[test]
    fn test_isolated_instances_and_reset() {
        let a = Tracer::new();
        let b = Tracer::new();
        a.start_root_span("one");
        a.start_root_span("two").finish();

        assert_eq!(a.len(), 2);
        assert!(b.is_empty());
        assert_eq!(a.finished_spans().len(), 1);
        assert_eq!(a.find_by_name("two").len(), 1);

        a.reset();
        assert!(a.is_empty());
    }

    #[test]
    fn test_snapshot_is_serialisable() {
        let tracer = Tracer::new();
        let span = tracer.start_root_span("export");
        span.set_tag("k", "v");
        span.finish();

        let json = serde_json::to_string(&tracer.snapshot()).unwrap();
        assert!(json.contains("\"export\""));
        assert!(json.contains("\"k\":\"v\""));
    }
}
