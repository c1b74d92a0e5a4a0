//! Distributed tracing primitives
//!
//! - [`context`] - header codecs for native, B3 and W3C vocabularies
//! - [`span`] - the in-process span and its exportable record
//! - [`tracer`] - the span collector
//! - [`ids`] - identifier generation

pub mod context;
pub mod ids;
pub mod span;
pub mod tracer;

pub use context::{detect_format, extract, extract_any, inject, TraceFormat, TraceIds};
pub use ids::{generate_span_id, generate_trace_id};
pub use span::{Span, SpanRecord};
pub use tracer::Tracer;
