//! # Relay Runtime Types
//!
//! Shared vocabulary for every relay runtime component.
//!
//! ## Contents
//!
//! - **Envelope**: the protocol-agnostic request/response container that every
//!   adapter, handler and outbound target exchanges
//! - **Policies**: closed discriminators for inbound routing strategies and
//!   outbound load balancing
//! - **Trace**: header codecs (native, B3, W3C), spans and the in-process span
//!   collector
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Envelope, Tracer};
//! use serde_json::json;
//!
//! let tracer = Tracer::new();
//! let mut request = Envelope::new("/orders").with_port("orders");
//! let span = request.start_span(&tracer, "orders.handle");
//!
//! let mut response = Envelope::success(json!({"id": 7}));
//! response.adopt_span(&span);
//! response.finish_span();
//! assert!(span.is_finished());
//! ```

pub mod common;
pub mod envelope;
pub mod trace;

pub use common::errors::{TypesError, TypesResult};
pub use common::policy::{LoadBalancing, StrategyKind};
pub use envelope::{
    keys as metadata_keys, Envelope, STATUS_BAD_REQUEST, STATUS_GATEWAY_TIMEOUT,
    STATUS_INTERNAL_ERROR, STATUS_NOT_FOUND, STATUS_OK,
};
pub use trace::{Span, SpanRecord, TraceFormat, TraceIds, Tracer};
