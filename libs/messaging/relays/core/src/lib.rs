//! # Relay Core
//!
//! In-process inbound routing: the port registry and its routing strategies,
//! the handler table used at bootstrap, and the request pipeline with its
//! middleware chain and per-port concurrency gates.
//!
//! ## Flow
//!
//! ```text
//! adapter -> Envelope -> Pipeline::process -> middleware chain
//!         -> PortRegistry (HandlerLoader) -> RoutingStrategy -> handler(s)
//!         -> Envelope -> adapter
//! ```

pub mod common;
pub mod handler;
pub mod loader;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod strategy;

pub use common::{RelayError, RelayResult};
pub use handler::{handler_fn, FnHandler, Handler, SharedHandler};
pub use loader::HandlerTable;
pub use metrics::{Outcome, PipelineMetrics, PortMetricsSnapshot, LATENCY_BUCKETS_MS};
pub use middleware::{
    Middleware, MiddlewareChain, Next, ObservabilityMiddleware, TimeoutMiddleware,
};
pub use pipeline::{
    keys as context_keys, ConcurrencyGates, ContextValue, GatePermit, Pipeline, PipelineContext,
};
pub use registry::{aggregate, HandlerLoader, PortInfo, PortRegistry};
pub use strategy::{
    strategy_for, BroadcastStrategy, FirstStrategy, RoundRobinStrategy, RoutingStrategy,
};

use std::any::Any;

/// Human-readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
