//! # Message Sink
//!
//! Outbound routing: where an emitted envelope goes and how it gets there.
//!
//! - [`OutboundTarget`]: adapter name, adapter config and load-balancing policy
//! - [`OutboundRouteRegistry`]: port name to targets, with first, round-robin
//!   and failover selection
//! - [`OutboundPortRegistry`]: port name to envelope factory
//! - [`OutboundAdapter`]: the protocol client boundary

pub mod adapter;
pub mod error;
pub mod registry;
pub mod routing;
pub mod target;
pub mod test_utils;

pub use adapter::{OutboundAdapter, SharedAdapter};
pub use error::SinkError;
pub use registry::{EnvelopeFactory, OutboundPortRegistry};
pub use routing::{OutboundRouteRegistry, Selection};
pub use target::{OutboundTarget, TRACE_FORMAT_KEY};
