//! # Relays
//!
//! Protocol-agnostic routing runtime. Adapters turn protocol requests into
//! [`Envelope`](types::Envelope)s and hand them to [`Runtime::process`];
//! application code sends outbound traffic with [`Runtime::emit`] and
//! [`Runtime::deliver`].
//!
//! ```text
//! inbound:  adapter -> Runtime::process -> Pipeline -> PortRegistry -> handler(s)
//! outbound: Runtime::emit -> OutboundRouteRegistry -> OutboundAdapter
//! ```
//!
//! Wiring normally comes from a TOML [`RuntimeConfig`](config::RuntimeConfig)
//! through [`Runtime::from_config`].

pub use message_sink as sink;
pub use relay_core as core;

pub mod logging;
pub mod runtime;

pub use runtime::{Runtime, RuntimeBuilder};
