//! # Relay Runtime Configuration
//!
//! Centralized, typed configuration for the relay runtime.
//!
//! ## Features
//!
//! - **Inbound ports**: routing strategy, handler references, concurrency limits
//! - **Outbound ports**: ordered targets with adapter, load balancing and adapter config
//! - **Middleware**: timeout and observability toggles
//! - **Logging**: level and output format, overridable through `RELAY_LOG_LEVEL`
//!
//! ## Usage
//!
//! ```rust
//! use config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//!     [ports.orders]
//!     max_concurrent = 4
//!     handlers = ["orders::create"]
//! "#).unwrap();
//!
//! assert_eq!(config.port("orders").unwrap().max_concurrent, Some(4));
//! ```

pub mod runtime_config;

pub use runtime_config::{
    LoggingConfig, MiddlewareConfig, ObservabilityConfig, OutboundPortConfig, PortConfig,
    RuntimeConfig, TargetConfig, TimeoutConfig, LOG_LEVEL_ENV,
};
