//! Outbound targets
//!
//! A target names the adapter that carries the request, the adapter-specific
//! configuration, and the load-balancing policy of the route it belongs to.
//! Invalid policies are rejected when the target is built, never later.

use crate::SinkError;
use config::TargetConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use types::{LoadBalancing, TraceFormat};

/// Config key selecting the trace header vocabulary for a target
pub const TRACE_FORMAT_KEY: &str = "trace_format";

/// One remote destination of an outbound port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundTarget {
    adapter_name: String,
    config: Map<String, Value>,
    load_balancing: LoadBalancing,
    #[serde(skip)]
    trace_format: TraceFormat,
}

impl OutboundTarget {
    /// Build a target from a raw load-balancing discriminator
    pub fn new(
        adapter_name: impl Into<String>,
        config: Map<String, Value>,
        load_balancing: &str,
    ) -> Result<Self, SinkError> {
        let policy = load_balancing
            .parse::<LoadBalancing>()
            .map_err(|err| SinkError::invalid_config(err.to_string()))?;
        Self::with_policy(adapter_name, config, policy)
    }

    pub fn with_policy(
        adapter_name: impl Into<String>,
        config: Map<String, Value>,
        load_balancing: LoadBalancing,
    ) -> Result<Self, SinkError> {
        let adapter_name = adapter_name.into();
        if adapter_name.is_empty() {
            return Err(SinkError::invalid_config("target adapter name is empty"));
        }

        let trace_format = match config.get(TRACE_FORMAT_KEY) {
            None | Some(Value::Null) => TraceFormat::default(),
            Some(Value::String(raw)) => raw
                .parse::<TraceFormat>()
                .map_err(|err| SinkError::invalid_config(err.to_string()))?,
            Some(other) => {
                return Err(SinkError::invalid_config(format!(
                    "{} must be a string, got {}",
                    TRACE_FORMAT_KEY, other
                )))
            }
        };

        Ok(Self {
            adapter_name,
            config,
            load_balancing,
            trace_format,
        })
    }

    /// Shorthand for a target with empty configuration
    pub fn simple(
        adapter_name: impl Into<String>,
        load_balancing: &str,
    ) -> Result<Self, SinkError> {
        Self::new(adapter_name, Map::new(), load_balancing)
    }

    pub fn from_config(config: &TargetConfig) -> Result<Self, SinkError> {
        Self::new(
            config.adapter.clone(),
            config.config.clone(),
            &config.load_balancing,
        )
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// String config value
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn load_balancing(&self) -> LoadBalancing {
        self.load_balancing
    }

    /// Header vocabulary used when propagating trace context to this target
    pub fn trace_format(&self) -> TraceFormat {
        self.trace_format
    }
}
