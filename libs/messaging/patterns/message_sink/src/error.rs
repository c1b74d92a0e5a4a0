use std::time::Duration;
use types::{
    Envelope, STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL_ERROR, STATUS_NOT_FOUND,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    #[error("No targets registered for outbound port: {0}")]
    NoTargets(String),

    #[error("Outbound port not found: {0}")]
    PortNotFound(String),

    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request via {adapter} failed: {reason}")]
    RequestFailed { adapter: String, reason: String },

    #[error(
        "All {} failover targets failed for port {port}: {}",
        .attempts.len(),
        .attempts.join("; ")
    )]
    FailoverExhausted { port: String, attempts: Vec<String> },

    #[error("Timeout after {:.3}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl SinkError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SinkError::InvalidConfig(msg.into())
    }

    /// Create a request failed error
    pub fn request_failed(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::RequestFailed {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: Duration) -> Self {
        SinkError::Timeout(duration)
    }

    /// Check if this error means the route or its adapter is unknown
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SinkError::NoTargets(_) | SinkError::PortNotFound(_) | SinkError::AdapterNotFound(_)
        )
    }

    /// Envelope status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SinkError::NoTargets(_)
            | SinkError::PortNotFound(_)
            | SinkError::AdapterNotFound(_) => STATUS_NOT_FOUND,
            SinkError::Timeout(_) => STATUS_GATEWAY_TIMEOUT,
            SinkError::InvalidConfig(_)
            | SinkError::RequestFailed { .. }
            | SinkError::FailoverExhausted { .. } => STATUS_INTERNAL_ERROR,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(self.status_code(), self.to_string())
    }
}
