//! # Relay Error Types
//!
//! Error categories for inbound routing and pipeline processing. Every variant
//! maps onto an envelope status code so that errors can cross back to an
//! adapter as a response instead of propagating.

use std::time::Duration;
use thiserror::Error;
use types::{
    Envelope, STATUS_BAD_REQUEST, STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL_ERROR, STATUS_NOT_FOUND,
};

/// Inbound routing and pipeline errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// No port registered under this name
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Malformed request, e.g. missing routing metadata
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Failure raised by application handler logic
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    /// Handler exceeded its deadline
    #[error("Request timeout after {:.3}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Invalid registration or configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handler reference missing from the handler table
    #[error("Unknown handler reference: {0}")]
    UnknownHandler(String),
}

impl RelayError {
    pub fn port_not_found(port: impl Into<String>) -> Self {
        RelayError::PortNotFound(port.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RelayError::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    /// Envelope status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::PortNotFound(_) | RelayError::UnknownHandler(_) => STATUS_NOT_FOUND,
            RelayError::Validation(_) => STATUS_BAD_REQUEST,
            RelayError::Timeout(_) => STATUS_GATEWAY_TIMEOUT,
            RelayError::Handler(_) | RelayError::Config(_) => STATUS_INTERNAL_ERROR,
        }
    }

    /// Error envelope carrying this error's status and message
    pub fn to_envelope(&self) -> Envelope {
        let envelope = Envelope::error(self.status_code(), self.to_string());
        if matches!(self, RelayError::Timeout(_)) {
            envelope.with_metadata(types::metadata_keys::TIMEOUT, true)
        } else {
            envelope
        }
    }

    /// Recover the status-bearing error from a handler-facing `anyhow::Error`
    pub fn envelope_for(err: &anyhow::Error) -> Envelope {
        match err.downcast_ref::<RelayError>() {
            Some(relay_err) => relay_err.to_envelope(),
            None => Envelope::error(STATUS_INTERNAL_ERROR, err.to_string()),
        }
    }
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
