//! Error types for envelope, policy and trace-context handling
//!
//! Covers the failures that can happen before a request ever reaches a
//! handler: unknown policy discriminators coming out of configuration and
//! malformed trace headers coming off the wire.

use thiserror::Error;

/// Errors raised by the shared type layer
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Routing strategy name outside `{first, broadcast, round_robin}`
    #[error("Unknown routing strategy '{0}' (expected first, broadcast or round_robin)")]
    UnknownStrategy(String),

    /// Load-balancing discriminator outside `{first, round_robin, failover}`
    #[error("Unknown load balancing policy '{0}' (expected first, round_robin or failover)")]
    UnknownLoadBalancing(String),

    /// Trace format name outside `{native, b3, w3c}`
    #[error("Unknown trace format '{0}' (expected native, b3 or w3c)")]
    UnknownTraceFormat(String),

    /// A `traceparent` header that does not follow `version-trace-span-flags`
    #[error("Malformed traceparent header: '{0}'")]
    MalformedTraceparent(String),
}

/// Result type for the shared type layer
pub type TypesResult<T> = std::result::Result<T, TypesError>;
