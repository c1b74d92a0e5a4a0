//! Per-request pipeline state

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use types::{Envelope, Span};

/// Well-known context metadata keys
pub mod keys {
    /// Active pipeline span, set by the observability middleware
    pub const ACTIVE_SPAN: &str = "active_span";
    /// Set when the timeout middleware expired the request
    pub const TIMEOUT: &str = "timeout";
}

/// Default stage label
pub const DEFAULT_STAGE: &str = "pipeline";

/// Value stored in [`PipelineContext::metadata`]
#[derive(Debug, Clone)]
pub enum ContextValue {
    Span(Arc<Span>),
    Flag(bool),
    Text(String),
    Json(Value),
}

/// State threaded through the middleware chain for one request
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub envelope: Envelope,
    pub port_name: String,
    pub stage: String,
    pub metadata: HashMap<String, ContextValue>,
    /// Cancelled when the request is abandoned (e.g. on timeout). Clones of
    /// the context share the token.
    pub cancellation: CancellationToken,
}

impl PipelineContext {
    pub fn new(envelope: Envelope, port_name: impl Into<String>) -> Self {
        Self {
            envelope,
            port_name: port_name.into(),
            stage: DEFAULT_STAGE.to_string(),
            metadata: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.metadata.get(key)
    }

    pub fn span(&self, key: &str) -> Option<Arc<Span>> {
        match self.metadata.get(key) {
            Some(ContextValue::Span(span)) => Some(Arc::clone(span)),
            _ => None,
        }
    }

    /// Boolean flag; absent or non-flag values read as `false`
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(ContextValue::Flag(true)))
    }

    pub fn active_span(&self) -> Option<Arc<Span>> {
        self.span(keys::ACTIVE_SPAN)
    }

    pub fn is_timed_out(&self) -> bool {
        self.flag(keys::TIMEOUT)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
