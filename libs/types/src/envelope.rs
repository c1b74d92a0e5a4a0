//! # Envelope
//!
//! The protocol-agnostic unit exchanged between adapters, the pipeline,
//! handlers and outbound targets. Adapters convert native requests into an
//! [`Envelope`] (setting `metadata["port_name"]`) and render the returned
//! envelope's `status_code` / `error_message` back into protocol terms.
//!
//! ## Response Shape
//!
//! A well-formed response carries either `data` (success) or
//! `error_message` (failure), never both. [`Envelope::success`] and
//! [`Envelope::error`] are the only constructors that produce responses.
//!
//! ## Active Span
//!
//! [`Envelope::start_span`] records a weak reference to the span it opens.
//! The reference is not serialised and does not keep the span alive; the
//! [`Tracer`] owns it.

use crate::trace::context::TraceIds;
use crate::trace::ids::{generate_span_id, generate_trace_id};
use crate::trace::span::{Span, TAG_ERROR, TAG_ERROR_MESSAGE, TAG_STATUS_CODE, TAG_SUCCESS};
use crate::trace::Tracer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Well-known metadata keys
pub mod keys {
    /// Inbound port the adapter wants the envelope routed to
    pub const PORT_NAME: &str = "port_name";
    /// Set to `true` on envelopes produced by an expired deadline
    pub const TIMEOUT: &str = "timeout";
}

/// Default status for a successful response
pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

#[derive(Clone, Default)]
struct ActiveSpan(Option<Weak<Span>>);

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref().and_then(Weak::upgrade) {
            Some(span) => write!(f, "ActiveSpan({})", span.span_id()),
            None => f.write_str("ActiveSpan(none)"),
        }
    }
}

/// The universal request/response container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Request target: URL path, subject or method name
    pub path: String,
    /// Protocol verb, when the protocol has one
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path_params: HashMap<String, String>,
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default = "default_status")]
    pub status_code: u16,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(skip)]
    active_span: ActiveSpan,
}

fn default_status() -> u16 {
    STATUS_OK
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new("")
    }
}

impl Envelope {
    /// Create a request envelope for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: None,
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            metadata: HashMap::new(),
            body: None,
            status_code: STATUS_OK,
            data: None,
            error_message: None,
            trace_id: None,
            span_id: None,
            parent_span_id: None,
            active_span: ActiveSpan::default(),
        }
    }

    /// Successful response carrying `data`
    pub fn success(data: Value) -> Self {
        Self::success_with_status(data, STATUS_OK)
    }

    pub fn success_with_status(data: Value, status_code: u16) -> Self {
        let mut envelope = Self::new("");
        envelope.data = Some(data);
        envelope.status_code = status_code;
        envelope
    }

    /// Failed response carrying `message`
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let mut envelope = Self::new("");
        envelope.status_code = status_code;
        envelope.error_message = Some(message.into());
        envelope
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Target the envelope at an inbound port
    pub fn with_port(self, port_name: impl Into<String>) -> Self {
        self.with_metadata(keys::PORT_NAME, Value::String(port_name.into()))
    }

    /// Inbound port requested by the adapter, if any
    pub fn port_name(&self) -> Option<&str> {
        self.metadata
            .get(keys::PORT_NAME)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none() && self.status_code < 400
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// True once the deadline middleware marked this envelope as timed out
    pub fn is_timeout(&self) -> bool {
        self.metadata
            .get(keys::TIMEOUT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_trace_context(&self) -> bool {
        self.trace_id.is_some()
    }

    /// Current identifier triple
    pub fn trace_ids(&self) -> TraceIds {
        TraceIds {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
        }
    }

    /// Fill absent identifier fields from `ids`; present fields are kept
    pub fn merge_trace_ids(&mut self, ids: &TraceIds) {
        if self.trace_id.is_none() {
            self.trace_id = ids.trace_id.clone();
        }
        if self.span_id.is_none() {
            self.span_id = ids.span_id.clone();
        }
        if self.parent_span_id.is_none() {
            self.parent_span_id = ids.parent_span_id.clone();
        }
    }

    /// Copy the trace identifiers of `other` onto this envelope
    pub fn inherit_trace(&mut self, other: &Envelope) {
        self.merge_trace_ids(&other.trace_ids());
    }

    /// Open a span on `tracer` as a child of this envelope's context and make
    /// it the active span. Trace and span ids are written onto the envelope
    /// only where absent.
    pub fn start_span(&mut self, tracer: &Tracer, name: impl Into<String>) -> Arc<Span> {
        let parent = self.trace_ids();
        let span = tracer.start_span(name, Some(&parent));
        self.adopt_span(&span);
        span
    }

    /// [`start_span`](Self::start_span) with initial tags
    pub fn start_span_with_tags<I, K, V>(
        &mut self,
        tracer: &Tracer,
        name: impl Into<String>,
        tags: I,
    ) -> Arc<Span>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let span = self.start_span(tracer, name);
        span.set_tags(tags);
        span
    }

    /// Make an existing span the active span of this envelope
    pub fn adopt_span(&mut self, span: &Arc<Span>) {
        if self.trace_id.is_none() {
            self.trace_id = Some(span.trace_id().to_string());
        }
        if self.span_id.is_none() {
            self.span_id = Some(span.span_id().to_string());
        }
        self.active_span = ActiveSpan(Some(Arc::downgrade(span)));
    }

    pub fn active_span(&self) -> Option<Arc<Span>> {
        self.active_span.0.as_ref().and_then(Weak::upgrade)
    }

    /// Finish the active span, tagging it from this envelope's outcome, and
    /// clear it. No-op without an active span.
    pub fn finish_span(&mut self) {
        let Some(span) = self.active_span.0.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        span.set_tag(TAG_STATUS_CODE, self.status_code.to_string());
        match &self.error_message {
            Some(message) => {
                span.set_tag(TAG_ERROR, "true");
                span.set_tag(TAG_ERROR_MESSAGE, message.clone());
            }
            None => span.set_tag(TAG_SUCCESS, "true"),
        }
        span.finish();
    }

    /// Derive the context for a logical child hop without opening a span.
    ///
    /// Without a trace id a new trace is established (and recorded on the
    /// envelope, so later calls stay in the same trace). With one, the child
    /// reuses it, gets a fresh span id and is parented on the envelope's
    /// current span id, which also becomes the envelope's `parent_span_id`.
    pub fn create_child_context(&mut self) -> TraceIds {
        let trace_id = self
            .trace_id
            .get_or_insert_with(generate_trace_id)
            .clone();
        let parent_span_id = self.span_id.clone();
        if parent_span_id.is_some() {
            self.parent_span_id = parent_span_id.clone();
        }

        TraceIds {
            trace_id: Some(trace_id),
            span_id: Some(generate_span_id()),
            parent_span_id,
        }
    }
}
