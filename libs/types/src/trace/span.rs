//! In-process span lifecycle
//!
//! A [`Span`] is created by a [`Tracer`](super::Tracer) and shared as
//! `Arc<Span>`; tags and the finish timestamp sit behind a short-lived lock so
//! middleware and handlers can annotate the same span concurrently.

use super::context::TraceIds;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Tag written on finish when the work failed
pub const TAG_ERROR: &str = "error";
/// Tag carrying the failure message
pub const TAG_ERROR_MESSAGE: &str = "error.message";
/// Tag written on finish when the work succeeded
pub const TAG_SUCCESS: &str = "success";
/// Tag carrying the response status code
pub const TAG_STATUS_CODE: &str = "status_code";

#[derive(Debug, Default)]
struct SpanState {
    tags: BTreeMap<String, String>,
    finished_at: Option<SystemTime>,
    duration: Option<Duration>,
}

/// A timed, tagged unit of work within a trace
#[derive(Debug)]
pub struct Span {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    started_at: SystemTime,
    started: Instant,
    state: Mutex<SpanState>,
}

impl Span {
    pub(crate) fn new(
        name: impl Into<String>,
        trace_id: String,
        span_id: String,
        parent_span_id: Option<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            name: name.into(),
            started_at: SystemTime::now(),
            started: Instant::now(),
            state: Mutex::new(SpanState::default()),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Identifier triple of this span, suitable for header injection
    pub fn ids(&self) -> TraceIds {
        TraceIds {
            trace_id: Some(self.trace_id.clone()),
            span_id: Some(self.span_id.clone()),
            parent_span_id: self.parent_span_id.clone(),
        }
    }

    /// Set or overwrite a tag
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.lock().tags.insert(key.into(), value.into());
    }

    /// Set several tags at once
    pub fn set_tags<I, K, V>(&self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut state = self.state.lock();
        for (key, value) in tags {
            state.tags.insert(key.into(), value.into());
        }
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.state.lock().tags.get(key).cloned()
    }

    /// Snapshot of all tags
    pub fn tags(&self) -> BTreeMap<String, String> {
        self.state.lock().tags.clone()
    }

    /// Stamp the finish time. Returns `false` if the span was already finished,
    /// in which case nothing changes.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock();
        if state.finished_at.is_some() {
            return false;
        }
        state.finished_at = Some(SystemTime::now());
        state.duration = Some(self.started.elapsed());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished_at.is_some()
    }

    pub fn finished_at(&self) -> Option<SystemTime> {
        self.state.lock().finished_at
    }

    /// Elapsed time between start and finish, `None` while still open
    pub fn duration(&self) -> Option<Duration> {
        self.state.lock().duration
    }

    /// Serialisable copy of the span as it is right now
    pub fn record(&self) -> SpanRecord {
        let state = self.state.lock();
        SpanRecord {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            name: self.name.clone(),
            tags: state.tags.clone(),
            start_unix_ns: unix_nanos(self.started_at),
            end_unix_ns: state.finished_at.map(unix_nanos),
            duration_ns: state.duration.map(|d| d.as_nanos() as u64),
        }
    }
}

/// Exported form of a [`Span`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub start_unix_ns: u64,
    pub end_unix_ns: Option<u64>,
    pub duration_ns: Option<u64>,
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
