//! # Trace Context Codecs
//!
//! Pure extract/inject functions that move the `(trace_id, span_id,
//! parent_span_id)` triple between protocol headers and [`TraceIds`].
//!
//! ## Header Vocabularies
//!
//! | Format | Trace ID | Span ID | Parent |
//! |--------|----------|---------|--------|
//! | native | `X-Trace-Id` | `X-Span-Id` | `X-Parent-Span-Id` |
//! | B3 | `X-B3-TraceId` | `X-B3-SpanId` | `X-B3-ParentSpanId` |
//! | W3C | `traceparent` | (combined) | (not carried) |
//!
//! Header names are matched case-insensitively on extraction and written
//! with the canonical casing above on injection.
//!
//! ## W3C Assembly
//!
//! `traceparent` is `00-{trace_id:32}-{span_id:16}-01` and needs a complete
//! span context. When the span id is missing, or the ids cannot be expressed
//! as W3C hex ids, injection falls back to the native headers so the context
//! is never silently dropped. 64-bit trace ids (16 hex) are left-padded to
//! 128 bits as B3 interop expects.

use super::ids::{is_valid_hex_id, SPAN_ID_HEX_LEN, TRACE_ID_HEX_LEN};
use crate::common::errors::{TypesError, TypesResult};
use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const NATIVE_TRACE_ID: &str = "X-Trace-Id";
pub const NATIVE_SPAN_ID: &str = "X-Span-Id";
pub const NATIVE_PARENT_SPAN_ID: &str = "X-Parent-Span-Id";

pub const B3_TRACE_ID: &str = "X-B3-TraceId";
pub const B3_SPAN_ID: &str = "X-B3-SpanId";
pub const B3_PARENT_SPAN_ID: &str = "X-B3-ParentSpanId";

pub const W3C_TRACEPARENT: &str = "traceparent";

const W3C_VERSION: &str = "00";
const W3C_SAMPLED: &str = "01";

/// Header vocabulary used to carry trace context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TraceFormat {
    #[default]
    Native,
    B3,
    W3c,
}

impl TraceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceFormat::Native => "native",
            TraceFormat::B3 => "b3",
            TraceFormat::W3c => "w3c",
        }
    }
}

impl FromStr for TraceFormat {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(TraceFormat::Native),
            "b3" => Ok(TraceFormat::B3),
            "w3c" => Ok(TraceFormat::W3c),
            _ => Err(TypesError::UnknownTraceFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for TraceFormat {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TraceFormat> for String {
    fn from(format: TraceFormat) -> Self {
        format.as_str().to_string()
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The trace context triple; every field is `None` when absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceIds {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
}

impl TraceIds {
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none() && self.span_id.is_none() && self.parent_span_id.is_none()
    }

    pub fn has_trace(&self) -> bool {
        self.trace_id.is_some()
    }
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn remove_header(headers: &mut HashMap<String, String>, name: &str) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
}

fn set_header(headers: &mut HashMap<String, String>, name: &str, value: &str) {
    remove_header(headers, name);
    headers.insert(name.to_string(), value.to_string());
}

fn extract_triple(
    headers: &HashMap<String, String>,
    trace_key: &str,
    span_key: &str,
    parent_key: &str,
) -> TraceIds {
    TraceIds {
        trace_id: header_value(headers, trace_key).map(str::to_string),
        span_id: header_value(headers, span_key).map(str::to_string),
        parent_span_id: header_value(headers, parent_key).map(str::to_string),
    }
}

fn inject_triple(
    ids: &TraceIds,
    headers: &mut HashMap<String, String>,
    trace_key: &str,
    span_key: &str,
    parent_key: &str,
) {
    if let Some(trace_id) = &ids.trace_id {
        set_header(headers, trace_key, trace_id);
    }
    if let Some(span_id) = &ids.span_id {
        set_header(headers, span_key, span_id);
    }
    if let Some(parent) = &ids.parent_span_id {
        set_header(headers, parent_key, parent);
    }
}

/// Parse a `traceparent` value into trace and span ids
pub fn parse_traceparent(value: &str) -> TypesResult<TraceIds> {
    let malformed = || TypesError::MalformedTraceparent(value.to_string());
    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.len() < 4 || parts[0].len() != 2 || parts[0] == "ff" {
        return Err(malformed());
    }
    let (trace_id, span_id) = (parts[1], parts[2]);
    if !is_valid_hex_id(trace_id, TRACE_ID_HEX_LEN) || !is_valid_hex_id(span_id, SPAN_ID_HEX_LEN) {
        return Err(malformed());
    }
    Ok(TraceIds {
        trace_id: Some(trace_id.to_ascii_lowercase()),
        span_id: Some(span_id.to_ascii_lowercase()),
        parent_span_id: None,
    })
}

/// Assemble a `traceparent` value, `None` if the ids cannot be expressed in W3C form
pub fn format_traceparent(trace_id: &str, span_id: &str) -> Option<String> {
    let trace_id = if is_valid_hex_id(trace_id, TRACE_ID_HEX_LEN / 2) {
        format!("{:0>width$}", trace_id, width = TRACE_ID_HEX_LEN)
    } else {
        trace_id.to_string()
    };
    if !is_valid_hex_id(&trace_id, TRACE_ID_HEX_LEN) || !is_valid_hex_id(span_id, SPAN_ID_HEX_LEN)
    {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}",
        W3C_VERSION,
        trace_id.to_ascii_lowercase(),
        span_id.to_ascii_lowercase(),
        W3C_SAMPLED
    ))
}

/// Read trace context from headers in the given vocabulary.
///
/// For W3C a missing or malformed `traceparent` falls back to the native
/// headers.
pub fn extract(headers: &HashMap<String, String>, format: TraceFormat) -> TraceIds {
    match format {
        TraceFormat::Native => extract_triple(
            headers,
            NATIVE_TRACE_ID,
            NATIVE_SPAN_ID,
            NATIVE_PARENT_SPAN_ID,
        ),
        TraceFormat::B3 => extract_triple(headers, B3_TRACE_ID, B3_SPAN_ID, B3_PARENT_SPAN_ID),
        TraceFormat::W3c => header_value(headers, W3C_TRACEPARENT)
            .and_then(|value| parse_traceparent(value).ok())
            .unwrap_or_else(|| extract(headers, TraceFormat::Native)),
    }
}

/// Write trace context into headers in the given vocabulary.
///
/// Partially populated input is fine: absent fields are simply not written.
/// W3C requires trace and span ids; without them the native headers are
/// written instead.
pub fn inject(ids: &TraceIds, headers: &mut HashMap<String, String>, format: TraceFormat) {
    match format {
        TraceFormat::Native => inject_triple(
            ids,
            headers,
            NATIVE_TRACE_ID,
            NATIVE_SPAN_ID,
            NATIVE_PARENT_SPAN_ID,
        ),
        TraceFormat::B3 => inject_triple(ids, headers, B3_TRACE_ID, B3_SPAN_ID, B3_PARENT_SPAN_ID),
        TraceFormat::W3c => {
            let traceparent = match (&ids.trace_id, &ids.span_id) {
                (Some(trace_id), Some(span_id)) => format_traceparent(trace_id, span_id),
                _ => None,
            };
            match traceparent {
                Some(value) => set_header(headers, W3C_TRACEPARENT, &value),
                None => inject(ids, headers, TraceFormat::Native),
            }
        }
    }
}

/// Pick the vocabulary present in `headers`, preferring W3C, then B3, then native
pub fn detect_format(headers: &HashMap<String, String>) -> Option<TraceFormat> {
    if header_value(headers, W3C_TRACEPARENT).is_some() {
        Some(TraceFormat::W3c)
    } else if header_value(headers, B3_TRACE_ID).is_some() {
        Some(TraceFormat::B3)
    } else if header_value(headers, NATIVE_TRACE_ID).is_some() {
        Some(TraceFormat::Native)
    } else {
        None
    }
}

/// Extract using whichever vocabulary the headers carry
pub fn extract_any(headers: &HashMap<String, String>) -> TraceIds {
    detect_format(headers)
        .map(|format| extract(headers, format))
        .unwrap_or_default()
}

/// Copy trace context found in the envelope's headers onto its id fields.
/// Fields already set on the envelope are kept.
pub fn extract_into_envelope(envelope: &mut Envelope, format: Option<TraceFormat>) -> TraceIds {
    let ids = match format {
        Some(format) => extract(&envelope.headers, format),
        None => extract_any(&envelope.headers),
    };
    envelope.merge_trace_ids(&ids);
    ids
}

/// Write the envelope's id fields into its own headers
pub fn inject_from_envelope(envelope: &mut Envelope, format: TraceFormat) {
    let ids = envelope.trace_ids();
    inject(&ids, &mut envelope.headers, format);
}

/// Metadata keys used by transports that carry context out of band (pub/sub)
pub mod metadata_keys {
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const PARENT_SPAN_ID: &str = "parent_span_id";
}

/// Read trace context from the envelope's metadata instead of its headers
pub fn extract_from_metadata(envelope: &Envelope) -> TraceIds {
    let get = |key: &str| {
        envelope
            .metadata
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::to_string)
    };
    TraceIds {
        trace_id: get(metadata_keys::TRACE_ID),
        span_id: get(metadata_keys::SPAN_ID),
        parent_span_id: get(metadata_keys::PARENT_SPAN_ID),
    }
}

/// Write the envelope's id fields into its metadata
pub fn inject_into_metadata(envelope: &mut Envelope) {
    let ids = envelope.trace_ids();
    let pairs = [
        (metadata_keys::TRACE_ID, ids.trace_id),
        (metadata_keys::SPAN_ID, ids.span_id),
        (metadata_keys::PARENT_SPAN_ID, ids.parent_span_id),
    ];
    for (key, value) in pairs {
        if let Some(value) = value {
            envelope
                .metadata
                .insert(key.to_string(), serde_json::Value::String(value));
        }
    }
}
