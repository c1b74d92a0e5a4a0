//! Test doubles for outbound adapters

use crate::{OutboundAdapter, OutboundTarget, SinkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use types::Envelope;

/// One exchange seen by a [`CollectorAdapter`]
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: OutboundTarget,
    pub envelope: Envelope,
    /// `false` for fire-and-forget sends
    pub expects_reply: bool,
}

/// An adapter that records every envelope with bounded storage and answers
/// requests with a success envelope echoing the request body
#[derive(Debug)]
pub struct CollectorAdapter {
    name: String,
    deliveries: Mutex<VecDeque<Delivery>>,
    max_deliveries: usize,
    fail_next: AtomicBool,
    requests: AtomicU64,
}

impl CollectorAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, 1000)
    }

    pub fn with_capacity(name: impl Into<String>, max_deliveries: usize) -> Self {
        Self {
            name: name.into(),
            deliveries: Mutex::new(VecDeque::with_capacity(max_deliveries.min(1024))),
            max_deliveries,
            fail_next: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        }
    }

    /// Every recorded delivery, oldest first
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().iter().cloned().collect()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.deliveries
            .lock()
            .iter()
            .map(|delivery| delivery.envelope.clone())
            .collect()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Attempts made, including failed ones
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }

    /// Configure to fail the next exchange
    pub fn fail_next_request(&self) {
        self.fail_next.store(true, Ordering::Relaxed);
    }

    fn record(
        &self,
        target: &OutboundTarget,
        envelope: &Envelope,
        expects_reply: bool,
    ) -> Result<(), SinkError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if self.fail_next.swap(false, Ordering::Relaxed) {
            return Err(SinkError::request_failed(&self.name, "simulated failure"));
        }

        let mut deliveries = self.deliveries.lock();
        if deliveries.len() >= self.max_deliveries {
            deliveries.pop_front();
        }
        deliveries.push_back(Delivery {
            target: target.clone(),
            envelope: envelope.clone(),
            expects_reply,
        });
        Ok(())
    }
}

#[async_trait]
impl OutboundAdapter for CollectorAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request(
        &self,
        target: &OutboundTarget,
        envelope: Envelope,
    ) -> Result<Envelope, SinkError> {
        self.record(target, &envelope, true)?;
        let mut response = Envelope::success(json!({
            "adapter": self.name,
            "echo": envelope.body.clone().unwrap_or(Value::Null),
        }));
        response.inherit_trace(&envelope);
        Ok(response)
    }

    async fn send(&self, target: &OutboundTarget, envelope: Envelope) -> Result<(), SinkError> {
        self.record(target, &envelope, false)
    }
}

/// An adapter whose every exchange fails
#[derive(Debug)]
pub struct FailingAdapter {
    name: String,
    reason: String,
    attempts: AtomicU64,
}

impl FailingAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_reason(name, "connection refused")
    }

    pub fn with_reason(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundAdapter for FailingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request(
        &self,
        _target: &OutboundTarget,
        _envelope: Envelope,
    ) -> Result<Envelope, SinkError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(SinkError::request_failed(&self.name, &self.reason))
    }
}

/// An adapter that answers after a fixed delay
#[derive(Debug)]
pub struct SlowAdapter {
    name: String,
    delay: Duration,
    completed: AtomicU64,
}

impl SlowAdapter {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            completed: AtomicU64::new(0),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundAdapter for SlowAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request(
        &self,
        _target: &OutboundTarget,
        envelope: Envelope,
    ) -> Result<Envelope, SinkError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::Relaxed);
        let mut response = Envelope::success(json!({ "adapter": self.name }));
        response.inherit_trace(&envelope);
        Ok(response)
    }
}
