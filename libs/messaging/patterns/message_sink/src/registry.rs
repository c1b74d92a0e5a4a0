//! Outbound Port Registry
//!
//! Name to envelope-factory map. Call sites emit by port name and payload
//! instead of building envelopes by hand; the factory decides path, method
//! and headers for the port.

use crate::SinkError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use types::Envelope;

static GLOBAL_PORTS: Lazy<Arc<OutboundPortRegistry>> =
    Lazy::new(|| Arc::new(OutboundPortRegistry::new()));

/// Builds an outbound envelope from a payload
pub type EnvelopeFactory = Arc<dyn Fn(Value) -> Envelope + Send + Sync>;

/// Outbound envelope factories keyed by port name
#[derive(Default)]
pub struct OutboundPortRegistry {
    factories: RwLock<HashMap<String, EnvelopeFactory>>,
}

impl std::fmt::Debug for OutboundPortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundPortRegistry")
            .field("ports", &self.list_ports())
            .finish()
    }
}

impl OutboundPortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry for top-level wiring only
    pub fn global() -> Arc<OutboundPortRegistry> {
        Arc::clone(&GLOBAL_PORTS)
    }

    /// Register `factory` under `name`, replacing any previous one
    pub fn register_port<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(Value) -> Envelope + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self
            .factories
            .write()
            .insert(name.clone(), Arc::new(factory))
            .is_some();
        if replaced {
            info!("Replaced outbound port factory: {}", name);
        } else {
            info!("Registered outbound port factory: {}", name);
        }
    }

    pub fn get_port(&self, name: &str) -> Option<EnvelopeFactory> {
        self.factories.read().get(name).cloned()
    }

    /// Remove a factory; returns whether it existed
    pub fn remove_port(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.factories.write().clear();
    }

    /// Registered names, sorted
    pub fn list_ports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Build an envelope for `name`. The factory runs outside the lock.
    pub fn build(&self, name: &str, payload: Value) -> Result<Envelope, SinkError> {
        let factory = self
            .get_port(name)
            .ok_or_else(|| SinkError::PortNotFound(name.to_string()))?;
        let envelope = factory(payload);
        debug!("Built outbound envelope for {}: {}", name, envelope.path);
        Ok(envelope)
    }
}
