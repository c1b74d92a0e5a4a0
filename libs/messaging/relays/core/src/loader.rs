//! Handler table
//!
//! Configuration refers to handlers by string (`"orders::create"`). The table
//! maps those references to handler values; it is populated in code at
//! startup and resolved once when ports are installed, never per request.

use crate::common::{RelayError, RelayResult};
use crate::handler::SharedHandler;
use crate::registry::PortRegistry;
use config::PortConfig;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// String reference to handler value table
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, SharedHandler>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("references", &self.references())
            .finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a handler under `reference`
    pub fn register(&mut self, reference: impl Into<String>, handler: SharedHandler) -> &mut Self {
        let reference = reference.into();
        debug!("Handler table entry: {}", reference);
        self.handlers.insert(reference, handler);
        self
    }

    /// Consuming variant of [`register`](Self::register)
    pub fn with(mut self, reference: impl Into<String>, handler: SharedHandler) -> Self {
        self.register(reference, handler);
        self
    }

    pub fn resolve(&self, reference: &str) -> RelayResult<SharedHandler> {
        self.handlers
            .get(reference)
            .cloned()
            .ok_or_else(|| RelayError::UnknownHandler(reference.to_string()))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.handlers.contains_key(reference)
    }

    /// Registered references, sorted
    pub fn references(&self) -> Vec<String> {
        let mut references: Vec<String> = self.handlers.keys().cloned().collect();
        references.sort();
        references
    }

    /// Resolve every configured binding, then register them on `registry`.
    ///
    /// Nothing is registered unless every reference resolves. Ports with no
    /// handler references are rejected.
    pub fn install(
        &self,
        ports: &BTreeMap<String, PortConfig>,
        registry: &PortRegistry,
    ) -> RelayResult<()> {
        let mut resolved = Vec::with_capacity(ports.len());
        for (port_name, port) in ports {
            if port.handlers.is_empty() {
                return Err(RelayError::config(format!(
                    "port '{}' has no handlers configured",
                    port_name
                )));
            }
            let handlers = port
                .handlers
                .iter()
                .map(|reference| self.resolve(reference))
                .collect::<RelayResult<Vec<_>>>()?;
            resolved.push((port_name, port.strategy, handlers));
        }

        for (port_name, strategy, handlers) in resolved {
            let count = handlers.len();
            for handler in handlers {
                registry.register_handler(port_name.clone(), handler);
            }
            registry.set_strategy(port_name, strategy)?;
            info!(
                "Installed port {} with {} handler(s), strategy {}",
                port_name, count, strategy
            );
        }
        Ok(())
    }
}
