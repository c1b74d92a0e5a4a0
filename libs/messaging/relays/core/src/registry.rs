//! Inbound Port Registry
//!
//! Maps a port name to its ordered handler list and routing strategy. A port
//! is created by its first handler registration; later registrations append.
//!
//! The registry is guarded by a single lock. Lookups clone the handler list
//! and strategy out of the lock, so no lock is held while handlers run.

use crate::common::{RelayError, RelayResult};
use crate::handler::{Handler, SharedHandler};
use crate::strategy::{strategy_for, RoutingStrategy};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use types::{Envelope, StrategyKind};

static GLOBAL_REGISTRY: Lazy<Arc<PortRegistry>> = Lazy::new(|| Arc::new(PortRegistry::new()));

#[derive(Clone)]
struct Port {
    handlers: Vec<SharedHandler>,
    strategy: Arc<dyn RoutingStrategy>,
}

/// Read-only view of a registered port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub handler_count: usize,
    pub strategy: StrategyKind,
}

/// Named inbound ports and their handlers
#[derive(Default)]
pub struct PortRegistry {
    ports: RwLock<HashMap<String, Port>>,
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("ports", &self.list_ports())
            .finish()
    }
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry for top-level wiring only
    pub fn global() -> Arc<PortRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Append `handler` to `port_name`, creating the port (strategy `First`)
    /// if it does not exist yet
    pub fn register_handler(&self, port_name: impl Into<String>, handler: SharedHandler) {
        let port_name = port_name.into();
        let mut ports = self.ports.write();
        let port = ports.entry(port_name.clone()).or_insert_with(|| {
            info!("Registered port: {}", port_name);
            Port {
                handlers: Vec::new(),
                strategy: strategy_for(StrategyKind::default()),
            }
        });
        port.handlers.push(handler);
        debug!(
            "Bound handler #{} to port {}",
            port.handlers.len(),
            port_name
        );
    }

    /// Builder-style [`register_handler`](Self::register_handler)
    pub fn bind(&self, port_name: impl Into<String>, handler: SharedHandler) -> &Self {
        self.register_handler(port_name, handler);
        self
    }

    /// Replace the routing strategy of an existing port
    pub fn set_strategy(&self, port_name: &str, kind: StrategyKind) -> RelayResult<()> {
        let mut ports = self.ports.write();
        let port = ports
            .get_mut(port_name)
            .ok_or_else(|| RelayError::port_not_found(port_name))?;
        if port.strategy.kind() != kind {
            info!("Port {} strategy set to {}", port_name, kind);
            port.strategy = strategy_for(kind);
        }
        Ok(())
    }

    pub fn get_port(&self, port_name: &str) -> RelayResult<PortInfo> {
        let ports = self.ports.read();
        let port = ports
            .get(port_name)
            .ok_or_else(|| RelayError::port_not_found(port_name))?;
        Ok(PortInfo {
            name: port_name.to_string(),
            handler_count: port.handlers.len(),
            strategy: port.strategy.kind(),
        })
    }

    /// Handlers bound to `port_name`, in registration order
    pub fn handlers(&self, port_name: &str) -> RelayResult<Vec<SharedHandler>> {
        Ok(self.snapshot(port_name)?.handlers)
    }

    pub fn contains(&self, port_name: &str) -> bool {
        self.ports.read().contains_key(port_name)
    }

    /// Registered port names, sorted
    pub fn list_ports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ports.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.ports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.read().is_empty()
    }

    /// Drop every port
    pub fn reset(&self) {
        self.ports.write().clear();
    }

    /// Run the port's strategy against its handlers
    pub async fn route(&self, port_name: &str, envelope: Envelope) -> RelayResult<Vec<Envelope>> {
        let port = self.snapshot(port_name)?;
        debug!(
            "Routing {} to port {} ({} handlers, {})",
            envelope.path,
            port_name,
            port.handlers.len(),
            port.strategy.kind()
        );
        port.strategy.dispatch(&port.handlers, envelope).await
    }

    fn snapshot(&self, port_name: &str) -> RelayResult<Port> {
        self.ports
            .read()
            .get(port_name)
            .cloned()
            .ok_or_else(|| RelayError::port_not_found(port_name))
    }
}

/// Resolves the handler the pipeline invokes for a port
pub trait HandlerLoader: Send + Sync {
    fn load(&self, port_name: &str) -> RelayResult<SharedHandler>;
}

impl HandlerLoader for PortRegistry {
    fn load(&self, port_name: &str) -> RelayResult<SharedHandler> {
        let port = self.snapshot(port_name)?;
        Ok(Arc::new(PortDispatch {
            handlers: port.handlers,
            strategy: port.strategy,
        }))
    }
}

/// A port resolved for one pipeline invocation. Strategies yielding several
/// responses are folded into a single envelope.
struct PortDispatch {
    handlers: Vec<SharedHandler>,
    strategy: Arc<dyn RoutingStrategy>,
}

#[async_trait]
impl Handler for PortDispatch {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<Envelope> {
        let mut responses = self.strategy.dispatch(&self.handlers, envelope).await?;
        if self.strategy.kind() != StrategyKind::Broadcast && responses.len() == 1 {
            if let Some(response) = responses.pop() {
                return Ok(response);
            }
        }
        Ok(aggregate(responses))
    }
}

/// Fold broadcast responses into one envelope whose `data` lists each result
/// in handler order. Failed results appear as `{status_code, error}` objects.
pub fn aggregate(responses: Vec<Envelope>) -> Envelope {
    let results: Vec<Value> = responses
        .into_iter()
        .map(|response| match response.error_message {
            Some(error) => json!({ "status_code": response.status_code, "error": error }),
            None => response.data.unwrap_or(Value::Null),
        })
        .collect();
    Envelope::success(Value::Array(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use anyhow::anyhow;

    fn returning(n: u64) -> SharedHandler {
        handler_fn(move |_request: Envelope| async move {
            anyhow::Ok(Envelope::success(json!({ "n": n })))
        })
    }

    #[tokio::test]
    async fn test_broadcast_scenario() {
        let registry = PortRegistry::new();
        registry.bind("p", returning(1)).bind("p", returning(2));
        registry.set_strategy("p", StrategyKind::Broadcast).unwrap();

        let responses = registry.route("p", Envelope::new("/x")).await.unwrap();
        let data: Vec<_> = responses.iter().map(|r| r.data.clone().unwrap()).collect();
        assert_eq!(data, vec![json!({ "n": 1 }), json!({ "n": 2 })]);
        assert!(responses.iter().all(|r| r.status_code == 200));
    }

    #[tokio::test]
    async fn test_first_registration_defines_port() {
        let registry = PortRegistry::new();
        registry.register_handler("orders", returning(1));
        registry.register_handler("orders", returning(2));

        let info = registry.get_port("orders").unwrap();
        assert_eq!(info.handler_count, 2);
        assert_eq!(info.strategy, StrategyKind::First);

        let responses = registry.route("orders", Envelope::new("/x")).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data, Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn test_same_handler_twice() {
        let registry = PortRegistry::new();
        let handler = returning(7);
        registry.bind("dup", handler.clone()).bind("dup", handler);
        registry.set_strategy("dup", StrategyKind::Broadcast).unwrap();

        let responses = registry.route("dup", Envelope::new("/x")).await.unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_port() {
        let registry = PortRegistry::new();
        assert!(matches!(
            registry.get_port("missing"),
            Err(RelayError::PortNotFound(_))
        ));
        assert!(matches!(
            registry.route("missing", Envelope::new("/x")).await,
            Err(RelayError::PortNotFound(_))
        ));
        assert!(registry.set_strategy("missing", StrategyKind::Broadcast).is_err());
    }

    #[tokio::test]
    async fn test_round_robin_cursor_is_per_port() {
        let registry = PortRegistry::new();
        registry.bind("a", returning(0)).bind("a", returning(1));
        registry.bind("b", returning(10)).bind("b", returning(11));
        registry.set_strategy("a", StrategyKind::RoundRobin).unwrap();
        registry.set_strategy("b", StrategyKind::RoundRobin).unwrap();

        let first_a = registry.route("a", Envelope::new("/x")).await.unwrap();
        let first_b = registry.route("b", Envelope::new("/x")).await.unwrap();
        let second_a = registry.route("a", Envelope::new("/x")).await.unwrap();

        assert_eq!(first_a[0].data, Some(json!({ "n": 0 })));
        assert_eq!(first_b[0].data, Some(json!({ "n": 10 })));
        assert_eq!(second_a[0].data, Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn test_loader_aggregates_broadcast() {
        let registry = PortRegistry::new();
        let failing = handler_fn(|_request: Envelope| async move {
            Err::<Envelope, _>(anyhow!("audit sink offline"))
        });
        registry.bind("audit", returning(1)).bind("audit", failing);
        registry.set_strategy("audit", StrategyKind::Broadcast).unwrap();

        let handler = registry.load("audit").unwrap();
        let response = handler.handle(Envelope::new("/x")).await.unwrap();
        assert_eq!(
            response.data,
            Some(json!([
                { "n": 1 },
                { "status_code": 500, "error": "audit sink offline" }
            ]))
        );
    }

    #[tokio::test]
    async fn test_loader_passes_single_response_through() {
        let registry = PortRegistry::new();
        registry.bind("single", returning(5));

        let handler = registry.load("single").unwrap();
        let response = handler.handle(Envelope::new("/x")).await.unwrap();
        assert_eq!(response.data, Some(json!({ "n": 5 })));
        assert!(registry.load("nope").is_err());
    }

    #[test]
    fn test_list_and_reset() {
        let registry = PortRegistry::new();
        registry.bind("zeta", returning(1)).bind("alpha", returning(2));
        assert_eq!(registry.list_ports(), vec!["alpha", "zeta"]);
        assert_eq!(registry.len(), 2);

        registry.reset();
        assert!(registry.is_empty());
        assert!(!registry.contains("alpha"));
    }
}
