//! Outbound Route Registry
//!
//! Maps an outbound port name to an ordered, non-empty target list and picks
//! the target for each outbound envelope:
//! - **first**: always the first target
//! - **round_robin**: rotates a per-route cursor, wrapping
//! - **failover**: the first target, with the rest as ordered fallbacks
//!
//! A route's cursor only moves on selection; reads never reset it.

use crate::{OutboundTarget, SinkError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use types::{Envelope, LoadBalancing};

#[derive(Debug)]
struct Route {
    targets: Arc<[OutboundTarget]>,
    policy: LoadBalancing,
    cursor: AtomicUsize,
}

/// Result of target selection
#[derive(Debug, Clone)]
pub struct Selection {
    pub port: String,
    pub policy: LoadBalancing,
    /// Index of the selected target
    pub index: usize,
    targets: Arc<[OutboundTarget]>,
}

impl Selection {
    pub fn target(&self) -> &OutboundTarget {
        &self.targets[self.index]
    }

    /// Targets to attempt, in order: the selected target, then for failover
    /// every following target
    pub fn candidates(&self) -> &[OutboundTarget] {
        match self.policy {
            LoadBalancing::Failover => &self.targets[self.index..],
            LoadBalancing::First | LoadBalancing::RoundRobin => {
                &self.targets[self.index..=self.index]
            }
        }
    }

    pub fn is_failover(&self) -> bool {
        self.policy == LoadBalancing::Failover
    }
}

/// Outbound routes keyed by port name
#[derive(Debug, Default)]
pub struct OutboundRouteRegistry {
    routes: RwLock<HashMap<String, Route>>,
}

impl OutboundRouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `targets` for `port_name`, replacing any existing route.
    ///
    /// The first target's policy governs the route; a list mixing policies
    /// is rejected, as is an empty list.
    pub fn register_route(
        &self,
        port_name: impl Into<String>,
        targets: Vec<OutboundTarget>,
    ) -> Result<(), SinkError> {
        let port_name = port_name.into();
        let policy = match targets.first() {
            Some(first) => first.load_balancing(),
            None => {
                return Err(SinkError::invalid_config(format!(
                    "outbound port '{}' requires at least one target",
                    port_name
                )))
            }
        };
        if let Some(mismatch) = targets.iter().find(|t| t.load_balancing() != policy) {
            return Err(SinkError::invalid_config(format!(
                "outbound port '{}' mixes load balancing policies ({} and {})",
                port_name,
                policy,
                mismatch.load_balancing()
            )));
        }

        info!(
            "Registered outbound route {} ({} targets, {})",
            port_name,
            targets.len(),
            policy
        );
        self.routes.write().insert(
            port_name,
            Route {
                targets: targets.into(),
                policy,
                cursor: AtomicUsize::new(0),
            },
        );
        Ok(())
    }

    /// Select the target for `envelope` on `port_name`
    pub fn select_target(
        &self,
        port_name: &str,
        envelope: &Envelope,
    ) -> Result<Selection, SinkError> {
        let routes = self.routes.read();
        let route = routes
            .get(port_name)
            .ok_or_else(|| SinkError::NoTargets(port_name.to_string()))?;

        let index = match route.policy {
            LoadBalancing::First | LoadBalancing::Failover => 0,
            LoadBalancing::RoundRobin => {
                route.cursor.fetch_add(1, Ordering::Relaxed) % route.targets.len()
            }
        };
        debug!(
            "Selected target {} ({}) of {} for {}",
            index,
            route.targets[index].adapter_name(),
            port_name,
            envelope.path
        );

        Ok(Selection {
            port: port_name.to_string(),
            policy: route.policy,
            index,
            targets: Arc::clone(&route.targets),
        })
    }

    pub fn get_route(&self, port_name: &str) -> Option<Vec<OutboundTarget>> {
        self.routes
            .read()
            .get(port_name)
            .map(|route| route.targets.to_vec())
    }

    pub fn policy(&self, port_name: &str) -> Option<LoadBalancing> {
        self.routes.read().get(port_name).map(|route| route.policy)
    }

    /// Remove a route; returns whether it existed
    pub fn remove_route(&self, port_name: &str) -> bool {
        let removed = self.routes.write().remove(port_name).is_some();
        if removed {
            info!("Removed outbound route {}", port_name);
        }
        removed
    }

    /// Route names, sorted
    pub fn list_routes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    pub fn clear(&self) {
        self.routes.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn targets(policy: &str, adapters: &[&str]) -> Vec<OutboundTarget> {
        adapters
            .iter()
            .map(|adapter| OutboundTarget::simple(*adapter, policy).unwrap())
            .collect()
    }

    fn adapter_at(registry: &OutboundRouteRegistry, port: &str) -> String {
        registry
            .select_target(port, &Envelope::new("/out"))
            .unwrap()
            .target()
            .adapter_name()
            .to_string()
    }

    #[test]
    fn test_unregistered_route_has_no_targets() {
        let registry = OutboundRouteRegistry::new();
        let err = registry
            .select_target("missing", &Envelope::new("/out"))
            .unwrap_err();
        assert_eq!(err, SinkError::NoTargets("missing".to_string()));
    }

    #[test]
    fn test_empty_and_mixed_routes_rejected() {
        let registry = OutboundRouteRegistry::new();
        assert!(matches!(
            registry.register_route("empty", Vec::new()),
            Err(SinkError::InvalidConfig(_))
        ));

        let mut mixed = targets("first", &["a"]);
        mixed.extend(targets("failover", &["b"]));
        assert!(registry.register_route("mixed", mixed).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_first_always_index_zero() {
        let registry = OutboundRouteRegistry::new();
        registry
            .register_route("out", targets("first", &["a", "b"]))
            .unwrap();
        for _ in 0..3 {
            assert_eq!(adapter_at(&registry, "out"), "a");
        }
    }

    #[test]
    fn test_round_robin_wraps() {
        let registry = OutboundRouteRegistry::new();
        registry
            .register_route("out", targets("round_robin", &["a", "b", "c"]))
            .unwrap();
        let picks: Vec<_> = (0..5).map(|_| adapter_at(&registry, "out")).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b"]);
    }

    #[test]
    fn test_reads_do_not_reset_cursor() {
        let registry = OutboundRouteRegistry::new();
        registry
            .register_route("out", targets("round_robin", &["a", "b"]))
            .unwrap();
        assert_eq!(adapter_at(&registry, "out"), "a");
        assert_eq!(registry.get_route("out").unwrap().len(), 2);
        assert_eq!(registry.list_routes(), vec!["out"]);
        assert_eq!(adapter_at(&registry, "out"), "b");
    }

    #[test]
    fn test_failover_candidates() {
        let registry = OutboundRouteRegistry::new();
        registry
            .register_route("out", targets("failover", &["primary", "secondary", "tertiary"]))
            .unwrap();
        let selection = registry.select_target("out", &Envelope::new("/out")).unwrap();
        assert!(selection.is_failover());
        assert_eq!(selection.index, 0);
        let order: Vec<_> = selection
            .candidates()
            .iter()
            .map(OutboundTarget::adapter_name)
            .collect();
        assert_eq!(order, vec!["primary", "secondary", "tertiary"]);
    }

    #[test]
    fn test_non_failover_has_single_candidate() {
        let registry = OutboundRouteRegistry::new();
        registry
            .register_route("out", targets("round_robin", &["a", "b"]))
            .unwrap();
        registry.select_target("out", &Envelope::new("/out")).unwrap();
        let selection = registry.select_target("out", &Envelope::new("/out")).unwrap();
        assert_eq!(selection.candidates().len(), 1);
        assert_eq!(selection.candidates()[0].adapter_name(), "b");
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = OutboundRouteRegistry::new();
        registry.register_route("a", targets("first", &["x"])).unwrap();
        registry.register_route("b", targets("first", &["y"])).unwrap();
        assert_eq!(registry.policy("a"), Some(LoadBalancing::First));

        assert!(registry.remove_route("a"));
        assert!(!registry.remove_route("a"));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.get_route("b").is_none());
    }

    proptest! {
        #[test]
        fn prop_round_robin_returns_i_mod_n(n in 1usize..8, calls in 1usize..40) {
            let registry = OutboundRouteRegistry::new();
            let names: Vec<String> = (0..n).map(|i| format!("t{}", i)).collect();
            let list = names
                .iter()
                .map(|name| OutboundTarget::simple(name.as_str(), "round_robin").unwrap())
                .collect();
            registry.register_route("out", list).unwrap();

            for i in 0..calls {
                let selection = registry.select_target("out", &Envelope::new("/out")).unwrap();
                prop_assert_eq!(selection.index, i % n);
            }
        }
    }
}
