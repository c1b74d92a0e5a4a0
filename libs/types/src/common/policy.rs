//! Dispatch policy discriminators
//!
//! Both enums are closed sets: anything coming from configuration is parsed
//! through [`FromStr`] (or serde, which delegates to it), so an unknown name
//! is rejected when the port or target is built, never at request time.

use super::errors::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inbound routing strategy selection for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyKind {
    /// Invoke only the first registered handler
    #[default]
    First,
    /// Invoke every handler, isolating failures
    Broadcast,
    /// Rotate through handlers, one per call
    RoundRobin,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::First => "first",
            StrategyKind::Broadcast => "broadcast",
            StrategyKind::RoundRobin => "round_robin",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(StrategyKind::First),
            "broadcast" => Ok(StrategyKind::Broadcast),
            "round_robin" => Ok(StrategyKind::RoundRobin),
            other => Err(TypesError::UnknownStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for StrategyKind {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrategyKind> for String {
    fn from(kind: StrategyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound load-balancing policy for a route's targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoadBalancing {
    /// Always the first target
    First,
    /// Rotate through targets, one per selection
    RoundRobin,
    /// First target, walking the rest of the list on failure
    Failover,
}

impl LoadBalancing {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancing::First => "first",
            LoadBalancing::RoundRobin => "round_robin",
            LoadBalancing::Failover => "failover",
        }
    }
}

impl FromStr for LoadBalancing {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(LoadBalancing::First),
            "round_robin" => Ok(LoadBalancing::RoundRobin),
            "failover" => Ok(LoadBalancing::Failover),
            other => Err(TypesError::UnknownLoadBalancing(other.to_string())),
        }
    }
}

impl TryFrom<String> for LoadBalancing {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoadBalancing> for String {
    fn from(policy: LoadBalancing) -> Self {
        policy.as_str().to_string()
    }
}

impl fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
