//! Runtime Configuration Module
//!
//! Typed configuration consumed by the relay runtime. Loading is from TOML
//! (string or file) followed by environment overrides and validation; an
//! invalid configuration is rejected before any port or route is built.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::{LoadBalancing, StrategyKind};

/// Environment variable overriding `logging.level`
pub const LOG_LEVEL_ENV: &str = "RELAY_LOG_LEVEL";

/// Top-level runtime configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,
    pub middleware: MiddlewareConfig,
    /// Inbound ports by name
    pub ports: BTreeMap<String, PortConfig>,
    /// Outbound ports by name
    pub outbound: BTreeMap<String, OutboundPortConfig>,
}

/// Logging settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Middleware chain settings
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub timeout: TimeoutConfig,
    pub observability: ObservabilityConfig,
}

/// Deadline enforcement settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub enabled: bool,
    pub timeout_seconds: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 30.0,
        }
    }
}

impl TimeoutConfig {
    pub fn enabled(timeout_seconds: f64) -> Self {
        Self {
            enabled: true,
            timeout_seconds,
        }
    }

    /// Deadline as a `Duration`; `None` when disabled or not representable
    pub fn duration(&self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        self.checked_duration().ok()
    }

    /// `timeout_seconds` converted without panicking on out-of-range values
    fn checked_duration(&self) -> Result<Duration> {
        if !(self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0) {
            bail!(
                "middleware.timeout.timeout_seconds must be positive, got {}",
                self.timeout_seconds
            );
        }
        Duration::try_from_secs_f64(self.timeout_seconds).with_context(|| {
            format!(
                "middleware.timeout.timeout_seconds is out of range: {}",
                self.timeout_seconds
            )
        })
    }
}

/// Span/metrics middleware settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Inbound port settings
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PortConfig {
    /// Concurrency limit; unbounded when absent
    pub max_concurrent: Option<usize>,
    pub strategy: StrategyKind,
    /// Handler references, resolved against the handler table at bootstrap
    pub handlers: Vec<String>,
}

/// Outbound port settings
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct OutboundPortConfig {
    pub targets: Vec<TargetConfig>,
}

/// One remote target of an outbound port
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TargetConfig {
    pub adapter: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Raw discriminator, validated when the target is built
    #[serde(default = "default_load_balancing")]
    pub load_balancing: String,
}

fn default_load_balancing() -> String {
    LoadBalancing::First.as_str().to_string()
}

impl RuntimeConfig {
    /// Parse from a TOML string, apply environment overrides and validate
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let mut config: RuntimeConfig =
            toml::from_str(toml_str).context("Failed to parse runtime configuration")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading runtime config: {:?}", path);
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&contents)
    }

    /// Apply `RELAY_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                debug!("Log level overridden by {}: {}", LOG_LEVEL_ENV, level);
                self.logging.level = level;
            }
        }
    }

    /// Reject anything that would otherwise fail later at request time
    pub fn validate(&self) -> Result<()> {
        let timeout = &self.middleware.timeout;
        if timeout.enabled {
            timeout.checked_duration()?;
        }

        for (name, port) in &self.ports {
            if name.is_empty() {
                bail!("Inbound port name cannot be empty");
            }
            if port.max_concurrent == Some(0) {
                bail!("Port '{}' has max_concurrent = 0", name);
            }
        }

        for (name, outbound) in &self.outbound {
            if outbound.targets.is_empty() {
                bail!("Outbound port '{}' has no targets", name);
            }
            let mut policies = Vec::with_capacity(outbound.targets.len());
            for (index, target) in outbound.targets.iter().enumerate() {
                if target.adapter.is_empty() {
                    bail!("Outbound port '{}' target[{}] has no adapter", name, index);
                }
                let policy: LoadBalancing = target.load_balancing.parse().with_context(|| {
                    format!("Outbound port '{}' target[{}]", name, index)
                })?;
                policies.push(policy);
            }
            if policies.windows(2).any(|pair| pair[0] != pair[1]) {
                bail!(
                    "Outbound port '{}' mixes load balancing policies across targets",
                    name
                );
            }
        }

        Ok(())
    }

    pub fn port(&self, name: &str) -> Option<&PortConfig> {
        self.ports.get(name)
    }

    pub fn outbound_port(&self, name: &str) -> Option<&OutboundPortConfig> {
        self.outbound.get(name)
    }

    /// `(port, limit)` pairs for every port with a concurrency limit
    pub fn concurrency_limits(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ports
            .iter()
            .filter_map(|(name, port)| port.max_concurrent.map(|limit| (name.as_str(), limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_config() -> &'static str {
        r#"
            [logging]
            level = "debug"

            [middleware.timeout]
            enabled = true
            timeout_seconds = 2.5

            [ports.orders]
            max_concurrent = 8
            strategy = "round_robin"
            handlers = ["orders::create", "orders::create_backup"]

            [ports.audit]
            strategy = "broadcast"
            handlers = ["audit::log"]

            [[outbound.billing.targets]]
            adapter = "http"
            load_balancing = "failover"
            config = { url = "http://billing-a", trace_format = "w3c" }

            [[outbound.billing.targets]]
            adapter = "http"
            load_balancing = "failover"
            config = { url = "http://billing-b" }
        "#
    }

    #[test]
    fn test_parse_full_config() {
        let config = RuntimeConfig::from_toml_str(sample_config()).unwrap();

        assert_eq!(config.middleware.timeout.duration(), Some(Duration::from_millis(2500)));
        assert!(config.middleware.observability.enabled);

        let orders = config.port("orders").unwrap();
        assert_eq!(orders.max_concurrent, Some(8));
        assert_eq!(orders.strategy, StrategyKind::RoundRobin);
        assert_eq!(orders.handlers.len(), 2);

        let audit = config.port("audit").unwrap();
        assert_eq!(audit.max_concurrent, None);
        assert_eq!(audit.strategy, StrategyKind::Broadcast);

        let billing = config.outbound_port("billing").unwrap();
        assert_eq!(billing.targets.len(), 2);
        assert_eq!(billing.targets[0].load_balancing, "failover");
        assert_eq!(
            billing.targets[0].config.get("trace_format"),
            Some(&Value::String("w3c".to_string()))
        );

        let limits: Vec<_> = config.concurrency_limits().collect();
        assert_eq!(limits, vec![("orders", 8)]);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert!(config.ports.is_empty());
        assert!(!config.middleware.timeout.enabled);
        assert_eq!(config.middleware.timeout.duration(), None);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result = RuntimeConfig::from_toml_str(
            r#"
            [ports.p]
            strategy = "random"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_load_balancing_rejected() {
        let result = RuntimeConfig::from_toml_str(
            r#"
            [[outbound.x.targets]]
            adapter = "http"
            load_balancing = "least_connections"
        "#,
        );
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("least_connections"), "{}", message);
    }

    #[test]
    fn test_empty_targets_rejected() {
        let result = RuntimeConfig::from_toml_str(
            r#"
            [outbound.x]
            targets = []
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("no targets"));
    }

    #[test]
    fn test_mixed_policies_rejected() {
        let result = RuntimeConfig::from_toml_str(
            r#"
            [[outbound.x.targets]]
            adapter = "a"
            load_balancing = "first"

            [[outbound.x.targets]]
            adapter = "b"
            load_balancing = "round_robin"
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("mixes"));
    }

    #[test]
    fn test_zero_concurrency_and_bad_timeout_rejected() {
        assert!(RuntimeConfig::from_toml_str("[ports.p]\nmax_concurrent = 0").is_err());
        assert!(RuntimeConfig::from_toml_str(
            "[middleware.timeout]\nenabled = true\ntimeout_seconds = 0.0"
        )
        .is_err());
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let err = RuntimeConfig::from_toml_str(
            r#"
            [middleware.timeout]
            enabled = true
            timeout_seconds = 1e30

            [ports.p]
            handlers = ["h"]
        "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{}", err);

        let timeout = TimeoutConfig::enabled(1e30);
        assert_eq!(timeout.duration(), None);
        assert_eq!(TimeoutConfig::enabled(f64::NAN).duration(), None);
    }

    #[test]
    fn test_log_level_env_override() {
        let mut config = RuntimeConfig::from_toml_str("[logging]\nlevel = \"debug\"").unwrap();
        assert_eq!(config.logging.level, "debug");

        std::env::set_var(LOG_LEVEL_ENV, "trace");
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");

        std::env::set_var(LOG_LEVEL_ENV, "   ");
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");

        std::env::remove_var(LOG_LEVEL_ENV);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("runtime.toml");
        fs::write(&config_path, sample_config()).unwrap();

        let config = RuntimeConfig::from_file(&config_path).unwrap();
        assert_eq!(config.ports.len(), 2);

        assert!(RuntimeConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
