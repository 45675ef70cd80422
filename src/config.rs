//! Outbox configuration.
//!
//! Every field has a default, so an empty JSON object or an empty
//! environment yields a working in-process setup.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outbox::PayloadCodec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Master switch. Off means publishes go straight to the inner bus and
    /// no relay runs.
    pub enabled: bool,
    pub relay: RelaySettings,
    pub broker: BrokerSettings,
    pub routing: RoutingConfig,
    pub codec: PayloadCodec,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            relay: RelaySettings::default(),
            broker: BrokerSettings::default(),
            routing: RoutingConfig::default(),
            codec: PayloadCodec::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub enabled: bool,
    pub polling_interval_ms: u64,
    pub batch_size: usize,
    pub lock_name: String,
    pub lock_ttl_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval_ms: 1000,
            batch_size: 100,
            lock_name: "outbox-relay".to_string(),
            lock_ttl_ms: 30_000,
        }
    }
}

impl RelaySettings {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

/// Broker connection and topic provisioning settings. Consumed by broker
/// sink implementations; the in-memory broker ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub bootstrap_servers: String,
    pub partitions: u32,
    pub replicas: u32,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            partitions: 3,
            replicas: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub token: String,
    pub topic: String,
}

impl RoutingRule {
    pub fn new(token: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub default_topic: String,
    /// Checked in order; first token found in the event type wins.
    pub rules: Vec<RoutingRule>,
    pub explicit: BTreeMap<String, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_topic: "domain-events".to_string(),
            rules: vec![
                RoutingRule::new("Order", "order-events"),
                RoutingRule::new("Payment", "payment-events"),
                RoutingRule::new("Inventory", "inventory-events"),
            ],
            explicit: BTreeMap::new(),
        }
    }
}

impl OutboxConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `OUTBOX_*` environment variables.
    ///
    /// - `OUTBOX_ENABLED`: `true` / `false`
    /// - `OUTBOX_POLLING_INTERVAL_MS`
    /// - `OUTBOX_BATCH_SIZE`
    /// - `OUTBOX_BOOTSTRAP_SERVERS`
    /// - `OUTBOX_DEFAULT_TOPIC`
    /// - `OUTBOX_CODEC`: `json` / `compact`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("OUTBOX_ENABLED") {
            config.enabled = parse("OUTBOX_ENABLED", v)?;
        }
        if let Some(v) = lookup("OUTBOX_POLLING_INTERVAL_MS") {
            config.relay.polling_interval_ms = parse("OUTBOX_POLLING_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("OUTBOX_BATCH_SIZE") {
            config.relay.batch_size = parse("OUTBOX_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("OUTBOX_BOOTSTRAP_SERVERS") {
            config.broker.bootstrap_servers = v;
        }
        if let Some(v) = lookup("OUTBOX_DEFAULT_TOPIC") {
            config.routing.default_topic = v;
        }
        if let Some(v) = lookup("OUTBOX_CODEC") {
            config.codec = match v.to_ascii_lowercase().as_str() {
                "json" => PayloadCodec::Json,
                "compact" => PayloadCodec::Compact,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "OUTBOX_CODEC",
                        value: v,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "relay.batch_size",
                value: "0".to_string(),
            });
        }
        if self.relay.polling_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "relay.polling_interval_ms",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Whether publishes inside a transaction should be captured.
    pub fn capture_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a relay should run in this process.
    pub fn relay_enabled(&self) -> bool {
        self.enabled && self.relay.enabled
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
