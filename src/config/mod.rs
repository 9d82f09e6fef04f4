//! Agent configuration
//!
//! Settings are layered by [`ConfigLoader`]: built-in defaults, the global
//! config file, an explicit `--config` file, then `INTENTBUS__*` environment
//! variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::AgentError;
use crate::logging::LoggingConfig;
use crate::publisher::{backoff_delay, PublisherConfig};
use crate::resolver::StaticResolverConfig;
use crate::types::DEFAULT_TOPIC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Complete agent settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub agent: AgentSection,
    pub bus: BusConfig,
    pub delivery: DeliveryConfig,
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
    /// Static resolvers keyed by intent name
    pub resolvers: BTreeMap<String, StaticResolverConfig>,
}

impl AgentSettings {
    /// Check values the type system cannot express
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.name.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "agent.name cannot be empty".to_string(),
            ));
        }
        if self.bus.topic.trim().is_empty() {
            return Err(AgentError::ConfigError("bus.topic cannot be empty".to_string()));
        }
        if self.bus.poll_timeout_ms == 0 {
            return Err(AgentError::ConfigError(
                "bus.poll_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.publisher.max_queue_size == 0 {
            return Err(AgentError::ConfigError(
                "publisher.max_queue_size must be greater than zero".to_string(),
            ));
        }
        if self.publisher.retry_delay_ms > self.publisher.max_retry_delay_ms {
            return Err(AgentError::ConfigError(
                "publisher.retry_delay_ms cannot exceed publisher.max_retry_delay_ms".to_string(),
            ));
        }
        if self.delivery.redelivery_delay_ms > self.delivery.max_redelivery_delay_ms {
            return Err(AgentError::ConfigError(
                "delivery.redelivery_delay_ms cannot exceed delivery.max_redelivery_delay_ms"
                    .to_string(),
            ));
        }
        for (name, resolver) in &self.resolvers {
            resolver.validate(name).map_err(AgentError::ConfigError)?;
        }
        Ok(())
    }
}

/// Agent identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub name: String,
    /// Register the built-in `echo` resolver
    pub builtin_resolvers: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            builtin_resolvers: true,
        }
    }
}

/// Which transport the binary connects to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON on stdin/stdout
    #[default]
    Stdio,
    /// In-process loopback bus
    Memory,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => f.write_str("stdio"),
            TransportKind::Memory => f.write_str("memory"),
        }
    }
}

/// Bus connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub transport: TransportKind,
    pub topic: String,
    /// How long a single consume waits for a message
    pub poll_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            topic: DEFAULT_TOPIC.to_string(),
            poll_timeout_ms: 500,
        }
    }
}

impl BusConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Delivery loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Declines tolerated per message before it is discarded; `"unbounded"` never discards
    #[serde(with = "redelivery_limit")]
    pub max_redeliveries: Option<u32>,
    /// Pause before the first redelivery of a declined message (milliseconds)
    pub redelivery_delay_ms: u64,
    /// Upper bound for the exponential redelivery pause (milliseconds)
    pub max_redelivery_delay_ms: u64,
    /// Pause after a failed consume (milliseconds)
    pub consume_retry_delay_ms: u64,
    /// How long shutdown waits for the outbound queue (milliseconds)
    pub drain_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: Some(10),
            redelivery_delay_ms: 100,
            max_redelivery_delay_ms: 5_000,
            consume_retry_delay_ms: 500,
            drain_timeout_ms: 5_000,
        }
    }
}

impl DeliveryConfig {
    /// Pause before declining a message for the `attempts`-th time
    pub fn redelivery_delay(&self, attempts: u32) -> Duration {
        backoff_delay(self.redelivery_delay_ms, self.max_redelivery_delay_ms, attempts)
    }

    /// Longest pause the delivery loop takes before a redelivery
    pub fn max_redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.max_redelivery_delay_ms)
    }
}

/// Redelivery limit as either a count or the word `unbounded`.
pub mod redelivery_limit {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const UNBOUNDED: &str = "unbounded";

    pub fn serialize<S: Serializer>(limit: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match limit {
            Some(count) => serializer.serialize_u32(*count),
            None => serializer.serialize_str(UNBOUNDED),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Limit {
        Count(u32),
        Word(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        match Limit::deserialize(deserializer)? {
            Limit::Count(count) => Ok(Some(count)),
            Limit::Word(word) if word.eq_ignore_ascii_case(UNBOUNDED) => Ok(None),
            Limit::Word(word) => word.parse().map(Some).map_err(|_| {
                de::Error::custom(format!(
                    "invalid redelivery limit '{}' (expected a count or '{}')",
                    word, UNBOUNDED
                ))
            }),
        }
    }

    /// Parse a CLI value
    pub fn parse(value: &str) -> Result<Option<u32>, String> {
        if value.eq_ignore_ascii_case(UNBOUNDED) {
            return Ok(None);
        }
        value
            .parse()
            .map(Some)
            .map_err(|_| format!("expected a count or '{}'", UNBOUNDED))
    }
}
