//! Built-in resolvers: echo and config-declared static replies.

use super::Resolver;
use crate::error::DomainError;
use crate::message::Intent;
use crate::types::{Fields, MessageTree};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answers an intent with its own arguments.
#[derive(Debug, Clone)]
pub struct EchoResolver {
    name: String,
}

impl EchoResolver {
    pub const DEFAULT_NAME: &'static str = "echo";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoResolver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl Resolver for EchoResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, intent: &Intent, _message: &MessageTree) -> Result<Fields, DomainError> {
        Ok(intent
            .arguments()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// Static resolver configuration owned by the resolver domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticResolverConfig {
    /// Reply fields; string values may use `{field}` placeholders
    #[serde(default)]
    pub reply: Fields,

    /// Data type tag for successful replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// When set, every resolution fails with this domain error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_with: Option<String>,
}

impl StaticResolverConfig {
    /// Validate a static resolver declaration.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("Resolver name cannot be empty".to_string());
        }
        if let Some(message) = &self.fail_with {
            if message.trim().is_empty() {
                return Err(format!(
                    "Resolver '{}' fail_with cannot be empty if provided",
                    name
                ));
            }
        }
        if self.reply.is_empty() && self.fail_with.is_none() {
            return Err(format!("Resolver '{}' requires reply or fail_with", name));
        }
        Ok(())
    }
}

/// Resolver answering with a configured reply table.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    name: String,
    config: StaticResolverConfig,
}

impl StaticResolver {
    pub fn new(name: impl Into<String>, config: StaticResolverConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn render(template: &Value, intent: &Intent) -> Value {
        match template {
            Value::String(text) => {
                let mut rendered = text.clone();
                for (key, value) in intent.arguments() {
                    if let Value::String(arg) = value {
                        rendered = rendered.replace(&format!("{{{}}}", key), arg);
                    }
                }
                Value::String(rendered)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| Self::render(item, intent)).collect())
            }
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::render(value, intent)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Resolver for StaticResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> Option<&str> {
        self.config.data_type.as_deref()
    }

    fn resolve(&self, intent: &Intent, _message: &MessageTree) -> Result<Fields, DomainError> {
        if let Some(message) = &self.config.fail_with {
            return Err(DomainError::new(message.clone())
                .with_details(Value::Object(self.config.reply.clone())));
        }
        Ok(self
            .config
            .reply
            .iter()
            .map(|(key, value)| (key.clone(), Self::render(value, intent)))
            .collect())
    }
}
