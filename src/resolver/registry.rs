//! Resolver registry.

use super::{EchoResolver, Resolver, StaticResolver};
use crate::config::AgentSettings;
use crate::error::AgentError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry mapping intent names to resolvers
///
/// Populated once before the delivery loop starts, then shared read-only.
/// The first registration for a name wins.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under its own name
    ///
    /// Returns `false` and leaves the registry untouched when the name is
    /// already taken.
    pub fn register(&mut self, resolver: Arc<dyn Resolver>) -> bool {
        let name = resolver.name().to_string();
        if self.resolvers.contains_key(&name) {
            debug!(resolver = %name, "Resolver already registered, keeping first");
            return false;
        }
        debug!(resolver = %name, "Registered resolver");
        self.resolvers.insert(name, resolver);
        true
    }

    /// Get a resolver by intent name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Register the built-in and config-declared resolvers
    pub fn load_from_settings(&mut self, settings: &AgentSettings) -> Result<(), AgentError> {
        let mut declared: Vec<_> = settings.resolvers.iter().collect();
        declared.sort_by(|a, b| a.0.cmp(b.0));

        for (name, resolver_config) in declared {
            resolver_config
                .validate(name)
                .map_err(AgentError::ConfigError)?;
            if !self.register(Arc::new(StaticResolver::new(
                name.clone(),
                resolver_config.clone(),
            ))) {
                warn!(resolver = %name, "Configured resolver shadowed by an earlier registration");
            }
        }

        if settings.agent.builtin_resolvers {
            self.register(Arc::new(EchoResolver::default()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{FnResolver, StaticResolverConfig};
    use crate::types::Fields;
    use serde_json::json;

    fn constant(name: &str, tag: &'static str) -> Arc<dyn Resolver> {
        Arc::new(FnResolver::new(name, move |_, _| {
            let mut out = Fields::new();
            out.insert("tag".to_string(), json!(tag));
            Ok(out)
        }))
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = ResolverRegistry::new();
        assert!(registry.register(constant("a", "first")));
        assert!(!registry.register(constant("a", "second")));
        assert_eq!(registry.len(), 1);

        let node = json!({"intent": "a"});
        let intent = crate::message::Intent::from_fields(node.as_object().unwrap()).unwrap();
        let out = registry.get("a").unwrap().resolve(&intent, &node).unwrap();
        assert_eq!(out.get("tag"), Some(&json!("first")));
    }

    #[test]
    fn test_lookup_absent() {
        let registry = ResolverRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ResolverRegistry::new();
        registry.register(constant("z", "z"));
        registry.register(constant("a", "a"));
        registry.register(constant("m", "m"));
        assert_eq!(registry.names(), vec!["a", "m", "z"]);
    }

    #[test]
    fn test_load_from_settings() {
        let mut settings = AgentSettings::default();
        settings.resolvers.insert(
            "user.get".to_string(),
            StaticResolverConfig {
                reply: serde_json::from_value(serde_json::json!({"email": "{email}"})).unwrap(),
                data_type: Some("user".to_string()),
                ..Default::default()
            },
        );
        let mut registry = ResolverRegistry::new();
        registry.load_from_settings(&settings).unwrap();
        assert!(registry.contains("user.get"));
        assert!(registry.contains(EchoResolver::DEFAULT_NAME));
    }

    #[test]
    fn test_load_from_settings_rejects_invalid() {
        let mut settings = AgentSettings::default();
        settings
            .resolvers
            .insert("broken".to_string(), StaticResolverConfig::default());
        let mut registry = ResolverRegistry::new();
        let err = registry.load_from_settings(&settings).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn test_builtins_can_be_disabled() {
        let mut settings = AgentSettings::default();
        settings.agent.builtin_resolvers = false;
        let mut registry = ResolverRegistry::new();
        registry.load_from_settings(&settings).unwrap();
        assert!(registry.is_empty());
    }
}
