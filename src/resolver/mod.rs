//! Resolvers
//!
//! A resolver is the business logic bound to one intent name. Given the
//! intent node and the full message it produces the fields that replace the
//! intent, or declares a domain failure that the engine renders back into the
//! message.

pub mod builtin;
mod registry;

pub use builtin::{EchoResolver, StaticResolver, StaticResolverConfig};
pub use registry::ResolverRegistry;

use crate::error::DomainError;
use crate::message::Intent;
use crate::types::{Fields, MessageTree};
use serde_json::Value;

/// Handler bound to one intent name.
pub trait Resolver: Send + Sync {
    /// Intent name this resolver answers to
    fn name(&self) -> &str;

    /// Data type tag inserted under `data` in every successful result
    fn data_type(&self) -> Option<&str> {
        None
    }

    /// Produce the replacement fields for `intent`; `message` is the unmodified root.
    fn resolve(&self, intent: &Intent, message: &MessageTree) -> Result<Fields, DomainError>;

    /// Render a domain failure as the fields left at the intent's location
    fn error_object(&self, error: &DomainError) -> Fields {
        details_object(error)
    }
}

/// Structured details of a domain error when they form an object.
pub fn details_object(error: &DomainError) -> Fields {
    match &error.details {
        Some(Value::Object(details)) => details.clone(),
        _ => Fields::new(),
    }
}

type ResolveFn = dyn Fn(&Intent, &MessageTree) -> Result<Fields, DomainError> + Send + Sync;
type ErrorObjectFn = dyn Fn(&DomainError) -> Fields + Send + Sync;

/// Resolver backed by closures.
pub struct FnResolver {
    name: String,
    data_type: Option<String>,
    resolve: Box<ResolveFn>,
    error_object: Option<Box<ErrorObjectFn>>,
}

impl FnResolver {
    pub fn new<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Intent, &MessageTree) -> Result<Fields, DomainError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            data_type: None,
            resolve: Box::new(resolve),
            error_object: None,
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_error_object<F>(mut self, error_object: F) -> Self
    where
        F: Fn(&DomainError) -> Fields + Send + Sync + 'static,
    {
        self.error_object = Some(Box::new(error_object));
        self
    }
}

impl Resolver for FnResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    fn resolve(&self, intent: &Intent, message: &MessageTree) -> Result<Fields, DomainError> {
        (self.resolve)(intent, message)
    }

    fn error_object(&self, error: &DomainError) -> Fields {
        match &self.error_object {
            Some(render) => render(error),
            None => details_object(error),
        }
    }
}

impl std::fmt::Debug for FnResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnResolver")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}
