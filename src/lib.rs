//! Intentbus: Intent Resolution Agents
//!
//! Agents share one publish/subscribe topic. Each inbound message is a JSON
//! tree that may carry an intent node somewhere inside it; an agent locates
//! the governing intent, dispatches it to a registered resolver, splices the
//! result back in place and republishes the message.

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod resolver;
pub mod tooling;
pub mod transport;
pub mod types;

pub use agent::{Agent, AgentBuilder, AgentHooks, DeliveryOutcome};
pub use engine::{IntentEngine, IntentPath, Resolution};
pub use error::{AgentError, DomainError, ResolveError, TransportError};
pub use message::Intent;
pub use resolver::{FnResolver, Resolver, ResolverRegistry};
pub use types::{Fields, MessageTree};
