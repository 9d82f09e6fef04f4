//! Intent Agent
//!
//! Runs the delivery loop: pull one envelope from the transport, decode it,
//! resolve its governing intent, queue the result for publishing, then
//! acknowledge or decline the envelope depending on the outcome.
//!
//! Resolution is synchronous and never waits on the bus; publishing happens
//! on the [`Publisher`] worker.

pub mod delivery;
pub mod redelivery;

pub use delivery::{DeclineReason, DeliveryOutcome, DeliveryStats};
pub use redelivery::{RedeliveryDecision, RedeliveryTracker};

use crate::config::{AgentSettings, DeliveryConfig};
use crate::engine::{IntentEngine, Resolution};
use crate::error::{AgentError, ResolveError, TransportError};
use crate::message;
use crate::publisher::{Publisher, PublisherStats};
use crate::resolver::{Resolver, ResolverRegistry};
use crate::transport::{Envelope, Transport};
use crate::types::MessageTree;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Observation points around the delivery loop.
pub trait AgentHooks: Send + Sync {
    /// Called for every envelope before it is decoded
    fn on_reception(&self, _envelope: &Envelope) {}

    /// Called for every message right before it is queued for publishing
    fn on_sending(&self, _message: &MessageTree) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl AgentHooks for NoopHooks {}

/// Builder for [`Agent`]; the only way to populate its registry.
pub struct AgentBuilder {
    name: Option<String>,
    registry: ResolverRegistry,
    settings: AgentSettings,
    transport: Option<Arc<dyn Transport>>,
    hooks: Arc<dyn AgentHooks>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::from_settings(AgentSettings::default())
        }
    }

    /// Start from loaded settings; the agent name comes from `agent.name`
    pub fn from_settings(settings: AgentSettings) -> Self {
        Self {
            name: None,
            registry: ResolverRegistry::new(),
            settings,
            transport: None,
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Register a resolver; the first registration of a name wins
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.registry.register(resolver);
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build the agent
    ///
    /// Resolvers declared in settings are registered after the ones added
    /// through [`AgentBuilder::resolver`], so code-registered resolvers win.
    pub fn build(mut self) -> Result<Agent, AgentError> {
        let transport = self
            .transport
            .take()
            .ok_or_else(|| AgentError::ConfigError("Agent requires a transport".to_string()))?;
        self.registry.load_from_settings(&self.settings)?;

        let name = self
            .name
            .unwrap_or_else(|| self.settings.agent.name.clone());
        let publisher = Publisher::new(Arc::clone(&transport), self.settings.publisher.clone());

        Ok(Agent {
            name,
            engine: IntentEngine::new(Arc::new(self.registry)),
            transport,
            publisher,
            hooks: self.hooks,
            redeliveries: RedeliveryTracker::new(self.settings.delivery.max_redeliveries),
            delivery: self.settings.delivery,
            stats: RwLock::new(DeliveryStats::default()),
            running: RwLock::new(false),
            stop_requested: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }
}

/// Transport-agnostic intent agent
pub struct Agent {
    name: String,
    engine: IntentEngine,
    transport: Arc<dyn Transport>,
    publisher: Publisher,
    hooks: Arc<dyn AgentHooks>,
    delivery: DeliveryConfig,
    redeliveries: RedeliveryTracker,
    stats: RwLock<DeliveryStats>,
    running: RwLock<bool>,
    /// Set by [`Agent::stop`]; survives until the next `run` returns
    stop_requested: AtomicBool,
    shutdown: Notify,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ResolverRegistry {
        self.engine.registry()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats.read().clone()
    }

    pub fn publisher_stats(&self) -> PublisherStats {
        self.publisher.stats()
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Resolve a message without touching the bus
    pub fn resolve(&self, message: &MessageTree) -> Result<Resolution, ResolveError> {
        self.engine.resolve_message(message)
    }

    /// Queue an application message (for example a seed intent) for publishing
    pub fn publish(&self, message: &MessageTree) -> Result<(), AgentError> {
        self.hooks.on_sending(message);
        self.publisher.enqueue(message, None)
    }

    /// Run the delivery loop until [`Agent::stop`] is called or the transport closes
    ///
    /// Queued messages are drained (bounded by `drain_timeout_ms`) before returning.
    pub async fn run(&self) -> Result<(), AgentError> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(AgentError::ConfigError(format!(
                    "Agent '{}' is already running",
                    self.name
                )));
            }
            *running = true;
        }

        self.publisher.start();
        info!(
            agent = %self.name,
            resolvers = ?self.registry().names(),
            "Agent started"
        );

        let retry_delay = Duration::from_millis(self.delivery.consume_retry_delay_ms);
        while !self.stop_requested.load(Ordering::SeqCst) {
            let consumed = tokio::select! {
                consumed = self.transport.consume() => consumed,
                _ = self.shutdown.notified() => continue,
            };

            match consumed {
                Ok(Some(envelope)) => {
                    if let Err(e) = self.handle_envelope(&envelope).await {
                        error!(
                            agent = %self.name,
                            envelope = %envelope.id,
                            error = %e,
                            "Failed to settle delivery"
                        );
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    info!(agent = %self.name, "Transport closed");
                    break;
                }
                Err(e) => {
                    warn!(
                        agent = %self.name,
                        error = %e,
                        retry_ms = self.delivery.consume_retry_delay_ms,
                        "Consume failed, retrying"
                    );
                    sleep(retry_delay).await;
                }
            }
        }
        *self.running.write() = false;
        self.stop_requested.store(false, Ordering::SeqCst);

        let drain_timeout = Duration::from_millis(self.delivery.drain_timeout_ms);
        if let Err(e) = self.publisher.wait_for_completion(Some(drain_timeout)).await {
            warn!(agent = %self.name, error = %e, "Outbound queue not fully drained");
        }
        self.publisher.stop().await;

        info!(
            agent = %self.name,
            stats = ?self.stats(),
            "Agent stopped"
        );
        Ok(())
    }

    /// Ask the delivery loop to finish
    ///
    /// A stop requested before [`Agent::run`] makes that run return without
    /// consuming anything.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Sleep for `delay` unless a stop arrives first
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() || self.stop_requested.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.shutdown.notified() => {}
        }
    }

    /// Process one envelope and settle it with the transport
    pub async fn handle_envelope(&self, envelope: &Envelope) -> Result<DeliveryOutcome, AgentError> {
        self.hooks.on_reception(envelope);
        self.stats.write().received += 1;

        let outcome = match self.process(envelope) {
            // Publisher backpressure does not count against the redelivery budget
            DeliveryOutcome::Declined(DeclineReason::QueueFull) => {
                let wait = self.delivery.max_redelivery_delay();
                let freed = if self.stop_requested.load(Ordering::SeqCst) {
                    false
                } else {
                    tokio::select! {
                        freed = self.publisher.wait_for_space(wait) => freed,
                        _ = self.shutdown.notified() => false,
                    }
                };
                debug!(
                    envelope = %envelope.id,
                    space_available = freed,
                    "Outbound queue full, declining delivery"
                );
                self.transport.decline(envelope).await?;
                DeliveryOutcome::Declined(DeclineReason::QueueFull)
            }
            DeliveryOutcome::Declined(reason) => {
                match self.redeliveries.record_decline(&envelope.id) {
                    RedeliveryDecision::Redeliver { attempts } => {
                        let delay = self.delivery.redelivery_delay(attempts);
                        debug!(
                            envelope = %envelope.id,
                            reason = %reason,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Declining delivery"
                        );
                        self.pause(delay).await;
                        self.transport.decline(envelope).await?;
                        DeliveryOutcome::Declined(reason)
                    }
                    RedeliveryDecision::GiveUp { attempts } => {
                        warn!(
                            envelope = %envelope.id,
                            reason = %reason,
                            attempts,
                            "Redelivery limit reached, discarding message"
                        );
                        self.transport.ack(envelope).await?;
                        DeliveryOutcome::Discarded { reason, attempts }
                    }
                }
            }
            settled => {
                self.transport.ack(envelope).await?;
                self.redeliveries.clear(&envelope.id);
                settled
            }
        };

        self.stats.write().record(&outcome);
        Ok(outcome)
    }

    /// Decode, resolve and queue; no transport interaction
    fn process(&self, envelope: &Envelope) -> DeliveryOutcome {
        let tree = match message::decode(&envelope.payload) {
            Ok(tree) => tree,
            Err(e) => {
                debug!(envelope = %envelope.id, error = %e, "Undecodable delivery");
                return DeliveryOutcome::Declined(DeclineReason::Undecodable);
            }
        };

        let resolution = match self.engine.resolve_message(&tree) {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!(envelope = %envelope.id, error = %e, "Delivery not resolved");
                return DeliveryOutcome::Declined(DeclineReason::from(&e));
            }
        };

        self.hooks.on_sending(&resolution.message);
        if let Err(e) = self
            .publisher
            .enqueue(&resolution.message, Some(envelope.id.clone()))
        {
            warn!(envelope = %envelope.id, error = %e, "Could not queue resolved message");
            return DeliveryOutcome::Declined(DeclineReason::QueueFull);
        }

        match resolution.domain_error {
            Some(domain_error) => {
                info!(
                    envelope = %envelope.id,
                    intent = %resolution.intent,
                    path = %resolution.path,
                    error = %domain_error.message,
                    "Intent resolved with domain error"
                );
                DeliveryOutcome::DomainError {
                    intent: resolution.intent,
                    message: domain_error.message,
                }
            }
            None => {
                info!(
                    envelope = %envelope.id,
                    intent = %resolution.intent,
                    path = %resolution.path,
                    "Intent resolved"
                );
                DeliveryOutcome::Resolved {
                    intent: resolution.intent,
                }
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("registry", self.registry())
            .field("delivery", &self.delivery)
            .finish()
    }
}
