//! Outbound Publisher
//!
//! Bounded FIFO of encoded messages drained by a single background worker.
//! The delivery loop enqueues without blocking; the worker hands each message
//! to the transport and retries it with backoff until it goes through, so
//! submission order is preserved and nothing is dropped on transient failure.

use crate::error::AgentError;
use crate::message;
use crate::transport::{EnvelopeId, Transport};
use crate::types::MessageTree;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for the publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Maximum queued messages before enqueue is rejected
    pub max_queue_size: usize,
    /// Delay before the first retry (milliseconds)
    pub retry_delay_ms: u64,
    /// Upper bound for the exponential retry delay (milliseconds)
    pub max_retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1024,
            retry_delay_ms: 250,
            max_retry_delay_ms: 10_000,
        }
    }
}

impl PublisherConfig {
    /// Backoff before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.retry_delay_ms, self.max_retry_delay_ms, attempt)
    }
}

/// Exponential backoff: `base_ms` doubled per attempt after the first, capped at `max_ms`
pub fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// One encoded message waiting for the transport
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    /// Inbound delivery that produced this message, if any
    pub source: Option<EnvelopeId>,
    /// Failed publish attempts so far
    pub attempts: u32,
    pub enqueued_at: Instant,
}

/// Publisher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Messages waiting in the queue
    pub pending: usize,
    /// Messages currently being handed to the transport
    pub in_flight: usize,
    /// Messages accepted by the transport
    pub published: usize,
    /// Failed publish attempts that were retried
    pub retries: usize,
    /// Enqueue calls rejected because the queue was full
    pub rejected: usize,
}

/// Decoupled outbound publisher
pub struct Publisher {
    queue: Arc<Mutex<VecDeque<OutboundMessage>>>,
    /// Wakes the worker when a message is enqueued
    notify: Arc<Notify>,
    /// Wakes the worker out of a retry backoff on stop
    shutdown: Arc<Notify>,
    /// Signalled whenever the worker takes a message off the queue
    space: Arc<Notify>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
    transport: Arc<dyn Transport>,
    config: PublisherConfig,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<PublisherStats>>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, config: PublisherConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            space: Arc::new(Notify::new()),
            worker: Mutex::new(None),
            transport,
            config,
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(PublisherStats::default())),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Encode and enqueue a message tree
    pub fn enqueue(
        &self,
        tree: &MessageTree,
        source: Option<EnvelopeId>,
    ) -> Result<(), AgentError> {
        let payload = message::encode(tree)?;
        self.enqueue_bytes(payload, source)
    }

    /// Enqueue an already-encoded message
    ///
    /// Never blocks; fails with `QueueFull` when the queue is at capacity.
    pub fn enqueue_bytes(
        &self,
        payload: Vec<u8>,
        source: Option<EnvelopeId>,
    ) -> Result<(), AgentError> {
        let queue_size = {
            let mut queue = self.queue.lock();
            if queue.len() >= self.config.max_queue_size {
                self.stats.write().rejected += 1;
                warn!(
                    queue_size = queue.len(),
                    max_size = self.config.max_queue_size,
                    "Outbound queue is full, rejecting message"
                );
                return Err(AgentError::QueueFull(queue.len()));
            }
            queue.push_back(OutboundMessage {
                payload,
                source: source.clone(),
                attempts: 0,
                enqueued_at: Instant::now(),
            });
            queue.len()
        };

        self.notify.notify_one();

        debug!(
            source = ?source,
            queue_size,
            "Enqueued outbound message"
        );
        Ok(())
    }

    /// Start the background worker
    pub fn start(&self) {
        {
            let mut running = self.running.write();
            if *running {
                return;
            }
            *running = true;
        }

        let queue = Arc::clone(&self.queue);
        let notify = Arc::clone(&self.notify);
        let shutdown = Arc::clone(&self.shutdown);
        let space = Arc::clone(&self.space);
        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);

        let handle = tokio::spawn(async move {
            Self::worker_loop(queue, notify, shutdown, space, transport, config, running, stats)
                .await;
        });
        *self.worker.lock() = Some(handle);

        info!("Started publisher worker");
    }

    /// Stop the worker; queued messages are kept
    pub async fn stop(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }
        self.shutdown.notify_one();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        info!(pending = self.queue.lock().len(), "Stopped publisher worker");
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub fn stats(&self) -> PublisherStats {
        let mut stats = self.stats.read().clone();
        stats.pending = self.queue.lock().len();
        stats
    }

    /// Whether another message fits in the queue right now
    pub fn has_space(&self) -> bool {
        self.queue.lock().len() < self.config.max_queue_size
    }

    /// Wait up to `timeout` for the queue to have room for one more message
    pub async fn wait_for_space(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let freed = self.space.notified();
            tokio::pin!(freed);
            freed.as_mut().enable();

            if self.has_space() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, freed).await.is_err() {
                return self.has_space();
            }
        }
    }

    /// Wait until every queued message has been published
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> Result<(), AgentError> {
        let start = Instant::now();
        loop {
            let idle = {
                let queue = self.queue.lock();
                queue.is_empty() && self.stats.read().in_flight == 0
            };
            if idle {
                return Ok(());
            }

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(AgentError::Timeout(format!(
                        "publisher to drain ({} pending)",
                        self.queue.lock().len()
                    )));
                }
            }

            sleep(Duration::from_millis(10)).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn worker_loop(
        queue: Arc<Mutex<VecDeque<OutboundMessage>>>,
        notify: Arc<Notify>,
        shutdown: Arc<Notify>,
        space: Arc<Notify>,
        transport: Arc<dyn Transport>,
        config: PublisherConfig,
        running: Arc<RwLock<bool>>,
        stats: Arc<RwLock<PublisherStats>>,
    ) {
        debug!("Publisher worker started");

        while *running.read() {
            let next = {
                let mut queue = queue.lock();
                let next = queue.pop_front();
                if next.is_some() {
                    stats.write().in_flight += 1;
                }
                next
            };
            let Some(mut message) = next else {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = shutdown.notified() => {}
                }
                continue;
            };
            space.notify_waiters();

            loop {
                match transport.publish(&message.payload).await {
                    Ok(()) => {
                        {
                            let mut stats = stats.write();
                            stats.in_flight = stats.in_flight.saturating_sub(1);
                            stats.published += 1;
                        }
                        debug!(
                            source = ?message.source,
                            attempts = message.attempts + 1,
                            queued_ms = message.enqueued_at.elapsed().as_millis() as u64,
                            "Published message"
                        );
                        break;
                    }
                    Err(e) => {
                        message.attempts += 1;
                        stats.write().retries += 1;
                        let delay = config.retry_delay(message.attempts);
                        warn!(
                            error = %e,
                            attempts = message.attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Publish failed, retrying"
                        );

                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = shutdown.notified() => {}
                        }

                        if !*running.read() {
                            queue.lock().push_front(message);
                            let mut stats = stats.write();
                            stats.in_flight = stats.in_flight.saturating_sub(1);
                            debug!("Publisher stopped during retry, message requeued");
                            return;
                        }
                    }
                }
            }
        }

        debug!("Publisher worker stopped");
    }
}
