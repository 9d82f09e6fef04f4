//! In-memory broadcast bus used for tests, demos and loopback agents.
//!
//! The bus is a single append-only topic log. Every connected transport is an
//! independent consumer with its own read position and committed offset, so
//! all agents observe every publish, their own included.

use super::{Envelope, EnvelopeId, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Shared topic log.
pub struct InMemoryBus {
    topic: String,
    log: RwLock<Vec<Vec<u8>>>,
    appended: Notify,
    closed: AtomicBool,
    failing_publishes: AtomicUsize,
}

impl InMemoryBus {
    pub fn new(topic: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.into(),
            log: RwLock::new(Vec::new()),
            appended: Notify::new(),
            closed: AtomicBool::new(false),
            failing_publishes: AtomicUsize::new(0),
        })
    }

    /// Connect a new consumer starting at the beginning of the log
    pub fn connect(self: &Arc<Self>, poll_timeout: Duration) -> InMemoryTransport {
        InMemoryTransport {
            bus: Arc::clone(self),
            poll_timeout,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append a message as an external producer would
    pub fn inject(&self, payload: impl Into<Vec<u8>>) -> u64 {
        let offset = {
            let mut log = self.log.write();
            log.push(payload.into());
            (log.len() - 1) as u64
        };
        self.appended.notify_waiters();
        offset
    }

    /// Snapshot of every message on the topic
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.log.read().clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    /// Make the next `count` publishes fail
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Close the bus; consumers report `Closed` once they have read everything
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.appended.notify_waiters();
    }

    fn take_publish_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct Cursor {
    position: u64,
    committed: u64,
}

/// One consumer's connection to an [`InMemoryBus`].
pub struct InMemoryTransport {
    bus: Arc<InMemoryBus>,
    poll_timeout: Duration,
    cursor: Mutex<Cursor>,
}

impl InMemoryTransport {
    /// Offset of the next message this consumer will commit past
    pub fn committed_offset(&self) -> u64 {
        self.cursor.lock().committed
    }

    /// Offset of the next message this consumer will read
    pub fn position(&self) -> u64 {
        self.cursor.lock().position
    }

    pub fn bus(&self) -> &Arc<InMemoryBus> {
        &self.bus
    }

    fn next_envelope(&self) -> Option<Envelope> {
        let log = self.bus.log.read();
        let mut cursor = self.cursor.lock();
        let payload = log.get(cursor.position as usize)?.clone();
        let id = EnvelopeId {
            topic: self.bus.topic.clone(),
            partition: 0,
            offset: cursor.position,
        };
        cursor.position += 1;
        Some(Envelope::new(id, payload))
    }

    fn drained(&self) -> bool {
        let position = self.cursor.lock().position;
        position as usize >= self.bus.len()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn consume(&self) -> Result<Option<Envelope>, TransportError> {
        let notified = self.bus.appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(envelope) = self.next_envelope() {
            return Ok(Some(envelope));
        }
        if self.bus.closed.load(Ordering::SeqCst) && self.drained() {
            return Err(TransportError::Closed);
        }
        if tokio::time::timeout(self.poll_timeout, notified).await.is_err() {
            return Ok(None);
        }
        Ok(self.next_envelope())
    }

    async fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if envelope.id.topic != self.bus.topic || envelope.id.offset as usize >= self.bus.len() {
            return Err(TransportError::AckFailed(format!(
                "envelope {} is not on topic '{}'",
                envelope.id, self.bus.topic
            )));
        }
        let mut cursor = self.cursor.lock();
        cursor.committed = cursor.committed.max(envelope.id.offset + 1);
        debug!(envelope = %envelope.id, "Committed offset");
        Ok(())
    }

    async fn decline(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut cursor = self.cursor.lock();
        cursor.position = cursor.position.min(envelope.id.offset);
        debug!(envelope = %envelope.id, "Rewound for redelivery");
        Ok(())
    }

    async fn publish(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.bus.take_publish_failure() {
            return Err(TransportError::PublishFailed(format!(
                "simulated publish failure on topic '{}'",
                self.bus.topic
            )));
        }
        self.bus.inject(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_consume_in_order() {
        let bus = InMemoryBus::new("intents");
        bus.inject(b"one".to_vec());
        bus.inject(b"two".to_vec());
        let transport = bus.connect(POLL);

        let first = transport.consume().await.unwrap().unwrap();
        let second = transport.consume().await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        assert_eq!(first.id.offset, 0);
        assert_eq!(second.payload, b"two");
        assert!(transport.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decline_redelivers() {
        let bus = InMemoryBus::new("intents");
        bus.inject(b"one".to_vec());
        let transport = bus.connect(POLL);

        let envelope = transport.consume().await.unwrap().unwrap();
        transport.decline(&envelope).await.unwrap();
        let again = transport.consume().await.unwrap().unwrap();
        assert_eq!(again.id, envelope.id);
        assert_eq!(transport.committed_offset(), 0);
    }

    #[tokio::test]
    async fn test_ack_commits() {
        let bus = InMemoryBus::new("intents");
        bus.inject(b"one".to_vec());
        let transport = bus.connect(POLL);

        let envelope = transport.consume().await.unwrap().unwrap();
        transport.ack(&envelope).await.unwrap();
        assert_eq!(transport.committed_offset(), 1);
        assert!(transport.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fan_out_to_every_consumer() {
        let bus = InMemoryBus::new("intents");
        let a = bus.connect(POLL);
        let b = bus.connect(POLL);
        a.publish(b"hello").await.unwrap();

        assert_eq!(a.consume().await.unwrap().unwrap().payload, b"hello");
        assert_eq!(b.consume().await.unwrap().unwrap().payload, b"hello");
    }

    #[tokio::test]
    async fn test_consume_wakes_on_publish() {
        let bus = InMemoryBus::new("intents");
        let consumer = bus.connect(Duration::from_secs(5));
        let producer = bus.connect(POLL);

        let handle = tokio::spawn(async move { consumer.consume().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.publish(b"late").await.unwrap();

        let envelope = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(envelope.payload, b"late");
    }

    #[tokio::test]
    async fn test_injected_publish_failures() {
        let bus = InMemoryBus::new("intents");
        let transport = bus.connect(POLL);
        bus.fail_next_publishes(2);

        assert!(transport.publish(b"x").await.is_err());
        assert!(transport.publish(b"x").await.is_err());
        transport.publish(b"x").await.unwrap();
        assert_eq!(bus.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_after_drain() {
        let bus = InMemoryBus::new("intents");
        bus.inject(b"last".to_vec());
        bus.close();
        let transport = bus.connect(POLL);

        assert!(transport.consume().await.unwrap().is_some());
        assert!(matches!(
            transport.consume().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_ack_rejects_foreign_envelope() {
        let bus = InMemoryBus::new("intents");
        bus.inject(b"one".to_vec());
        let transport = bus.connect(POLL);

        let foreign = Envelope::new(
            EnvelopeId {
                topic: "other".to_string(),
                partition: 0,
                offset: 0,
            },
            b"one".to_vec(),
        );
        assert!(matches!(
            transport.ack(&foreign).await,
            Err(TransportError::AckFailed(_))
        ));

        let unseen = Envelope::new(
            EnvelopeId {
                topic: "intents".to_string(),
                partition: 0,
                offset: 5,
            },
            Vec::new(),
        );
        assert!(transport.ack(&unseen).await.is_err());
        assert_eq!(transport.committed_offset(), 0);
    }
}
