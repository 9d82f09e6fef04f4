//! Bus transport boundary.
//!
//! Transports own delivery mechanics only: polling, position commits and
//! raw publishes. The delivery loop decides when to acknowledge and when to
//! let a message be redelivered.

pub mod line;
pub mod memory;

pub use line::LineTransport;
pub use memory::{InMemoryBus, InMemoryTransport};

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Position of one delivery on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvelopeId {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// One inbound delivery.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(id: EnvelopeId, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Trait for bus transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Poll for the next delivery.
    ///
    /// `Ok(None)` means the poll window elapsed without a message.
    async fn consume(&self) -> Result<Option<Envelope>, TransportError>;

    /// Commit the envelope's position so it is never redelivered
    async fn ack(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Leave the envelope uncommitted so it is delivered again
    async fn decline(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Publish raw bytes to the shared topic
    async fn publish(&self, payload: &[u8]) -> Result<(), TransportError>;
}
