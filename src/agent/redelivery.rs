//! Redelivery accounting.
//!
//! Counts how often each delivery has been declined so a message that can
//! never be resolved is eventually acknowledged and dropped instead of
//! cycling forever.

use crate::transport::EnvelopeId;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug)]
pub struct RedeliveryTracker {
    /// `None` keeps redelivering forever
    max_redeliveries: Option<u32>,
    declines: Mutex<HashMap<EnvelopeId, u32>>,
}

/// Decision for a delivery the loop wants to decline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryDecision {
    Redeliver { attempts: u32 },
    GiveUp { attempts: u32 },
}

impl RedeliveryTracker {
    pub fn new(max_redeliveries: Option<u32>) -> Self {
        Self {
            max_redeliveries,
            declines: Mutex::new(HashMap::new()),
        }
    }

    /// Record a decline and decide whether the delivery gets another chance
    pub fn record_decline(&self, id: &EnvelopeId) -> RedeliveryDecision {
        let mut declines = self.declines.lock();
        let attempts = {
            let count = declines.entry(id.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        match self.max_redeliveries {
            Some(max) if attempts > max => {
                declines.remove(id);
                RedeliveryDecision::GiveUp { attempts }
            }
            _ => RedeliveryDecision::Redeliver { attempts },
        }
    }

    /// Forget a delivery once it has been acknowledged
    pub fn clear(&self, id: &EnvelopeId) {
        self.declines.lock().remove(id);
    }

    pub fn attempts(&self, id: &EnvelopeId) -> u32 {
        self.declines.lock().get(id).copied().unwrap_or(0)
    }

    /// Deliveries currently awaiting redelivery
    pub fn tracked(&self) -> usize {
        self.declines.lock().len()
    }
}
