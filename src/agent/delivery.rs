//! Per-delivery outcomes and counters for the delivery loop.

use crate::error::ResolveError;
use serde::Serialize;
use std::fmt;

/// Why a delivery was left uncommitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    NotAnIntent,
    NoResolver,
    ErrorMessage,
    Undecodable,
    /// The resolved message could not be queued for publishing
    QueueFull,
}

impl From<&ResolveError> for DeclineReason {
    fn from(error: &ResolveError) -> Self {
        match error {
            ResolveError::NotAnIntent => DeclineReason::NotAnIntent,
            ResolveError::NoResolver(_) => DeclineReason::NoResolver,
            ResolveError::ErrorMessage(_) => DeclineReason::ErrorMessage,
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeclineReason::NotAnIntent => "not_an_intent",
            DeclineReason::NoResolver => "no_resolver",
            DeclineReason::ErrorMessage => "error_message",
            DeclineReason::Undecodable => "undecodable",
            DeclineReason::QueueFull => "queue_full",
        };
        f.write_str(text)
    }
}

/// Final state of one inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Intent resolved; acknowledged and queued for publishing
    Resolved { intent: String },
    /// Resolver reported a domain error; acknowledged and published with the error embedded
    DomainError { intent: String, message: String },
    /// Left uncommitted for redelivery
    Declined(DeclineReason),
    /// Redelivery budget exhausted; acknowledged without publishing
    Discarded { reason: DeclineReason, attempts: u32 },
}

impl DeliveryOutcome {
    /// Whether the delivery's position was committed
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, DeliveryOutcome::Declined(_))
    }

    /// Whether a message was queued for publishing
    pub fn is_published(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Resolved { .. } | DeliveryOutcome::DomainError { .. }
        )
    }
}

/// Delivery loop counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub received: usize,
    pub resolved: usize,
    pub domain_errors: usize,
    pub declined: usize,
    pub discarded: usize,
}

impl DeliveryStats {
    pub(crate) fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Resolved { .. } => self.resolved += 1,
            DeliveryOutcome::DomainError { .. } => self.domain_errors += 1,
            DeliveryOutcome::Declined(_) => self.declined += 1,
            DeliveryOutcome::Discarded { .. } => self.discarded += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgement_by_outcome() {
        let resolved = DeliveryOutcome::Resolved {
            intent: "a".to_string(),
        };
        let declined = DeliveryOutcome::Declined(DeclineReason::NoResolver);
        let discarded = DeliveryOutcome::Discarded {
            reason: DeclineReason::NoResolver,
            attempts: 3,
        };
        assert!(resolved.is_acknowledged() && resolved.is_published());
        assert!(!declined.is_acknowledged() && !declined.is_published());
        assert!(discarded.is_acknowledged() && !discarded.is_published());
    }

    #[test]
    fn test_reason_from_resolve_error() {
        assert_eq!(
            DeclineReason::from(&ResolveError::NoResolver("x".to_string())),
            DeclineReason::NoResolver
        );
        assert_eq!(
            DeclineReason::from(&ResolveError::ErrorMessage("boom".to_string())).to_string(),
            "error_message"
        );
    }

    #[test]
    fn test_stats_record() {
        let mut stats = DeliveryStats::default();
        stats.record(&DeliveryOutcome::Declined(DeclineReason::Undecodable));
        stats.record(&DeliveryOutcome::DomainError {
            intent: "a".to_string(),
            message: "nope".to_string(),
        });
        assert_eq!(stats.declined, 1);
        assert_eq!(stats.domain_errors, 1);
        assert_eq!(stats.resolved, 0);
    }
}
