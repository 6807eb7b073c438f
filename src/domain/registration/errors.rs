use crate::domain::event::EventId;
use crate::store::StoreError;
use crate::utils::IsTransient;

use super::value_objects::RegistrationId;

// ============================================================================
// Registration Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    #[error("{0}")]
    Validation(String),

    #[error("Event {event_id} is full (capacity {capacity})")]
    CapacityExceeded { event_id: EventId, capacity: i64 },

    #[error("Already registered for event {event_id} (registration {registration_id})")]
    AlreadyRegistered {
        event_id: EventId,
        registration_id: RegistrationId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistrationError::EventNotFound(_) | RegistrationError::RegistrationNotFound(_)
        )
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::EventNotFound(_) | RegistrationError::RegistrationNotFound(_) => {
                "not_found"
            }
            RegistrationError::Validation(_) => "validation",
            RegistrationError::CapacityExceeded { .. } => "capacity_exceeded",
            RegistrationError::AlreadyRegistered { .. } => "already_registered",
            RegistrationError::Store(_) => "store_error",
        }
    }
}

/// Only store conflicts are worth another attempt; everything else is a
/// request-level fact.
impl IsTransient for RegistrationError {
    fn is_transient(&self) -> bool {
        matches!(self, RegistrationError::Store(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_conflicts_are_transient() {
        assert!(RegistrationError::Store(StoreError::Conflict("40001".to_string())).is_transient());
        assert!(!RegistrationError::Store(StoreError::Corrupt("bad".to_string())).is_transient());
        assert!(!RegistrationError::CapacityExceeded { event_id: 1, capacity: 1 }.is_transient());
        assert!(!RegistrationError::EventNotFound(1).is_transient());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(RegistrationError::RegistrationNotFound(9).kind(), "not_found");
        assert_eq!(
            RegistrationError::AlreadyRegistered { event_id: 1, registration_id: 2 }.kind(),
            "already_registered"
        );
    }
}
