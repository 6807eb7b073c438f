// ============================================================================
// Store - Persistence abstraction for the registration engine
// ============================================================================
//
// Two seams:
// - RegistrationStore: pool-level reads/writes that need no exclusion
//   (event catalog, read models, health)
// - StoreTransaction: one atomic unit on a single connection. `lock_event`
//   takes the per-event exclusion lock that serializes register/cancel for
//   that event until the transaction commits or is dropped (dropping rolls
//   back). User resolution runs on the same connection, so a register never
//   needs a second pooled connection while it holds an event lock.
//
// Implementations:
// - PgStore: PostgreSQL via sqlx, `SELECT ... FOR UPDATE` on the event row
// - MemoryStore: in-process tables with one async mutex per event
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::domain::event::{Event, EventId, EventSummary, NewEvent};
use crate::domain::registration::{
    Registration, RegistrationDetails, RegistrationId, RegistrationStatus,
};
use crate::domain::user::{NewUser, User, UserId};
use crate::utils::IsTransient;

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Serialization failure or deadlock; the whole unit may be retried
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => return StoreError::UniqueViolation(message),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(message)
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

// ============================================================================
// Store Traits
// ============================================================================

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError>;

    async fn event_summary(&self, event_id: EventId) -> Result<Option<EventSummary>, StoreError>;

    async fn list_event_summaries(&self) -> Result<Vec<EventSummary>, StoreError>;

    async fn registration_details(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Option<RegistrationDetails>, StoreError>;

    async fn registrations_for_email(
        &self,
        email: &str,
    ) -> Result<Vec<RegistrationDetails>, StoreError>;

    /// Cheap round trip used by the health endpoint
    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Load the event and hold its exclusion lock for the rest of the
    /// transaction. Returns `None` when the event does not exist.
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError>;

    async fn confirmed_count(&mut self, event_id: EventId) -> Result<i64, StoreError>;

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with `UniqueViolation` when the email already exists. The
    /// transaction stays usable after that failure so the caller can re-read.
    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError>;

    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError>;

    async fn find_registration_by_id(
        &mut self,
        registration_id: RegistrationId,
    ) -> Result<Option<Registration>, StoreError>;

    async fn insert_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> Result<Registration, StoreError>;

    /// Returns false when no row has this id
    async fn update_registration_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_stay_generic() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_conflict_is_transient() {
        assert!(StoreError::Conflict("deadlock detected".to_string()).is_transient());
        assert!(!StoreError::UniqueViolation("users_email_key".to_string()).is_transient());
    }
}
