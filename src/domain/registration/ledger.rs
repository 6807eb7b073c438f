use crate::domain::event::EventId;
use crate::domain::user::UserId;
use crate::store::StoreTransaction;

use super::errors::RegistrationError;
use super::value_objects::{Registration, RegistrationId, RegistrationStatus};

// ============================================================================
// Registration Ledger
// ============================================================================
//
// Records per-(user, event) status inside the caller's transaction. It knows
// nothing about capacity: that decision needs the event's confirmed count
// read under the same lock, which is the engine's job.
//
// ============================================================================

pub struct RegistrationLedger<'tx> {
    tx: &'tx mut Box<dyn StoreTransaction>,
}

impl<'tx> RegistrationLedger<'tx> {
    pub fn new(tx: &'tx mut Box<dyn StoreTransaction>) -> Self {
        Self { tx }
    }

    pub async fn get(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Registration>, RegistrationError> {
        Ok(self.tx.find_registration(user_id, event_id).await?)
    }

    pub async fn get_by_id(
        &mut self,
        registration_id: RegistrationId,
    ) -> Result<Option<Registration>, RegistrationError> {
        Ok(self.tx.find_registration_by_id(registration_id).await?)
    }

    pub async fn create_confirmed(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Registration, RegistrationError> {
        let registration = self
            .tx
            .insert_registration(user_id, event_id, RegistrationStatus::Confirmed)
            .await?;

        tracing::debug!(
            registration_id = registration.id,
            user_id,
            event_id,
            "Ledger row created"
        );

        Ok(registration)
    }

    pub async fn set_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> Result<(), RegistrationError> {
        if !self
            .tx
            .update_registration_status(registration_id, status)
            .await?
        {
            return Err(RegistrationError::RegistrationNotFound(registration_id));
        }

        tracing::debug!(registration_id, status = %status, "Ledger status updated");
        Ok(())
    }
}
