use std::sync::Arc;
use std::time::Instant;

use crate::domain::event::{EventId, EventSummary};
use crate::domain::user::UserDirectory;
use crate::metrics::Metrics;
use crate::store::RegistrationStore;
use crate::utils::{retry_on_transient, RetryConfig};

use super::errors::RegistrationError;
use super::ledger::RegistrationLedger;
use super::value_objects::*;

// ============================================================================
// Registration Engine
// ============================================================================
//
// Orchestrates: Event lock → confirmed count → capacity gate → user
// resolution → ledger write, all inside one store transaction.
//
// The transaction's first statement takes the event's exclusion lock, so the
// capacity check and the ledger write are indivisible with respect to every
// other register/cancel on the same event. Different events never contend.
// Transient store conflicts restart the whole unit, bounded by RetryConfig.
//
// ============================================================================

pub struct RegistrationEngine {
    store: Arc<dyn RegistrationStore>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl RegistrationEngine {
    pub fn new(store: Arc<dyn RegistrationStore>, metrics: Arc<Metrics>, retry: RetryConfig) -> Self {
        Self {
            store,
            retry,
            metrics,
        }
    }

    /// Register the identity in `request` for `event_id`.
    ///
    /// Creates a confirmed row, or reactivates a cancelled one, provided the
    /// event still has a free seat when checked under the event lock.
    pub async fn register(
        &self,
        event_id: EventId,
        request: RegisterRequest,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let started = Instant::now();

        let result = match request.validate() {
            Ok(registrant) => self.register_with_retry(event_id, &registrant).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(o) if o.reactivated => "reactivated",
            Ok(_) => "confirmed",
            Err(e) => e.kind(),
        };
        self.metrics
            .record_registration(outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(o) => tracing::info!(
                event_id,
                registration_id = o.registration.id,
                user_id = o.user.id,
                reactivated = o.reactivated,
                "Registration confirmed"
            ),
            Err(RegistrationError::Store(e)) => {
                tracing::error!(event_id, error = %e, "Registration failed")
            }
            Err(e) if e.is_not_found() => tracing::warn!(event_id, error = %e, "Registration for unknown event"),
            Err(e) => tracing::info!(event_id, outcome, error = %e, "Registration rejected"),
        }

        result
    }

    async fn register_with_retry(
        &self,
        event_id: EventId,
        registrant: &Registrant,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let metrics = &self.metrics;

        retry_on_transient(self.retry.clone(), move |attempt| {
            if attempt > 1 {
                metrics.record_retry_attempt("register");
            }
            self.try_register(event_id, registrant)
        })
        .await
        .into_result()
    }

    async fn try_register(
        &self,
        event_id: EventId,
        registrant: &Registrant,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let mut tx = self.store.begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(RegistrationError::EventNotFound(event_id))?;

        let confirmed_count = tx.confirmed_count(event_id).await?;
        if confirmed_count >= event.capacity {
            return Err(RegistrationError::CapacityExceeded {
                event_id,
                capacity: event.capacity,
            });
        }

        // Same connection as the event lock; see UserDirectory.
        let user = UserDirectory::new(&mut tx)
            .resolve_or_create(&registrant.email, &registrant.name, registrant.phone.as_deref())
            .await?;

        let (registration, reactivated) = {
            let mut ledger = RegistrationLedger::new(&mut tx);

            match ledger.get(user.id, event_id).await? {
                None => (ledger.create_confirmed(user.id, event_id).await?, false),
                Some(existing) => match existing.status.register() {
                    Some(status) => {
                        ledger.set_status(existing.id, status).await?;
                        (Registration { status, ..existing }, true)
                    }
                    None => {
                        return Err(RegistrationError::AlreadyRegistered {
                            event_id,
                            registration_id: existing.id,
                        })
                    }
                },
            }
        };

        tx.commit().await?;

        Ok(RegistrationOutcome {
            user,
            event: EventSummary::new(event, confirmed_count),
            registration,
            reactivated,
        })
    }

    /// Cancel a registration. Cancelling an already-cancelled row is a no-op.
    pub async fn cancel(
        &self,
        registration_id: RegistrationId,
    ) -> Result<CancelOutcome, RegistrationError> {
        let metrics = &self.metrics;

        let result = retry_on_transient(self.retry.clone(), move |attempt| {
            if attempt > 1 {
                metrics.record_retry_attempt("cancel");
            }
            self.try_cancel(registration_id)
        })
        .await
        .into_result();

        let outcome = match &result {
            Ok(CancelOutcome::Cancelled) => "cancelled",
            Ok(CancelOutcome::AlreadyCancelled) => "noop",
            Err(e) => e.kind(),
        };
        self.metrics.record_cancellation(outcome);

        tracing::info!(registration_id, outcome, "Cancellation processed");
        result
    }

    async fn try_cancel(
        &self,
        registration_id: RegistrationId,
    ) -> Result<CancelOutcome, RegistrationError> {
        let mut tx = self.store.begin().await?;

        let current = tx
            .find_registration_by_id(registration_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(registration_id))?;

        // Same exclusion region as register for this event.
        tx.lock_event(current.event_id).await?;

        let outcome = {
            let mut ledger = RegistrationLedger::new(&mut tx);
            let registration = ledger
                .get_by_id(registration_id)
                .await?
                .ok_or(RegistrationError::RegistrationNotFound(registration_id))?;

            match registration.status.cancel() {
                Some(status) => {
                    ledger.set_status(registration_id, status).await?;
                    CancelOutcome::Cancelled
                }
                None => CancelOutcome::AlreadyCancelled,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn registration_details(
        &self,
        registration_id: RegistrationId,
    ) -> Result<RegistrationDetails, RegistrationError> {
        self.store
            .registration_details(registration_id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(registration_id))
    }

    /// Registrations for the user owning `email`, newest first
    pub async fn user_registrations(
        &self,
        email: &str,
    ) -> Result<Vec<RegistrationDetails>, RegistrationError> {
        Ok(self.store.registrations_for_email(email).await?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
