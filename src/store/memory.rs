use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::event::{Event, EventId, EventSummary, NewEvent};
use crate::domain::registration::{
    Registration, RegistrationDetails, RegistrationId, RegistrationStatus,
};
use crate::domain::user::{NewUser, User, UserId};

use super::{RegistrationStore, StoreError, StoreTransaction};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Used when no DATABASE_URL is configured, and by the test suite.
//
// Transactions buffer their writes and apply them on commit; reads see the
// committed tables overlaid with the transaction's own pending writes.
// `lock_event` acquires an owned guard on the event's mutex, released when
// the transaction is committed or dropped. Lock entries exist only for
// events that exist. User inserts are applied immediately, not buffered.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    users: BTreeMap<UserId, User>,
    registrations: BTreeMap<RegistrationId, Registration>,
    last_event_id: i64,
    last_user_id: i64,
    last_registration_id: i64,
}

impl Tables {
    fn confirmed_count(registrations: &BTreeMap<RegistrationId, Registration>, event_id: EventId) -> i64 {
        registrations
            .values()
            .filter(|r| r.event_id == event_id && r.status == RegistrationStatus::Confirmed)
            .count() as i64
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation(format!(
                "users.email '{}' already exists",
                user.email
            )));
        }

        self.last_user_id += 1;
        let created = User {
            id: self.last_user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            created_at: Utc::now(),
        };
        self.users.insert(created.id, created.clone());
        Ok(created)
    }

    fn summary(&self, event: &Event) -> EventSummary {
        EventSummary::new(event.clone(), Self::confirmed_count(&self.registrations, event.id))
    }

    fn details(&self, registration: &Registration) -> Result<RegistrationDetails, StoreError> {
        let event = self.events.get(&registration.event_id).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "registration {} references missing event {}",
                registration.id, registration.event_id
            ))
        })?;
        let user = self.users.get(&registration.user_id).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "registration {} references missing user {}",
                registration.id, registration.user_id
            ))
        })?;

        Ok(RegistrationDetails {
            registration: registration.clone(),
            event_title: event.title.clone(),
            event_description: event.description.clone(),
            event_date: event.event_date,
            location: event.location.clone(),
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            user_phone: user.phone.clone(),
        })
    }
}

type EventLocks = Arc<Mutex<HashMap<EventId, Arc<Mutex<()>>>>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    event_locks: EventLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            event_locks: self.event_locks.clone(),
            held: HashMap::new(),
            pending: Vec::new(),
        }))
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        let mut tables = self.tables.lock().await;

        tables.last_event_id += 1;
        let created = Event {
            id: tables.last_event_id,
            title: event.title.clone(),
            description: event.description.clone(),
            event_date: event.event_date,
            location: event.location.clone(),
            capacity: event.capacity,
            created_at: Utc::now(),
        };
        tables.events.insert(created.id, created.clone());
        Ok(created)
    }

    async fn event_summary(&self, event_id: EventId) -> Result<Option<EventSummary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(&event_id).map(|e| tables.summary(e)))
    }

    async fn list_event_summaries(&self) -> Result<Vec<EventSummary>, StoreError> {
        let tables = self.tables.lock().await;

        let mut summaries: Vec<_> = tables.events.values().map(|e| tables.summary(e)).collect();
        summaries.sort_by_key(|s| s.event.event_date);
        Ok(summaries)
    }

    async fn registration_details(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Option<RegistrationDetails>, StoreError> {
        let tables = self.tables.lock().await;

        tables
            .registrations
            .get(&registration_id)
            .map(|r| tables.details(r))
            .transpose()
    }

    async fn registrations_for_email(
        &self,
        email: &str,
    ) -> Result<Vec<RegistrationDetails>, StoreError> {
        let tables = self.tables.lock().await;

        let Some(user) = tables.users.values().find(|u| u.email == email) else {
            return Ok(Vec::new());
        };

        let mut details = tables
            .registrations
            .values()
            .filter(|r| r.user_id == user.id)
            .map(|r| tables.details(r))
            .collect::<Result<Vec<_>, _>>()?;
        details.sort_by(|a, b| {
            b.registration
                .registration_date
                .cmp(&a.registration.registration_date)
        });
        Ok(details)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {
        tracing::debug!("In-memory store closed");
    }
}

// ============================================================================
// Transaction
// ============================================================================

enum PendingWrite {
    Insert(Registration),
    SetStatus {
        id: RegistrationId,
        status: RegistrationStatus,
    },
}

struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    event_locks: EventLocks,
    held: HashMap<EventId, OwnedMutexGuard<()>>,
    pending: Vec<PendingWrite>,
}

impl MemoryTransaction {
    /// Committed registrations matching `keep`, with this transaction's
    /// writes applied. `keep` must only look at fields that never change.
    fn visible<P>(&self, tables: &Tables, keep: P) -> Vec<Registration>
    where
        P: Fn(&Registration) -> bool,
    {
        let mut visible: BTreeMap<RegistrationId, Registration> = tables
            .registrations
            .values()
            .filter(|r| keep(r))
            .map(|r| (r.id, r.clone()))
            .collect();

        for write in &self.pending {
            match write {
                PendingWrite::Insert(r) if keep(r) => {
                    visible.insert(r.id, r.clone());
                }
                PendingWrite::Insert(_) => {}
                PendingWrite::SetStatus { id, status } => {
                    if let Some(r) = visible.get_mut(id) {
                        r.status = *status;
                    }
                }
            }
        }

        visible.into_values().collect()
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        // Events are never deleted, so an id missing now stays missing.
        if !self.tables.lock().await.events.contains_key(&event_id) {
            return Ok(None);
        }

        if !self.held.contains_key(&event_id) {
            let lock = {
                let mut locks = self.event_locks.lock().await;
                locks.entry(event_id).or_default().clone()
            };
            let guard = lock.lock_owned().await;
            self.held.insert(event_id, guard);
        }

        let tables = self.tables.lock().await;
        Ok(tables.events.get(&event_id).cloned())
    }

    async fn confirmed_count(&mut self, event_id: EventId) -> Result<i64, StoreError> {
        let tables = self.tables.lock().await;
        let confirmed = self
            .visible(&tables, |r| r.event_id == event_id)
            .iter()
            .filter(|r| r.status == RegistrationStatus::Confirmed)
            .count();
        Ok(confirmed as i64)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        self.tables.lock().await.insert_user(user)
    }

    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(self
            .visible(&tables, |r| r.user_id == user_id && r.event_id == event_id)
            .pop())
    }

    async fn find_registration_by_id(
        &mut self,
        registration_id: RegistrationId,
    ) -> Result<Option<Registration>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(self.visible(&tables, |r| r.id == registration_id).pop())
    }

    async fn insert_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> Result<Registration, StoreError> {
        let mut tables = self.tables.lock().await;

        if !self
            .visible(&tables, |r| r.user_id == user_id && r.event_id == event_id)
            .is_empty()
        {
            return Err(StoreError::UniqueViolation(format!(
                "registrations (user_id, event_id) = ({user_id}, {event_id}) already exists"
            )));
        }

        // Ids are allocated eagerly, like a database sequence.
        tables.last_registration_id += 1;
        let registration = Registration {
            id: tables.last_registration_id,
            user_id,
            event_id,
            registration_date: Utc::now(),
            status,
        };
        self.pending.push(PendingWrite::Insert(registration.clone()));
        Ok(registration)
    }

    async fn update_registration_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;

        if self.visible(&tables, |r| r.id == registration_id).is_empty() {
            return Ok(false);
        }
        drop(tables);

        self.pending.push(PendingWrite::SetStatus {
            id: registration_id,
            status,
        });
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // Event guards stay alive until the writes are applied.
        let MemoryTransaction {
            tables, pending, held: _held, ..
        } = *self;
        let mut tables = tables.lock().await;

        for write in &pending {
            if let PendingWrite::Insert(new) = write {
                let duplicate = tables
                    .registrations
                    .values()
                    .any(|r| r.user_id == new.user_id && r.event_id == new.event_id);
                if duplicate {
                    return Err(StoreError::UniqueViolation(format!(
                        "registrations (user_id, event_id) = ({}, {}) already exists",
                        new.user_id, new.event_id
                    )));
                }
            }
        }

        for write in pending {
            match write {
                PendingWrite::Insert(r) => {
                    tables.registrations.insert(r.id, r);
                }
                PendingWrite::SetStatus { id, status } => {
                    if let Some(r) = tables.registrations.get_mut(&id) {
                        r.status = status;
                    }
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

#[cfg(test)]
impl MemoryStore {
    pub async fn seed_event(&self, capacity: i64) -> Event {
        self.insert_event(&NewEvent {
            title: format!("Event for {capacity}"),
            description: None,
            event_date: Utc::now(),
            location: "Main hall".to_string(),
            capacity,
        })
        .await
        .unwrap()
    }

    pub async fn seed_user(&self, email: &str) -> User {
        self.tables
            .lock()
            .await
            .insert_user(&NewUser {
                name: "Seeded".to_string(),
                email: email.to_string(),
                phone: None,
            })
            .unwrap()
    }

    pub async fn seed_registration(&self, user_id: UserId, event_id: EventId) -> Registration {
        let mut tx = self.begin().await.unwrap();
        let registration = tx
            .insert_registration(user_id, event_id, RegistrationStatus::Confirmed)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        registration
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn registration_count(&self) -> usize {
        self.tables.lock().await.registrations.len()
    }

    pub async fn lock_entries(&self) -> usize {
        self.event_locks.lock().await.len()
    }

    pub async fn confirmed_for(&self, event_id: EventId) -> i64 {
        Tables::confirmed_count(&self.tables.lock().await.registrations, event_id)
    }
}
