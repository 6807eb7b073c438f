use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::config::DatabaseConfig;
use crate::domain::event::{Event, EventId, EventSummary, NewEvent};
use crate::domain::registration::{
    Registration, RegistrationDetails, RegistrationId, RegistrationStatus,
};
use crate::domain::user::{NewUser, User, UserId};

use super::{RegistrationStore, StoreError, StoreTransaction};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Per-event serialization comes from `SELECT ... FOR UPDATE` on the events
// row: every register/cancel transaction for an event locks that row first,
// so concurrent units for the same event queue behind each other while other
// events proceed. Each transaction uses exactly one pooled connection, user
// resolution included. Dropping a sqlx Transaction without commit rolls it
// back.
//
// ============================================================================

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS events (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        event_date TIMESTAMPTZ NOT NULL,
        location TEXT NOT NULL,
        capacity BIGINT NOT NULL CHECK (capacity > 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS registrations (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        event_id BIGINT NOT NULL REFERENCES events(id),
        registration_date TIMESTAMPTZ NOT NULL DEFAULT now(),
        status TEXT NOT NULL DEFAULT 'confirmed' CHECK (status IN ('confirmed', 'cancelled')),
        UNIQUE (user_id, event_id)
    )",
];

const EVENT_COLUMNS: &str = "id, title, description, event_date, location, capacity, created_at";
const USER_COLUMNS: &str = "id, name, email, phone, created_at";
const REGISTRATION_COLUMNS: &str = "id, user_id, event_id, registration_date, status";

const SUMMARY_SELECT: &str = "SELECT e.id, e.title, e.description, e.event_date, e.location,
        e.capacity, e.created_at, COUNT(r.id) AS registered_count
     FROM events e
     LEFT JOIN registrations r ON e.id = r.event_id AND r.status = 'confirmed'";

const DETAILS_SELECT: &str = "SELECT r.id, r.user_id, r.event_id, r.registration_date, r.status,
        e.title AS event_title, e.description AS event_description, e.event_date, e.location,
        u.name AS user_name, u.email AS user_email, u.phone AS user_phone
     FROM registrations r
     JOIN events e ON r.event_id = e.id
     JOIN users u ON r.user_id = u.id";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Schema ready");
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO events (title, description, event_date, location, capacity)
             VALUES ($1, $2, $3, $4, $5) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(&event.location)
        .bind(event.capacity)
        .fetch_one(&self.pool)
        .await?;

        event_from_row(&row)
    }

    async fn event_summary(&self, event_id: EventId) -> Result<Option<EventSummary>, StoreError> {
        let row = sqlx::query(&format!("{SUMMARY_SELECT} WHERE e.id = $1 GROUP BY e.id"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn list_event_summaries(&self) -> Result<Vec<EventSummary>, StoreError> {
        let rows = sqlx::query(&format!("{SUMMARY_SELECT} GROUP BY e.id ORDER BY e.event_date ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn registration_details(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Option<RegistrationDetails>, StoreError> {
        let row = sqlx::query(&format!("{DETAILS_SELECT} WHERE r.id = $1"))
            .bind(registration_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(details_from_row).transpose()
    }

    async fn registrations_for_email(
        &self,
        email: &str,
    ) -> Result<Vec<RegistrationDetails>, StoreError> {
        let rows = sqlx::query(&format!(
            "{DETAILS_SELECT} WHERE u.email = $1 ORDER BY r.registration_date DESC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(details_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connection closed");
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn confirmed_count(&mut self, event_id: EventId) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = 'confirmed'",
        )
        .bind(event_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        // A failed statement aborts the whole transaction unless it is
        // contained in a savepoint.
        sqlx::query("SAVEPOINT insert_user").execute(&mut *self.tx).await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO users (name, email, phone) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .fetch_one(&mut *self.tx)
        .await;

        match inserted {
            Ok(row) => {
                sqlx::query("RELEASE SAVEPOINT insert_user")
                    .execute(&mut *self.tx)
                    .await?;
                user_from_row(&row)
            }
            Err(err) => {
                sqlx::query("ROLLBACK TO SAVEPOINT insert_user")
                    .execute(&mut *self.tx)
                    .await?;
                Err(err.into())
            }
        }
    }

    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = $1 AND event_id = $2"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(registration_from_row).transpose()
    }

    async fn find_registration_by_id(
        &mut self,
        registration_id: RegistrationId,
    ) -> Result<Option<Registration>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(registration_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(registration_from_row).transpose()
    }

    async fn insert_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> Result<Registration, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO registrations (user_id, event_id, status) VALUES ($1, $2, $3)
             RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(event_id)
        .bind(status.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        registration_from_row(&row)
    }

    async fn update_registration_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE registrations SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(registration_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        event_date: row.try_get("event_date")?,
        location: row.try_get("location")?,
        capacity: row.try_get("capacity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<EventSummary, StoreError> {
    let registered_count: i64 = row.try_get("registered_count")?;
    Ok(EventSummary::new(event_from_row(row)?, registered_count))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
    })
}

fn registration_from_row(row: &PgRow) -> Result<Registration, StoreError> {
    let status: String = row.try_get("status")?;

    Ok(Registration {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_id: row.try_get("event_id")?,
        registration_date: row.try_get("registration_date")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
    })
}

fn details_from_row(row: &PgRow) -> Result<RegistrationDetails, StoreError> {
    Ok(RegistrationDetails {
        registration: registration_from_row(row)?,
        event_title: row.try_get("event_title")?,
        event_description: row.try_get("event_description")?,
        event_date: row.try_get("event_date")?,
        location: row.try_get("location")?,
        user_name: row.try_get("user_name")?,
        user_email: row.try_get("user_email")?,
        user_phone: row.try_get("user_phone")?,
    })
}

// ============================================================================
// Integration Tests
// ============================================================================
//
// Run against a live database when TEST_DATABASE_URL is set, skipped
// otherwise. Every test creates its own events and unique emails, so they
// can share one database.
//
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use futures_util::future::join_all;
    use tokio::sync::OnceCell;

    use super::*;
    use crate::domain::registration::{RegisterRequest, RegistrationEngine, RegistrationError};
    use crate::metrics::Metrics;
    use crate::utils::RetryConfig;

    static SCHEMA: OnceCell<()> = OnceCell::const_new();

    async fn test_store(max_connections: u32) -> Option<Arc<PgStore>> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        };

        let store = PgStore::connect(&DatabaseConfig {
            url,
            max_connections,
        })
        .await
        .unwrap();
        SCHEMA
            .get_or_init(|| async { store.bootstrap().await.unwrap() })
            .await;

        Some(Arc::new(store))
    }

    fn engine(store: Arc<PgStore>) -> Arc<RegistrationEngine> {
        Arc::new(RegistrationEngine::new(
            store,
            Arc::new(Metrics::new().unwrap()),
            RetryConfig::default(),
        ))
    }

    async fn seed_event(store: &PgStore, capacity: i64) -> EventId {
        store
            .insert_event(&NewEvent {
                title: "Postgres test event".to_string(),
                description: None,
                event_date: Utc::now(),
                location: "Test hall".to_string(),
                capacity,
            })
            .await
            .unwrap()
            .id
    }

    fn unique_email(label: &str) -> String {
        format!("{label}-{}@example.com", uuid::Uuid::new_v4())
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some("Racer".to_string()),
            email: Some(email.to_string()),
            phone: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_seat_race_has_one_winner() {
        let Some(store) = test_store(4).await else { return };
        let event_id = seed_event(&store, 1).await;
        let engine = engine(store.clone());

        let handles = [unique_email("ada"), unique_email("grace")].map(|email| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.register(event_id, request(&email)).await })
        });

        let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(RegistrationError::CapacityExceeded { .. })))
                .count(),
            1
        );

        let summary = store.event_summary(event_id).await.unwrap().unwrap();
        assert_eq!(summary.registered_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_burst_larger_than_pool_completes() {
        let Some(store) = test_store(4).await else { return };
        let event_id = seed_event(&store, 100).await;
        let engine = engine(store.clone());

        let handles = (0..16).map(|i| {
            let engine = engine.clone();
            let email = unique_email(&format!("burst{i}"));
            tokio::spawn(async move { engine.register(event_id, request(&email)).await })
        });

        let results = tokio::time::timeout(Duration::from_secs(10), join_all(handles))
            .await
            .expect("registrations for one event must not starve the pool");

        for result in results {
            result.unwrap().unwrap();
        }
        let summary = store.event_summary(event_id).await.unwrap().unwrap();
        assert_eq!(summary.registered_count, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_same_email_first_sight_creates_one_user() {
        let Some(store) = test_store(8).await else { return };
        let engine = engine(store.clone());
        let email = unique_email("shared");

        let mut event_ids = Vec::new();
        for _ in 0..6 {
            event_ids.push(seed_event(&store, 5).await);
        }

        let handles = event_ids.iter().map(|&event_id| {
            let engine = engine.clone();
            let email = email.clone();
            tokio::spawn(async move { engine.register(event_id, request(&email)).await })
        });

        let outcomes: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(outcomes.iter().all(|o| o.user.id == outcomes[0].user.id));
        assert_eq!(store.registrations_for_email(&email).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_savepoint_keeps_transaction_usable() {
        let Some(store) = test_store(2).await else { return };
        let email = unique_email("savepoint");
        let new_user = NewUser {
            name: "Ada".to_string(),
            email: email.clone(),
            phone: None,
        };

        let mut first = store.begin().await.unwrap();
        let created = first.insert_user(&new_user).await.unwrap();
        first.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_user(&new_user).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        let reread = tx.find_user_by_email(&email).await.unwrap().unwrap();
        assert_eq!(reread.id, created.id);
        tx.commit().await.unwrap();
    }
}
