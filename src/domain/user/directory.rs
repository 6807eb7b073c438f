use crate::store::{StoreError, StoreTransaction};

use super::value_objects::{NewUser, User};

// ============================================================================
// User Directory
// ============================================================================
//
// Maps an email to exactly one durable User, inside the caller's transaction.
// The store's unique(email) constraint is authoritative: when a concurrent
// creation wins the insert, the loser re-reads and returns the winner's row.
//
// ============================================================================

pub struct UserDirectory<'tx> {
    tx: &'tx mut Box<dyn StoreTransaction>,
}

impl<'tx> UserDirectory<'tx> {
    pub fn new(tx: &'tx mut Box<dyn StoreTransaction>) -> Self {
        Self { tx }
    }

    /// Return the user owning `email`, creating it on first sight.
    ///
    /// An existing record is returned unchanged; `name` and `phone` are only
    /// used when a new record is created.
    pub async fn resolve_or_create(
        &mut self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, StoreError> {
        if let Some(user) = self.tx.find_user_by_email(email).await? {
            tracing::debug!(user_id = user.id, "Resolved existing user");
            return Ok(user);
        }

        self.create_or_reread(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.map(str::to_string),
        })
        .await
    }

    async fn create_or_reread(&mut self, new_user: NewUser) -> Result<User, StoreError> {
        match self.tx.insert_user(&new_user).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Created user");
                Ok(user)
            }
            Err(StoreError::UniqueViolation(detail)) => {
                tracing::debug!(
                    detail = %detail,
                    "Concurrent user creation won the insert, re-reading"
                );
                self.tx
                    .find_user_by_email(&new_user.email)
                    .await?
                    .ok_or(StoreError::UniqueViolation(detail))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{MemoryStore, RegistrationStore};
    use futures_util::future::join_all;

    async fn resolve(
        store: &MemoryStore,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> User {
        let mut tx = store.begin().await.unwrap();
        let user = UserDirectory::new(&mut tx)
            .resolve_or_create(email, name, phone)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_first_sight_creates_user() {
        let store = MemoryStore::new();

        let user = resolve(&store, "ada@example.com", "Ada", Some("555-0100")).await;

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_existing_user_is_returned_unchanged() {
        let store = MemoryStore::new();

        let first = resolve(&store, "ada@example.com", "Ada", None).await;
        let second = resolve(&store, "ada@example.com", "Someone Else", Some("555-0199")).await;

        assert_eq!(first, second);
        assert_eq!(second.name, "Ada");
        assert!(second.phone.is_none());
    }

    #[tokio::test]
    async fn test_email_match_is_case_sensitive() {
        let store = MemoryStore::new();

        let lower = resolve(&store, "ada@example.com", "Ada", None).await;
        let upper = resolve(&store, "Ada@example.com", "Ada", None).await;

        assert_ne!(lower.id, upper.id);
    }

    #[tokio::test]
    async fn test_lost_insert_race_rereads_winner() {
        let store = MemoryStore::new();
        let winner = store.seed_user("race@example.com").await;

        let mut tx = store.begin().await.unwrap();
        let resolved = UserDirectory::new(&mut tx)
            .create_or_reread(NewUser {
                name: "Loser".to_string(),
                email: "race@example.com".to_string(),
                phone: None,
            })
            .await
            .unwrap();

        assert_eq!(resolved, winner);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolution_creates_one_row() {
        let store = Arc::new(MemoryStore::new());

        let handles = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                resolve(&store, "same@example.com", &format!("Caller {i}"), None).await
            })
        });

        let users: Vec<User> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert!(users.iter().all(|u| u.id == users[0].id));
        assert_eq!(store.user_count().await, 1);
    }
}
