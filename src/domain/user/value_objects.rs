use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// User Value Objects
// ============================================================================

pub type UserId = i64;

/// Email is the identity key: unique and matched exactly, case included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}
