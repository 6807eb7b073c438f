use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::{non_blank, EventId, EventSummary};
use crate::domain::user::{User, UserId};

use super::errors::RegistrationError;

// ============================================================================
// Registration Value Objects
// ============================================================================

pub type RegistrationId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// Status after a registration attempt on an existing row.
    /// `None` means the row is already confirmed and the attempt is rejected.
    pub fn register(self) -> Option<RegistrationStatus> {
        match self {
            RegistrationStatus::Cancelled => Some(RegistrationStatus::Confirmed),
            RegistrationStatus::Confirmed => None,
        }
    }

    /// Status after a cancellation. `None` means nothing to change.
    pub fn cancel(self) -> Option<RegistrationStatus> {
        match self {
            RegistrationStatus::Confirmed => Some(RegistrationStatus::Cancelled),
            RegistrationStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(format!("unknown registration status '{other}'")),
        }
    }
}

/// Ledger row; one per (user, event), never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub registration_date: DateTime<Utc>,
    pub status: RegistrationStatus,
}

/// Registration joined with its event and user, for read endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationDetails {
    #[serde(flatten)]
    pub registration: Registration,
    pub event_title: String,
    pub event_description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub location: String,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Identity fields of a registration attempt after presence checks
#[derive(Debug, Clone, PartialEq)]
pub struct Registrant {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<Registrant, RegistrationError> {
        match (non_blank(self.name), non_blank(self.email)) {
            (Some(name), Some(email)) => Ok(Registrant {
                name,
                email,
                phone: non_blank(self.phone),
            }),
            _ => Err(RegistrationError::Validation(
                "Name and email are required".to_string(),
            )),
        }
    }
}

/// Result of a successful `register`.
///
/// `event` is the snapshot read inside the transaction, so its
/// `registered_count` is the count before this registration was written.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub user: User,
    pub event: EventSummary,
    pub registration: Registration,
    #[serde(skip)]
    pub reactivated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
}

// ============================================================================
// Unit Tests
// ============================================================================
