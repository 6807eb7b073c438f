use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::registration::RegistrationError;

// ============================================================================
// Event Value Objects
// ============================================================================

pub type EventId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub location: String,
    pub capacity: i64,
    pub created_at: DateTime<Utc>,
}

/// Validated input for inserting an event row
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub location: String,
    pub capacity: i64,
}

/// Event together with its current seat accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub registered_count: i64,
    pub available_spots: i64,
}

impl EventSummary {
    pub fn new(event: Event, registered_count: i64) -> Self {
        let available_spots = event.capacity - registered_count;
        Self {
            event,
            registered_count,
            available_spots,
        }
    }
}

/// Raw event creation payload; fields are optional until validated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_event_date")]
    pub event_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    #[serde(alias = "max_capacity")]
    pub capacity: Option<i64>,
}

impl CreateEventRequest {
    pub fn validate(self) -> Result<NewEvent, RegistrationError> {
        let title = non_blank(self.title);
        let location = non_blank(self.location);

        let (Some(title), Some(event_date), Some(location), Some(capacity)) =
            (title, self.event_date, location, self.capacity)
        else {
            return Err(RegistrationError::Validation(
                "Missing required fields".to_string(),
            ));
        };

        if capacity <= 0 {
            return Err(RegistrationError::Validation(format!(
                "Capacity must be positive, got {capacity}"
            )));
        }

        Ok(NewEvent {
            title,
            description: non_blank(self.description),
            event_date,
            location,
            capacity,
        })
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD[ T]HH:MM[:SS]` / `YYYY-MM-DD` taken as UTC
fn deserialize_event_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid event_date '{raw}'")))
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateEventRequest {
        CreateEventRequest {
            title: Some("RustConf".to_string()),
            description: None,
            event_date: Some(Utc::now()),
            location: Some("Portland".to_string()),
            capacity: Some(50),
        }
    }

    #[test]
    fn test_valid_request_produces_new_event() {
        let new_event = request().validate().unwrap();
        assert_eq!(new_event.title, "RustConf");
        assert_eq!(new_event.capacity, 50);
        assert!(new_event.description.is_none());
    }

    #[test]
    fn test_missing_location_is_rejected() {
        let mut req = request();
        req.location = Some("   ".to_string());

        let err = req.validate().unwrap_err();
        assert!(matches!(err, RegistrationError::Validation(msg) if msg == "Missing required fields"));
    }

    #[test]
    fn test_non_positive_capacity_is_rejected() {
        let mut req = request();
        req.capacity = Some(0);
        assert!(matches!(req.validate(), Err(RegistrationError::Validation(_))));
    }

    #[test]
    fn test_max_capacity_alias_deserializes() {
        let json = r#"{"title":"Meetup","event_date":"2030-05-01T18:00:00Z","location":"Berlin","max_capacity":3}"#;
        let req: CreateEventRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.capacity, Some(3));
    }

    #[test]
    fn test_event_date_accepts_naive_formats() {
        let parse = |date: &str| {
            let json = format!(r#"{{"event_date":"{date}"}}"#);
            serde_json::from_str::<CreateEventRequest>(&json).map(|r| r.event_date)
        };

        let expected = "2030-06-01T18:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse("2030-06-01 18:00").unwrap(), Some(expected));
        assert_eq!(parse("2030-06-01T18:00:00").unwrap(), Some(expected));
        assert_eq!(parse("2030-06-01T20:00:00+02:00").unwrap(), Some(expected));
        assert!(parse("2030-06-01").unwrap().is_some());
        assert!(parse("next tuesday").is_err());

        let missing: CreateEventRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(missing.event_date.is_none());
    }

    #[test]
    fn test_summary_computes_available_spots() {
        let event = Event {
            id: 1,
            title: "Meetup".to_string(),
            description: None,
            event_date: Utc::now(),
            location: "Berlin".to_string(),
            capacity: 10,
            created_at: Utc::now(),
        };

        let summary = EventSummary::new(event, 7);
        assert_eq!(summary.available_spots, 3);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["registered_count"], 7);
        assert_eq!(json["title"], "Meetup");
    }
}
