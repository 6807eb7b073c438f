use std::sync::Arc;

use crate::domain::registration::RegistrationError;
use crate::metrics::Metrics;
use crate::store::RegistrationStore;

use super::value_objects::{CreateEventRequest, Event, EventId, EventSummary};

// ============================================================================
// Event Catalog
// ============================================================================
//
// Read side of events plus creation. Seat counts are always computed by the
// store at query time; nothing is cached in process.
//
// ============================================================================

pub struct EventCatalog {
    store: Arc<dyn RegistrationStore>,
    metrics: Arc<Metrics>,
}

impl EventCatalog {
    pub fn new(store: Arc<dyn RegistrationStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn create_event(&self, request: CreateEventRequest) -> Result<Event, RegistrationError> {
        let new_event = request.validate()?;
        let event = self.store.insert_event(&new_event).await?;
        self.metrics.record_event_created();

        tracing::info!(
            event_id = event.id,
            capacity = event.capacity,
            title = %event.title,
            "Event created"
        );

        Ok(event)
    }

    pub async fn get_event(&self, event_id: EventId) -> Result<EventSummary, RegistrationError> {
        self.store
            .event_summary(event_id)
            .await?
            .ok_or(RegistrationError::EventNotFound(event_id))
    }

    /// All events ordered by date, soonest first
    pub async fn list_events(&self) -> Result<Vec<EventSummary>, RegistrationError> {
        Ok(self.store.list_event_summaries().await?)
    }

    pub async fn confirmed_count(&self, event_id: EventId) -> Result<i64, RegistrationError> {
        Ok(self.get_event(event_id).await?.registered_count)
    }

    pub async fn available_spots(&self, event_id: EventId) -> Result<i64, RegistrationError> {
        Ok(self.get_event(event_id).await?.available_spots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn catalog() -> EventCatalog {
        EventCatalog::new(Arc::new(MemoryStore::new()), Arc::new(Metrics::new().unwrap()))
    }

    fn request(title: &str, days_ahead: i64, capacity: i64) -> CreateEventRequest {
        CreateEventRequest {
            title: Some(title.to_string()),
            description: Some("talks and snacks".to_string()),
            event_date: Some(Utc::now() + Duration::days(days_ahead)),
            location: Some("Lisbon".to_string()),
            capacity: Some(capacity),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let catalog = catalog();

        let event = catalog.create_event(request("Workshop", 3, 20)).await.unwrap();
        let summary = catalog.get_event(event.id).await.unwrap();

        assert_eq!(summary.event, event);
        assert_eq!(summary.registered_count, 0);
        assert_eq!(summary.available_spots, 20);
        assert_eq!(catalog.available_spots(event.id).await.unwrap(), 20);
        assert_eq!(catalog.confirmed_count(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_events_sorted_by_date() {
        let catalog = catalog();

        catalog.create_event(request("Later", 10, 5)).await.unwrap();
        catalog.create_event(request("Sooner", 1, 5)).await.unwrap();

        let titles: Vec<_> = catalog
            .list_events()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.event.title)
            .collect();

        assert_eq!(titles, vec!["Sooner", "Later"]);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let catalog = catalog();

        let err = catalog.get_event(42).await.unwrap_err();
        assert!(matches!(err, RegistrationError::EventNotFound(42)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_request_writes_nothing() {
        let catalog = catalog();

        let mut req = request("Broken", 1, 5);
        req.title = None;

        assert!(catalog.create_event(req).await.is_err());
        assert!(catalog.list_events().await.unwrap().is_empty());
    }
}
