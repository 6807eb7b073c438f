use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::store::RegistrationStore;

/// Start the metrics HTTP server
///
/// Serves `/metrics` for Prometheus and `/health`, which reports the
/// backing store's reachability.
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    store: Arc<dyn RegistrationStore>,
    host: String,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(store.clone()))
            .configure(routes)
    })
    .workers(1)
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(store: web::Data<Arc<dyn RegistrationStore>>) -> impl Responder {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": "event-registration",
            "store": "up"
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed to reach the store");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "event-registration",
                "store": "down"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use async_trait::async_trait;

    use crate::domain::event::{Event, EventId, EventSummary, NewEvent};
    use crate::domain::registration::{RegistrationDetails, RegistrationId};
    use crate::store::{MemoryStore, StoreError, StoreTransaction};

    /// Every call fails as if the database were gone
    struct UnreachableStore;

    fn unreachable() -> StoreError {
        StoreError::Database(sqlx::Error::PoolClosed)
    }

    #[async_trait]
    impl RegistrationStore for UnreachableStore {
        async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
            Err(unreachable())
        }

        async fn insert_event(&self, _event: &NewEvent) -> Result<Event, StoreError> {
            Err(unreachable())
        }

        async fn event_summary(&self, _event_id: EventId) -> Result<Option<EventSummary>, StoreError> {
            Err(unreachable())
        }

        async fn list_event_summaries(&self) -> Result<Vec<EventSummary>, StoreError> {
            Err(unreachable())
        }

        async fn registration_details(
            &self,
            _registration_id: RegistrationId,
        ) -> Result<Option<RegistrationDetails>, StoreError> {
            Err(unreachable())
        }

        async fn registrations_for_email(
            &self,
            _email: &str,
        ) -> Result<Vec<RegistrationDetails>, StoreError> {
            Err(unreachable())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(unreachable())
        }

        async fn close(&self) {}
    }

    fn registry() -> Arc<Registry> {
        let metrics = crate::metrics::Metrics::new().unwrap();
        metrics.record_cancellation("cancelled");
        Arc::new(metrics.registry().clone())
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_registry() {
        let store: Arc<dyn RegistrationStore> = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry()))
                .app_data(web::Data::new(store))
                .configure(routes),
        )
        .await;

        let body = test::call_and_read_body(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("cancellations_total"));

        let health: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["store"], "up");
    }

    #[actix_web::test]
    async fn test_health_reports_unreachable_store() {
        let store: Arc<dyn RegistrationStore> = Arc::new(UnreachableStore);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry()))
                .app_data(web::Data::new(store))
                .configure(routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let health: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(health["store"], "down");
    }
}
