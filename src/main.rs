use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod domain;
mod metrics;
mod store;
mod utils;

use config::Config;
use domain::event::EventCatalog;
use domain::registration::RegistrationEngine;
use store::{MemoryStore, PgStore, RegistrationStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_registration=debug")),
        )
        .init();

    tracing::info!("🚀 Starting event registration service");

    let config = Config::from_env()?;

    // === 1. Storage ===
    let store: Arc<dyn RegistrationStore> = match &config.database {
        Some(database) => {
            tracing::info!("Connecting to PostgreSQL...");
            let pg = PgStore::connect(database).await?;
            pg.bootstrap().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());
    let metrics_registry = Arc::new(metrics.registry().clone());

    // === 3. Domain services ===
    let state = api::AppState {
        catalog: Arc::new(EventCatalog::new(store.clone(), metrics.clone())),
        engine: Arc::new(RegistrationEngine::new(
            store.clone(),
            metrics.clone(),
            config.retry.clone(),
        )),
    };

    // === 4. HTTP servers ===
    let host = config.server.host.clone();
    let port = config.server.port;
    tracing::info!("🌐 API listening on http://{}:{}/api", host, port);

    let api_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure)
    })
    .bind((host.as_str(), port))?
    .run();

    let metrics_server = metrics::start_metrics_server(
        metrics_registry,
        store.clone(),
        config.server.host.clone(),
        config.server.metrics_port,
    );

    // Both servers stop on SIGINT/SIGTERM and drain in-flight requests
    let served = tokio::try_join!(api_server, metrics_server);

    tracing::info!("Shutting down");
    store.close().await;

    served?;
    Ok(())
}
