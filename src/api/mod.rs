// ============================================================================
// HTTP API - actix-web routes over the catalog and registration engine
// ============================================================================
//
// Handlers only translate between HTTP and the domain; every rule lives in
// crate::domain. Domain errors become `{"error": ...}` bodies via the
// ResponseError impl in errors.rs; extractor failures get the same shape.
//
// ============================================================================

mod errors;
mod handlers;

use std::sync::Arc;

use actix_web::web;

use crate::domain::event::EventCatalog;
use crate::domain::registration::RegistrationEngine;

/// Shared handler state, cloned into each actix worker
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<EventCatalog>,
    pub engine: Arc<RegistrationEngine>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(errors::json_error))
            .app_data(web::PathConfig::default().error_handler(errors::path_error))
            .route("/events", web::get().to(handlers::list_events))
            .route("/events", web::post().to(handlers::create_event))
            .route("/events/{id}", web::get().to(handlers::get_event))
            .route("/events/{id}/register", web::post().to(handlers::register))
            .route(
                "/users/{email}/registrations",
                web::get().to(handlers::user_registrations),
            )
            .route("/registrations/{id}", web::get().to(handlers::get_registration))
            .route("/registrations/{id}", web::delete().to(handlers::cancel_registration)),
    );
}
