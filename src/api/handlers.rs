use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::domain::event::{CreateEventRequest, EventId};
use crate::domain::registration::{
    CancelOutcome, RegisterRequest, RegistrationError, RegistrationId, RegistrationOutcome,
};

use super::AppState;

type ApiResult = Result<HttpResponse, RegistrationError>;

#[derive(Serialize)]
struct RegisterResponse<'a> {
    message: &'static str,
    #[serde(flatten)]
    outcome: &'a RegistrationOutcome,
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn list_events(state: web::Data<AppState>) -> ApiResult {
    let events = state.catalog.list_events().await?;
    Ok(HttpResponse::Ok().json(events))
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), event_id = *path))]
pub async fn get_event(state: web::Data<AppState>, path: web::Path<EventId>) -> ApiResult {
    let event = state.catalog.get_event(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(event))
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn create_event(
    state: web::Data<AppState>,
    body: web::Json<CreateEventRequest>,
) -> ApiResult {
    let event = state.catalog.create_event(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(event))
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), event_id = *path))]
pub async fn register(
    state: web::Data<AppState>,
    path: web::Path<EventId>,
    body: web::Json<RegisterRequest>,
) -> ApiResult {
    let outcome = state
        .engine
        .register(path.into_inner(), body.into_inner())
        .await?;

    let response = if outcome.reactivated {
        HttpResponse::Ok().json(RegisterResponse {
            message: "Registration confirmed",
            outcome: &outcome,
        })
    } else {
        HttpResponse::Created().json(RegisterResponse {
            message: "Registration successful",
            outcome: &outcome,
        })
    };

    Ok(response)
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn user_registrations(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult {
    let registrations = state.engine.user_registrations(&path).await?;
    Ok(HttpResponse::Ok().json(registrations))
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), registration_id = *path))]
pub async fn get_registration(
    state: web::Data<AppState>,
    path: web::Path<RegistrationId>,
) -> ApiResult {
    let details = state.engine.registration_details(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), registration_id = *path))]
pub async fn cancel_registration(
    state: web::Data<AppState>,
    path: web::Path<RegistrationId>,
) -> ApiResult {
    let message = match state.engine.cancel(path.into_inner()).await? {
        CancelOutcome::Cancelled => "Registration cancelled successfully",
        CancelOutcome::AlreadyCancelled => "Registration already cancelled",
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message })))
}
