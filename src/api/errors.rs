use actix_web::error::{InternalError, JsonPayloadError, PathError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use crate::domain::registration::RegistrationError;

impl RegistrationError {
    /// Message shown to API clients; store details stay in the logs
    fn public_message(&self) -> String {
        match self {
            RegistrationError::EventNotFound(_) => "Event not found".to_string(),
            RegistrationError::RegistrationNotFound(_) => "Registration not found".to_string(),
            RegistrationError::Validation(msg) => msg.clone(),
            RegistrationError::CapacityExceeded { .. } => "Event is full".to_string(),
            RegistrationError::AlreadyRegistered { .. } => {
                "Already registered for this event".to_string()
            }
            RegistrationError::Store(_) => "Database error".to_string(),
        }
    }
}

impl ResponseError for RegistrationError {
    fn status_code(&self) -> StatusCode {
        match self {
            RegistrationError::EventNotFound(_) | RegistrationError::RegistrationNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RegistrationError::Validation(_)
            | RegistrationError::CapacityExceeded { .. }
            | RegistrationError::AlreadyRegistered { .. } => StatusCode::BAD_REQUEST,
            RegistrationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.public_message() }))
    }
}

// ============================================================================
// Extractor Errors
// ============================================================================

fn bad_request(err: impl std::fmt::Debug + std::fmt::Display + 'static, message: &str) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(serde_json::json!({ "error": message }));
    InternalError::from_response(err, response).into()
}

/// Unreadable or mistyped JSON bodies
pub fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(path = %req.path(), error = %err, "Rejected request body");
    bad_request(err, "Invalid request body")
}

/// Non-numeric ids in the path
pub fn path_error(err: PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(path = %req.path(), error = %err, "Rejected path parameter");
    bad_request(err, "Invalid id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RegistrationError::EventNotFound(1).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            RegistrationError::CapacityExceeded { event_id: 1, capacity: 1 }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RegistrationError::Store(StoreError::Conflict("40001".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_details_are_not_exposed() {
        let err = RegistrationError::Store(StoreError::Corrupt("status 'x'".to_string()));
        assert_eq!(err.public_message(), "Database error");
    }
}
