use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use warbler_db::DbError;
use warbler_types::api::FlashResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No acting user, or the actor may not touch this resource.
    #[error("Access unauthorized.")]
    Unauthorized,

    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(msg) => Self::BadRequest(msg),
            DbError::Integrity(msg) => Self::Conflict(msg),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Auth failures render a flash on a normal page instead of an error status.
        let (status, code, message) = match &self {
            Self::Unauthorized | Self::InvalidCredentials => {
                warn!("{}", self);
                let flash = FlashResponse::new("danger", &self.to_string());
                return (StatusCode::OK, Json(flash)).into_response();
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Self::Internal(e) => {
                error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_statuses() {
        let validation: ApiError = DbError::validation("password must be non-empty").into();
        assert!(matches!(validation, ApiError::BadRequest(_)));

        let integrity: ApiError = DbError::Integrity("UNIQUE constraint failed".into()).into();
        assert!(matches!(integrity, ApiError::Conflict(_)));

        let poisoned: ApiError = DbError::LockPoisoned("boom".into()).into();
        assert_eq!(
            poisoned.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_renders_ok() {
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::OK);
    }
}
