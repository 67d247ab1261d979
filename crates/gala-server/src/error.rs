use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gala_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.  Each variant maps to one entry of
/// the structured rejection taxonomy clients are written against.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Operation not permitted: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Set a display name before posting")]
    ProfileRequired,

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code, so clients can branch (e.g. redirect
    /// `profile_required` callers to the name-setup step) without parsing
    /// the human-readable message.
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation",
            ApiError::ProfileRequired => "profile_required",
            ApiError::DependencyUnavailable(_) => "dependency_unavailable",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("no such record".into()),
            StoreError::Forbidden => {
                ApiError::Forbidden("you may only modify your own content".into())
            }
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::ProfileRequired => ApiError::ProfileRequired,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::ProfileRequired => (StatusCode::PRECONDITION_REQUIRED, self.to_string()),
            // Retryable by the caller, unlike everything above.
            ApiError::DependencyUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            ApiError::from(StoreError::NotFound),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::Forbidden),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::ProfileRequired),
            ApiError::ProfileRequired
        ));
        assert!(matches!(
            ApiError::from(StoreError::Validation("x".into())),
            ApiError::Validation(_)
        ));
    }
}
