use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::warn;

use civiclens_common::CivicLensError;

/// Error wrapper that maps domain errors onto HTTP responses. Internal
/// failures are logged server-side and never echoed to the client.
pub struct ApiError(pub CivicLensError);

impl From<CivicLensError> for ApiError {
    fn from(e: CivicLensError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CivicLensError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CivicLensError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            CivicLensError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            other => {
                warn!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: CivicLensError) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            status_of(CivicLensError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CivicLensError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CivicLensError::NotFound("gone".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CivicLensError::Database("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
