use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use syncopate_core::error::{DbError, ErrorCategory};

/// Wrapper turning engine errors into the API envelope:
/// `{error, message, code, db_code}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub DbError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.category() {
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 5xx responses carry no internal detail beyond the message
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
            "code": status.as_u16(),
            "db_code": self.0.code(),
        });
        (status, axum::Json(body)).into_response()
    }
}
