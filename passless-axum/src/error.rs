use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use passless::AuthError;
use serde::Serialize;

/// Wire form of every error response:
/// `{ "status": 401, "error": "invalid-or-expired-ticket", "message": "..." }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status >= 500 {
            tracing::error!("request failed: {:?}", self.0);
        }
        let body = ErrorBody {
            status,
            error: self.0.code(),
            // Internal details stay in the logs.
            message: match &self.0 {
                AuthError::Internal(_) => "internal server error".to_string(),
                other => other.to_string(),
            },
        };
        let status =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
