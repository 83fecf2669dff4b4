use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use waypoint_common::WaypointError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Request too large")]
    RequestTooLarge,

    #[error("Invalid content type")]
    InvalidContentType,

    #[error("Core service error: {0}")]
    CoreService(#[from] WaypointError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::CoreService(err) => match err {
                WaypointError::Validation(_) | WaypointError::BadRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                WaypointError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                WaypointError::Forbidden(_) => StatusCode::FORBIDDEN,
                WaypointError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_message, error_code) = match self {
            ApiError::Validation(msg) => (msg, "VALIDATION_ERROR"),
            ApiError::Authentication(msg) => (msg, "AUTHENTICATION_ERROR"),
            ApiError::Authorization(msg) => (msg, "AUTHORIZATION_ERROR"),
            ApiError::NotFound(msg) => (msg, "NOT_FOUND"),
            ApiError::RateLimit => ("Rate limit exceeded".to_string(), "RATE_LIMIT"),
            ApiError::RequestTooLarge => (
                "Request payload too large".to_string(),
                "REQUEST_TOO_LARGE",
            ),
            ApiError::InvalidContentType => (
                "Invalid content type".to_string(),
                "INVALID_CONTENT_TYPE",
            ),
            ApiError::CoreService(err) => match err {
                WaypointError::Validation(msg) => (msg, "VALIDATION_ERROR"),
                WaypointError::BadRequest(msg) => (msg, "BAD_REQUEST"),
                WaypointError::Unauthorized(msg) => (msg, "AUTHENTICATION_ERROR"),
                WaypointError::Forbidden(msg) => (msg, "AUTHORIZATION_ERROR"),
                WaypointError::NotFound(msg) => (msg, "NOT_FOUND"),
                other => {
                    error!("Core service error: {}", other);
                    ("Internal server error".to_string(), "INTERNAL_ERROR")
                }
            },
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ("Internal server error".to_string(), "INTERNAL_ERROR")
            }
        };

        let response_body = json!({
            "success": false,
            "error": error_message,
            "error_code": error_code,
            "timestamp": chrono::Utc::now()
        });

        (status, Json(response_body)).into_response()
    }
}

pub fn validation_error(message: &str) -> ApiError {
    ApiError::Validation(message.to_string())
}

pub fn auth_error(message: &str) -> ApiError {
    ApiError::Authentication(message.to_string())
}

pub fn authz_error(message: &str) -> ApiError {
    ApiError::Authorization(message.to_string())
}

pub fn not_found(message: &str) -> ApiError {
    ApiError::NotFound(message.to_string())
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = validation_error("Invalid input");
        assert!(matches!(error, ApiError::Validation(_)));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (WaypointError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (WaypointError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (WaypointError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (WaypointError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (WaypointError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (WaypointError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_rate_limit_error() {
        let response = ApiError::RateLimit.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response =
            ApiError::from(WaypointError::Database("disk I/O error".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
    }
}
