use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::gateway::error::GatewayError;
use crate::models::provider::ProviderKind;

pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{} not configured", .0.display_name())]
    ProviderUnavailable(ProviderKind),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ProviderUnavailable(kind) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!(
                    "{} not configured. Add {} to environment.",
                    kind.display_name(),
                    kind.api_key_env()
                ),
            ),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Gateway(e) => {
                let status = match e {
                    GatewayError::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    GatewayError::UnauthorizedModel(_) => StatusCode::FORBIDDEN,
                    GatewayError::GenerationFailed => StatusCode::BAD_GATEWAY,
                    GatewayError::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
                    GatewayError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
                    GatewayError::ModelListing(_) => {
                        // Already logged with detail at the adapter.
                        return (
                            StatusCode::BAD_GATEWAY,
                            "Failed to retrieve models from provider".to_string(),
                        );
                    }
                };
                (status, e.to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Sqlx(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

// Rejection text quotes the offending input, so it only goes to the log.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AppError::Gateway(GatewayError::Validation)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("Rejected query string: {}", rejection.body_text());
        AppError::Gateway(GatewayError::Validation)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("Rejected path parameter: {}", rejection.body_text());
        AppError::BadRequest("Invalid path parameter".into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = Json(json!({
            "error": { "code": status.as_u16(), "message": message }
        }));

        if matches!(self, AppError::RateLimited) {
            (
                status,
                [(header::RETRY_AFTER, RATE_LIMIT_RETRY_AFTER_SECS.to_string())],
                body,
            )
                .into_response()
        } else {
            (status, body).into_response()
        }
    }
}
