use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{ApiKeyCreated, ApiKeyInfo};
use crate::models::usage::UsageListResponse;
use crate::services::{key_service, usage_service};
use crate::state::AppState;

use super::{AppJson, AppPath, AppQuery};

// ── API key endpoints ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    pub user_id: String,
}

impl CreateKeyRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(AppError::BadRequest("user_id is required".into()));
        }
        Ok(())
    }
}

/// POST /admin/keys: create a new API key
async fn create_key(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<CreateKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    body.validate()?;

    let mut redis = state.redis.clone();
    let result: ApiKeyCreated = key_service::create_key(
        body.name.trim(),
        body.user_id.trim(),
        &state.db,
        &mut redis,
    )
    .await?;

    tracing::info!(key_id = %result.id, user_id = %result.user_id, "Created API key");
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /admin/keys: list all keys (without plaintext)
async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ApiKeyInfo>>, AppError> {
    let keys = key_service::list_keys(&state.db).await?;
    Ok(Json(keys))
}

/// DELETE /admin/keys/{id}: revoke a key
async fn revoke_key(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut redis = state.redis.clone();
    key_service::revoke_key(id, &state.db, &mut redis).await?;
    tracing::info!(key_id = %id, "Revoked API key");
    Ok(StatusCode::NO_CONTENT)
}

// ── Usage endpoints ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListUsageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub key_id: Option<Uuid>,
    pub model: Option<String>,
}

impl From<ListUsageQuery> for usage_service::ListUsageParams {
    fn from(query: ListUsageQuery) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(50).clamp(1, 200),
            key_id: query.key_id,
            model: query.model.filter(|m| !m.trim().is_empty()),
        }
    }
}

/// GET /admin/usage: list generation usage with pagination + optional filters
async fn list_usage(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListUsageQuery>,
) -> Result<Json<UsageListResponse>, AppError> {
    let result = usage_service::list_usage(&state.db, query.into()).await?;
    Ok(Json(result))
}

// ── Models cache ──────────────────────────────────────────────────────

/// DELETE /admin/models/cache: drop every provider's cached model list
async fn clear_models_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.gateway.clear_all_caches().await;
    tracing::info!("Cleared model list caches");
    StatusCode::NO_CONTENT
}

/// Build the admin router (to be nested under /admin)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/keys", post(create_key).get(list_keys))
        .route("/keys/{id}", delete(revoke_key))
        .route("/usage", get(list_usage))
        .route("/models/cache", delete(clear_models_cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use usage_service::ListUsageParams;

    #[test]
    fn create_key_requires_name_and_owner() {
        let ok = CreateKeyRequest {
            name: "notebook".into(),
            user_id: "user-1".into(),
        };
        assert!(ok.validate().is_ok());

        let no_name = CreateKeyRequest {
            name: "  ".into(),
            user_id: "user-1".into(),
        };
        assert!(matches!(no_name.validate(), Err(AppError::BadRequest(m)) if m == "name is required"));

        let no_owner = CreateKeyRequest {
            name: "notebook".into(),
            user_id: "".into(),
        };
        assert!(matches!(no_owner.validate(), Err(AppError::BadRequest(m)) if m == "user_id is required"));
    }

    #[test]
    fn usage_query_is_clamped() {
        let params: ListUsageParams = ListUsageQuery::default().into();
        assert_eq!((params.page, params.per_page), (1, 50));

        let params: ListUsageParams = ListUsageQuery {
            page: Some(-3),
            per_page: Some(10_000),
            key_id: None,
            model: Some(" ".into()),
        }
        .into();
        assert_eq!((params.page, params.per_page), (1, 200));
        assert_eq!(params.model, None);

        let params: ListUsageParams = ListUsageQuery {
            page: Some(i64::MAX),
            ..Default::default()
        }
        .into();
        assert_eq!(params.page, i64::MAX);
    }
}
