use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::key_service;
use crate::state::AppState;

/// Identity of the authenticated API key, injected into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key_id: Uuid,
    pub user_id: String,
}

/// Extract a Bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller's identity. `Ok(None)` when no credentials were sent;
/// credentials that do not match an active key are rejected.
async fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Identity>, AppError> {
    let Some(token) = extract_bearer(headers) else {
        return Ok(None);
    };

    let mut redis = state.redis.clone();
    match key_service::validate_key(token, &mut redis, &state.db).await? {
        Some(owner) => Ok(Some(Identity {
            key_id: owner.key_id,
            user_id: owner.user_id,
        })),
        None => {
            tracing::debug!("Rejected unknown API key");
            Err(AppError::Unauthorized)
        }
    }
}

/// Middleware that validates the Admin Key from env config.
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match extract_bearer(req.headers()) {
        Some(token) if token == state.config.admin_key => Ok(next.run(req).await),
        _ => Err(AppError::Unauthorized),
    }
}

/// Middleware for endpoints that serve anonymous callers too.
/// A valid key attaches an [`Identity`]; an invalid key is still a 401.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(identity) = resolve_identity(&state, req.headers()).await? {
        req.extensions_mut().insert(identity);
    }
    Ok(next.run(req).await)
}

/// Middleware that requires a valid API key.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = resolve_identity(&state, req.headers())
        .await?
        .ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// The caller's identity if an auth middleware attached one.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Identity>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentUser(parts.extensions.get::<Identity>().cloned()))
    }
}
