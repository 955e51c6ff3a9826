use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::validation::allowed_models;
use crate::gateway::Gateway;
use crate::middleware::auth::{CurrentUser, Identity};
use crate::models::generation::ModelDescriptor;
use crate::models::provider::ProviderKind;
use crate::models::ApiResponse;
use crate::state::AppState;

use super::AppQuery;

pub const PREVIEW_PAGE_SIZE: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// Provider catalogue; the user id is only present for authenticated callers.
pub fn catalogue(config: &Config, gateway: &Gateway, identity: Option<&Identity>) -> Value {
    let providers: Vec<Value> = ProviderKind::ALL
        .iter()
        .map(|kind| {
            json!({
                "id": kind.as_str(),
                "name": kind.display_name(),
                "description": kind.description(),
                "available": gateway.is_configured(*kind),
                "models": allowed_models(*kind),
            })
        })
        .collect();

    let mut body = json!({
        "providers": providers,
        "default_provider": config.default_provider,
        "default_model": config.default_model(config.default_provider),
        "authenticated": identity.is_some(),
    });
    if let Some(identity) = identity {
        body["user_id"] = json!(identity.user_id);
    }
    body
}

/// Anonymous callers only learn the defaults.
pub fn provider_config(config: &Config, gateway: &Gateway, authenticated: bool) -> Value {
    let mut body = json!({
        "default_provider": config.default_provider,
        "default_model": config.default_model(config.default_provider),
        "authenticated": authenticated,
    });
    if authenticated {
        body["openrouter_default_model"] = json!(config.openrouter_default_model);
        body["gemini_default_model"] = json!(config.gemini_default_model);
        body["openrouter_provider"] = json!(config.openrouter_provider);
        body["google_configured"] = json!(gateway.is_configured(ProviderKind::Google));
        body["openrouter_configured"] = json!(gateway.is_configured(ProviderKind::OpenRouter));
    }
    body
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsQuery {
    pub provider: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

fn parse_provider(raw: Option<&str>) -> Result<ProviderKind, AppError> {
    match raw {
        None => Ok(ProviderKind::OpenRouter),
        Some(s) => ProviderKind::from_str(s)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown provider '{s}'"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub page_size: usize,
    pub preview: bool,
}

impl PageWindow {
    /// Anonymous callers get a fixed first-page preview.
    pub fn resolve(page: Option<usize>, page_size: Option<usize>, authenticated: bool) -> Self {
        if !authenticated {
            return Self {
                page: 1,
                page_size: PREVIEW_PAGE_SIZE,
                preview: true,
            };
        }
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            preview: false,
        }
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.page - 1).saturating_mul(self.page_size).min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }

    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }
}

#[derive(Debug, Serialize)]
pub struct ModelsPage {
    pub provider: ProviderKind,
    pub models: Vec<ModelDescriptor>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub preview: bool,
    pub authenticated: bool,
}

pub fn models_page(
    provider: ProviderKind,
    models: &[ModelDescriptor],
    window: PageWindow,
    authenticated: bool,
) -> ModelsPage {
    ModelsPage {
        provider,
        models: window.slice(models).to_vec(),
        total: models.len(),
        page: window.page,
        page_size: window.page_size,
        total_pages: window.total_pages(models.len()),
        preview: window.preview,
        authenticated,
    }
}

/// GET /api/v1/providers
async fn list_providers(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::data(catalogue(
        &state.config,
        &state.gateway,
        identity.as_ref(),
    )))
}

/// GET /api/v1/providers/config
async fn get_provider_config(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::data(provider_config(
        &state.config,
        &state.gateway,
        identity.is_some(),
    )))
}

/// GET /api/v1/providers/models
async fn list_models(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    AppQuery(query): AppQuery<ModelsQuery>,
) -> Result<Json<ApiResponse<ModelsPage>>, AppError> {
    let kind = parse_provider(query.provider.as_deref())?;
    let provider = state.provider(kind)?;
    let models = provider.available_models(false).await?;

    let authenticated = identity.is_some();
    let window = PageWindow::resolve(query.page, query.page_size, authenticated);
    Ok(Json(ApiResponse::data(models_page(
        kind,
        &models,
        window,
        authenticated,
    ))))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    pub provider: Option<String>,
}

/// POST /api/v1/providers/models/refresh
async fn refresh_models(
    State(state): State<Arc<AppState>>,
    CurrentUser(identity): CurrentUser,
    AppQuery(query): AppQuery<RefreshQuery>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let kind = parse_provider(query.provider.as_deref())?;
    let provider = state.provider(kind)?;
    let models = provider.available_models(true).await?;

    tracing::info!(
        provider = %kind,
        user_id = identity.as_ref().map(|i| i.user_id.as_str()).unwrap_or_default(),
        "Refreshed model list ({} models)",
        models.len()
    );
    Ok(Json(ApiResponse::data(json!({
        "provider": kind,
        "total": models.len(),
        "refreshed": true,
    }))))
}

/// Routes open to anonymous callers (nested under /api/v1).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/providers/config", get(get_provider_config))
        .route("/providers/models", get(list_models))
}

/// Routes that need a valid API key (nested under /api/v1).
pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/providers/models/refresh", post(refresh_models))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use uuid::Uuid;

    fn gateway_for(config: &Config) -> Gateway {
        Gateway::from_config(config, reqwest::Client::new())
    }

    fn descriptors(n: usize) -> Vec<ModelDescriptor> {
        (0..n)
            .map(|i| ModelDescriptor::from_listing(format!("m/{i}"), None, None, None, None))
            .collect()
    }

    #[test]
    fn catalogue_hides_user_id_from_anonymous_callers() {
        let config = Config::for_tests();
        let gateway = gateway_for(&config);

        let anon = catalogue(&config, &gateway, None);
        assert_eq!(anon["authenticated"], false);
        assert!(anon.get("user_id").is_none());
        assert_eq!(anon["default_provider"], "openrouter");
        assert_eq!(anon["default_model"], "anthropic/claude-3.5-sonnet");

        let providers = anon["providers"].as_array().unwrap();
        assert_eq!(providers.len(), 2);
        let google = &providers[0];
        assert_eq!(google["id"], "google");
        assert_eq!(google["available"], false);
        assert_eq!(google["models"].as_array().unwrap().len(), 4);
        let openrouter = &providers[1];
        assert_eq!(openrouter["available"], true);
        assert_eq!(openrouter["models"].as_array().unwrap().len(), 11);

        let identity = Identity {
            key_id: Uuid::nil(),
            user_id: "user-1".into(),
        };
        let authed = catalogue(&config, &gateway, Some(&identity));
        assert_eq!(authed["authenticated"], true);
        assert_eq!(authed["user_id"], "user-1");
    }

    #[test]
    fn config_details_require_authentication() {
        let config = Config::for_tests();
        let gateway = gateway_for(&config);

        let anon = provider_config(&config, &gateway, false);
        assert_eq!(anon["default_provider"], "openrouter");
        assert!(anon.get("openrouter_provider").is_none());
        assert!(anon.get("google_configured").is_none());

        let authed = provider_config(&config, &gateway, true);
        assert_eq!(authed["openrouter_provider"], "anthropic");
        assert_eq!(authed["google_configured"], false);
        assert_eq!(authed["openrouter_configured"], true);
    }

    #[test]
    fn anonymous_listing_is_a_fixed_preview() {
        let window = PageWindow::resolve(Some(3), Some(100), false);
        assert_eq!(
            window,
            PageWindow {
                page: 1,
                page_size: PREVIEW_PAGE_SIZE,
                preview: true
            }
        );

        let models = descriptors(25);
        let page = models_page(ProviderKind::OpenRouter, &models, window, false);
        assert_eq!(page.models.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.preview);
    }

    #[test]
    fn authenticated_page_size_is_clamped() {
        assert_eq!(PageWindow::resolve(None, None, true).page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(PageWindow::resolve(None, Some(500), true).page_size, MAX_PAGE_SIZE);
        assert_eq!(PageWindow::resolve(None, Some(0), true).page_size, 1);
        assert_eq!(PageWindow::resolve(Some(0), None, true).page, 1);
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let models = descriptors(120);
        let window = PageWindow::resolve(Some(2), Some(100), true);
        let page = models_page(ProviderKind::OpenRouter, &models, window, true);
        assert_eq!(page.models.len(), 20);
        assert_eq!(page.models[0].id, "m/100");
        assert_eq!(page.total_pages, 2);

        let window = PageWindow::resolve(Some(9), Some(100), true);
        assert!(models_page(ProviderKind::OpenRouter, &models, window, true).models.is_empty());
    }

    #[test]
    fn provider_query_defaults_to_openrouter() {
        assert_eq!(parse_provider(None).unwrap(), ProviderKind::OpenRouter);
        assert_eq!(parse_provider(Some("gemini")).unwrap(), ProviderKind::Google);
        assert!(matches!(parse_provider(Some("azure")), Err(AppError::BadRequest(_))));
    }
}
