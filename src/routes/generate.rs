use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::AppError;
use crate::gateway::error::GatewayError;
use crate::middleware::auth::Identity;
use crate::models::generation::{
    ContextGenerationRequest, GenerationRequest, GenerationResult, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_TEMPERATURE,
};
use crate::models::provider::ProviderKind;
use crate::models::ApiResponse;
use crate::services::usage_service::{self, NewUsage};
use crate::state::AppState;

use super::AppJson;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub provider_hint: Option<String>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ContextGenerateBody {
    pub message: String,
    pub context: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub provider_hint: Option<String>,
    #[serde(default)]
    pub source_names: Vec<String>,
    pub persona_instructions: Option<String>,
}

/// Which provider and model a request goes to, after applying defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: ProviderKind,
    pub model_id: String,
    pub provider_hint: Option<String>,
}

pub fn resolve_target(
    config: &Config,
    provider: Option<&str>,
    model: Option<String>,
    provider_hint: Option<String>,
) -> Result<Target, AppError> {
    let kind = match provider {
        Some(raw) => ProviderKind::from_str(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown provider '{raw}'")))?,
        None => config.default_provider,
    };
    let model_id = model.unwrap_or_else(|| config.default_model(kind).to_string());
    let provider_hint = provider_hint.or_else(|| config.default_provider_hint(kind));

    Ok(Target {
        kind,
        model_id,
        provider_hint,
    })
}

pub fn generation_request(body: GenerateBody, target: &Target) -> GenerationRequest {
    let mut request = GenerationRequest::new(body.prompt, target.model_id.clone())
        .with_provider_hint(target.provider_hint.clone())
        .with_temperature(body.temperature.unwrap_or(DEFAULT_TEMPERATURE))
        .with_max_output_tokens(body.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS));
    if let Some(instruction) = body.system_instruction {
        request = request.with_system_instruction(instruction);
    }
    request
}

pub fn context_request(body: ContextGenerateBody, target: &Target) -> ContextGenerationRequest {
    ContextGenerationRequest::new(body.message, body.context, target.model_id.clone())
        .with_source_names(body.source_names)
        .with_persona(body.persona_instructions)
        .with_provider_hint(target.provider_hint.clone())
}

#[derive(Debug, Serialize)]
pub struct GeneratedContent {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub model_used: String,
    pub provider: String,
}

pub type GenerateResponse = ApiResponse<GeneratedContent, UsageSummary>;

pub fn render(result: GenerationResult) -> GenerateResponse {
    ApiResponse::with_usage(
        GeneratedContent {
            content: result.content,
        },
        UsageSummary {
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            cost_usd: result.cost_usd,
            model_used: result.model_used,
            provider: result.provider_label,
        },
    )
}

/// Usage row for an outcome, or `None` when the request never reached the upstream.
pub fn usage_row(
    identity: &Identity,
    target: &Target,
    outcome: &Result<GenerationResult, GatewayError>,
    latency_ms: i32,
) -> Option<NewUsage> {
    let base = NewUsage {
        api_key_id: Some(identity.key_id),
        user_id: identity.user_id.clone(),
        provider: target.kind.as_str().to_string(),
        model_used: target.model_id.clone(),
        input_tokens: 0,
        output_tokens: 0,
        cost_usd: 0.0,
        latency_ms,
        is_error: false,
    };

    match outcome {
        Ok(result) => Some(NewUsage {
            model_used: result.model_used.clone(),
            input_tokens: i64::try_from(result.input_tokens).unwrap_or(i64::MAX),
            output_tokens: i64::try_from(result.output_tokens).unwrap_or(i64::MAX),
            cost_usd: result.cost_usd,
            ..base
        }),
        Err(GatewayError::Validation | GatewayError::UnauthorizedModel(_)) => None,
        Err(_) => Some(NewUsage {
            is_error: true,
            ..base
        }),
    }
}

fn finish(
    state: &AppState,
    identity: &Identity,
    target: &Target,
    started: Instant,
    outcome: Result<GenerationResult, GatewayError>,
) -> Result<Json<GenerateResponse>, AppError> {
    let latency_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);
    if let Some(row) = usage_row(identity, target, &outcome, latency_ms) {
        usage_service::record_usage(state.db.clone(), row);
    }

    let result = outcome?;
    tracing::info!(
        provider = %target.kind,
        model = %result.model_used,
        input_tokens = result.input_tokens,
        output_tokens = result.output_tokens,
        cost_usd = result.cost_usd,
        latency_ms,
        "Generation completed"
    );
    Ok(Json(render(result)))
}

/// POST /api/v1/generate
async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    AppJson(body): AppJson<GenerateBody>,
) -> Result<Json<GenerateResponse>, AppError> {
    let target = resolve_target(
        &state.config,
        body.provider.as_deref(),
        body.model.clone(),
        body.provider_hint.clone(),
    )?;
    let provider = state.provider(target.kind)?;
    let request = generation_request(body, &target);

    let started = Instant::now();
    let outcome = provider.generate_content(&request).await;
    finish(&state, &identity, &target, started, outcome)
}

/// POST /api/v1/generate/context
async fn generate_with_context(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    AppJson(body): AppJson<ContextGenerateBody>,
) -> Result<Json<GenerateResponse>, AppError> {
    let target = resolve_target(
        &state.config,
        body.provider.as_deref(),
        body.model.clone(),
        body.provider_hint.clone(),
    )?;
    let provider = state.provider(target.kind)?;
    let request = context_request(body, &target);

    let started = Instant::now();
    let outcome = provider.generate_with_context(&request).await;
    finish(&state, &identity, &target, started, outcome)
}

/// Build the generation router (nested under /api/v1)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate))
        .route("/generate/context", post(generate_with_context))
}
