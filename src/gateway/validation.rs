//! Structural and allowlist checks run before any upstream call.

use validator::Validate;

use super::error::GatewayError;
use crate::models::generation::{ContextGenerationRequest, GenerationRequest};
use crate::models::provider::ProviderKind;

/// Models that may be forwarded to OpenRouter.
pub const OPENROUTER_MODELS: &[&str] = &[
    "anthropic/claude-3.5-sonnet",
    "anthropic/claude-3-opus",
    "openai/gpt-4",
    "openai/gpt-4-turbo",
    "google/gemini-2.0-flash",
    "google/gemini-2.5-flash",
    "google/gemini-2.5-pro",
    "meta/llama-3.1-70b",
    "zai/c3-7b",
    "zai/c3-13b",
    "zai/c3-40b",
];

/// Models that may be forwarded to the native Gemini API.
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
];

pub fn allowed_models(kind: ProviderKind) -> &'static [&'static str] {
    match kind {
        ProviderKind::Google => GEMINI_MODELS,
        ProviderKind::OpenRouter => OPENROUTER_MODELS,
    }
}

pub fn validate_generation(
    request: &GenerationRequest,
    allowed: &[&str],
) -> Result<(), GatewayError> {
    check_structure(request)?;
    if !request.temperature.is_finite() {
        return Err(GatewayError::Validation);
    }
    ensure_allowed(&request.model_id, allowed)
}

pub fn validate_context_generation(
    request: &ContextGenerationRequest,
    allowed: &[&str],
) -> Result<(), GatewayError> {
    check_structure(request)?;
    ensure_allowed(&request.model_id, allowed)
}

fn check_structure<T: Validate>(request: &T) -> Result<(), GatewayError> {
    request.validate().map_err(|errors| {
        // Field names only; never the rejected values.
        let fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        tracing::debug!("Rejected request, invalid fields: {:?}", fields);
        GatewayError::Validation
    })
}

fn ensure_allowed(model_id: &str, allowed: &[&str]) -> Result<(), GatewayError> {
    if allowed.contains(&model_id) {
        Ok(())
    } else {
        tracing::warn!("Rejected unauthorized model: {}", model_id);
        Err(GatewayError::UnauthorizedModel(model_id.to_string()))
    }
}
