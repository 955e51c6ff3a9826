use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// A single-prompt generation request, validated before any upstream call.
#[derive(Debug, Clone, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 50000))]
    pub prompt: String,
    pub model_id: String,
    /// Upstream routing preference (OpenRouter `provider.order`).
    pub provider_hint: Option<String>,
    #[validate(length(max = 10000))]
    pub system_instruction: Option<String>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    #[validate(range(min = 1, max = 32768))]
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: model_id.into(),
            provider_hint: None,
            system_instruction: None,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_provider_hint(mut self, hint: Option<String>) -> Self {
        self.provider_hint = hint;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// A retrieval-augmented request: the user's message plus source text.
#[derive(Debug, Clone, Validate)]
pub struct ContextGenerationRequest {
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
    #[validate(length(min = 1, max = 100000))]
    pub context: String,
    pub model_id: String,
    pub provider_hint: Option<String>,
    /// Source names in citation order; `[1]` is the first entry.
    pub source_names: Vec<String>,
    pub persona_instructions: Option<String>,
}

impl ContextGenerationRequest {
    pub fn new(
        message: impl Into<String>,
        context: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            context: context.into(),
            model_id: model_id.into(),
            provider_hint: None,
            source_names: Vec::new(),
            persona_instructions: None,
        }
    }

    pub fn with_source_names(mut self, names: Vec<String>) -> Self {
        self.source_names = names;
        self
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona_instructions = persona;
        self
    }

    pub fn with_provider_hint(mut self, hint: Option<String>) -> Self {
        self.provider_hint = hint;
        self
    }
}

/// Outcome of one upstream generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// USD, rounded to 6 decimal places.
    pub cost_usd: f64,
    pub model_used: String,
    pub provider_label: String,
}

/// One entry of an upstream model listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub context_length: u64,
    /// Passed through from the upstream listing untouched.
    pub pricing: serde_json::Value,
    pub provider_name: String,
}

pub const DEFAULT_CONTEXT_LENGTH: u64 = 4096;
pub const UNKNOWN_PROVIDER_NAME: &str = "unknown";

impl ModelDescriptor {
    /// Build a descriptor, filling the documented defaults for absent fields.
    pub fn from_listing(
        id: String,
        display_name: Option<String>,
        context_length: Option<u64>,
        pricing: Option<serde_json::Value>,
        provider_name: Option<String>,
    ) -> Self {
        Self {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            context_length: context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH),
            pricing: match pricing {
                Some(serde_json::Value::Null) | None => serde_json::json!({}),
                Some(p) => p,
            },
            provider_name: provider_name.unwrap_or_else(|| UNKNOWN_PROVIDER_NAME.to_string()),
        }
    }
}
