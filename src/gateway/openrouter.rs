//! OpenRouter adapter: OpenAI-compatible chat completions plus model listing.

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use super::cache::ModelsCache;
use super::error::{GatewayError, UpstreamFailure};
use super::{pricing, validation, Provider, GENERATION_TIMEOUT, LISTING_TIMEOUT};
use crate::models::generation::{GenerationRequest, GenerationResult, ModelDescriptor};
use crate::models::provider::ProviderKind;

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sent as `HTTP-Referer`; OpenRouter uses it for app attribution.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
}

pub struct OpenRouterProvider {
    http: reqwest::Client,
    config: OpenRouterConfig,
    cache: ModelsCache,
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderRouting<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ProviderRouting<'a> {
    order: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
struct ListedModel {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<serde_json::Value>,
    #[serde(default)]
    provider: Option<ListedModelProvider>,
}

#[derive(Debug, Deserialize)]
struct ListedModelProvider {
    #[serde(default)]
    name: Option<String>,
}

// ── Provider ──────────────────────────────────────────────────────────

impl OpenRouterProvider {
    pub fn new(http: reqwest::Client, config: OpenRouterConfig, cache: ModelsCache) -> Self {
        Self {
            http,
            config,
            cache,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
    }

    async fn chat(&self, request: &GenerationRequest) -> Result<GenerationResult, UpstreamFailure> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_instruction.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let payload = ChatCompletionRequest {
            model: &request.model_id,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            provider: request
                .provider_hint
                .as_deref()
                .filter(|h| !h.is_empty())
                .map(|hint| ProviderRouting { order: [hint] }),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| UpstreamFailure::Malformed(format!("JSON serialization error: {e}")))?;

        let response = self
            .authorized(self.http.post(self.url("/chat/completions")))
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(GENERATION_TIMEOUT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let completion: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamFailure::Malformed(format!("invalid completion body: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamFailure::Malformed("completion has no choices".into()))?;

        let usage = completion.usage.unwrap_or_default();
        let input_tokens = usage.prompt_tokens.unwrap_or(0);
        let output_tokens = usage.completion_tokens.unwrap_or(0);

        Ok(GenerationResult {
            content: choice.message.content.unwrap_or_default(),
            input_tokens,
            output_tokens,
            cost_usd: pricing::calculate_cost(&request.model_id, input_tokens, output_tokens),
            model_used: request.model_id.clone(),
            provider_label: completion
                .provider
                .unwrap_or_else(|| ProviderKind::OpenRouter.as_str().to_string()),
        })
    }

    async fn list(&self) -> Result<Vec<ModelDescriptor>, UpstreamFailure> {
        let response = self
            .authorized(self.http.get(self.url("/models")))
            .timeout(LISTING_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let listing: ModelsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamFailure::Malformed(format!("invalid models body: {e}")))?;

        Ok(listing
            .data
            .into_iter()
            .filter_map(|m| {
                let id = m.id?;
                Some(ModelDescriptor::from_listing(
                    id,
                    m.name,
                    m.context_length,
                    m.pricing,
                    m.provider.and_then(|p| p.name),
                ))
            })
            .collect())
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn allowed_models(&self) -> &'static [&'static str] {
        validation::OPENROUTER_MODELS
    }

    fn models_cache(&self) -> &ModelsCache {
        &self.cache
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        self.chat(request)
            .await
            .map_err(|f| f.into_generation_error(ProviderKind::OpenRouter))
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        self.list()
            .await
            .map_err(|f| f.into_listing_error(ProviderKind::OpenRouter))
    }
}
