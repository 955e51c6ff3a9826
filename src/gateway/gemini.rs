//! Native Gemini adapter (`generateContent` REST API).

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use super::cache::ModelsCache;
use super::error::{GatewayError, UpstreamFailure};
use super::{pricing, validation, Provider, GENERATION_TIMEOUT, LISTING_TIMEOUT};
use crate::models::generation::{GenerationRequest, GenerationResult, ModelDescriptor};
use crate::models::provider::ProviderKind;

const API_KEY_HEADER: &str = "x-goog-api-key";
const LISTING_PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

pub struct GeminiProvider {
    http: reqwest::Client,
    config: GeminiConfig,
    cache: ModelsCache,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, config: GeminiConfig, cache: ModelsCache) -> Self {
        Self {
            http,
            config,
            cache,
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, UpstreamFailure> {
        let payload = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request
                .system_instruction
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|text| SystemInstruction {
                    parts: [Part { text }],
                }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| UpstreamFailure::Malformed(format!("JSON serialization error: {e}")))?;

        let url = format!("{}/models/{}:generateContent", self.base(), request.model_id);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
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
        let parsed: GenerateContentResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamFailure::Malformed(format!("invalid generateContent body: {e}")))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamFailure::Malformed("response has no candidates".into()))?;
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let usage = parsed.usage_metadata.unwrap_or_default();
        let input_tokens = usage.prompt_token_count.unwrap_or(0);
        let output_tokens = usage.candidates_token_count.unwrap_or(0);

        Ok(GenerationResult {
            content,
            input_tokens,
            output_tokens,
            cost_usd: pricing::calculate_cost(&request.model_id, input_tokens, output_tokens),
            model_used: request.model_id.clone(),
            provider_label: ProviderKind::Google.as_str().to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<ModelDescriptor>, UpstreamFailure> {
        let response = self
            .http
            .get(format!("{}/models", self.base()))
            .header(API_KEY_HEADER, &self.config.api_key)
            .query(&[("pageSize", LISTING_PAGE_SIZE)])
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
        let listing: ListModelsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamFailure::Malformed(format!("invalid models body: {e}")))?;

        Ok(listing
            .models
            .into_iter()
            .filter_map(|m| {
                let name = m.name?;
                let id = name.strip_prefix("models/").unwrap_or(&name).to_string();
                Some(ModelDescriptor::from_listing(
                    id,
                    m.display_name,
                    m.input_token_limit,
                    None,
                    Some(ProviderKind::Google.as_str().to_string()),
                ))
            })
            .collect())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn allowed_models(&self) -> &'static [&'static str] {
        validation::GEMINI_MODELS
    }

    fn models_cache(&self) -> &ModelsCache {
        &self.cache
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        self.generate(request)
            .await
            .map_err(|f| f.into_generation_error(ProviderKind::Google))
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        self.list()
            .await
            .map_err(|f| f.into_listing_error(ProviderKind::Google))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::cache::DEFAULT_MODELS_TTL;
    use crate::models::generation::ContextGenerationRequest;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(base_url: String) -> GeminiProvider {
        GeminiProvider::new(
            reqwest::Client::new(),
            GeminiConfig {
                api_key: "gemini-test-key".into(),
                base_url,
            },
            ModelsCache::new(DEFAULT_MODELS_TTL),
        )
    }

    fn generate_response() -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "there" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 1000, "candidatesTokenCount": 2000, "totalTokenCount": 3000 }
        })
    }

    #[tokio::test]
    async fn generates_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "gemini-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_response()))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("Hi", "gemini-2.0-flash")
            .with_system_instruction("Be kind.")
            .with_max_output_tokens(100);
        let result = provider_for(server.uri()).generate_content(&request).await.unwrap();

        assert_eq!(result.content, "Hello there");
        assert_eq!(result.input_tokens, 1000);
        assert_eq!(result.output_tokens, 2000);
        assert_eq!(result.cost_usd, calculate_expected(1000, 2000));
        assert_eq!(result.provider_label, "google");

        let sent = &server.received_requests().await.unwrap()[0];
        let body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
    }

    fn calculate_expected(input: u64, output: u64) -> f64 {
        pricing::calculate_cost("gemini-2.0-flash", input, output)
    }

    #[tokio::test]
    async fn openrouter_ids_are_not_authorized_here() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_response()))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider_for(server.uri())
            .generate_content(&GenerationRequest::new("Hi", "anthropic/claude-3.5-sonnet"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::UnauthorizedModel("anthropic/claude-3.5-sonnet".into())
        );
    }

    #[tokio::test]
    async fn rate_limited_upstream_is_generation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({ "error": { "code": 429, "message": "Quota exceeded for project 1234" } })),
            )
            .mount(&server)
            .await;

        let err = provider_for(server.uri())
            .generate_content(&GenerationRequest::new("Hi", "gemini-2.5-pro"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::GenerationFailed);
        assert!(!err.to_string().contains("1234"));
    }

    #[tokio::test]
    async fn context_generation_uses_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_response()))
            .mount(&server)
            .await;

        let request = ContextGenerationRequest::new("Why?", "Because.", "gemini-2.5-flash")
            .with_source_names(vec!["Notes".into()]);
        provider_for(server.uri())
            .generate_with_context(&request)
            .await
            .unwrap();

        let sent = &server.received_requests().await.unwrap()[0];
        let body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("[1] Source: Notes"));
        let system = body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(system.starts_with("You are a helpful research assistant."));
    }

    #[tokio::test]
    async fn lists_models_without_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(query_param("pageSize", "1000"))
            .and(header("x-goog-api-key", "gemini-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    { "name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash", "inputTokenLimit": 1048576 },
                    { "name": "models/embedding-001" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(server.uri());
        let models = provider.available_models(false).await.unwrap();
        provider.available_models(false).await.unwrap();

        assert_eq!(models[0].id, "gemini-2.0-flash");
        assert_eq!(models[0].display_name, "Gemini 2.0 Flash");
        assert_eq!(models[0].context_length, 1_048_576);
        assert_eq!(models[0].provider_name, "google");
        assert_eq!(models[1].id, "embedding-001");
        assert_eq!(models[1].context_length, 4096);
    }
}
