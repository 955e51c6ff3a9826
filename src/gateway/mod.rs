//! Provider gateway: validation, pricing, prompt assembly, model listing
//! cache, and the per-vendor HTTP adapters behind one [`Provider`] trait.

pub mod cache;
pub mod error;
pub mod gemini;
pub mod openrouter;
pub mod pricing;
pub mod prompt;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::models::generation::{
    ContextGenerationRequest, GenerationRequest, GenerationResult, ModelDescriptor,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE,
};
use crate::models::provider::ProviderKind;
use cache::{ModelSnapshot, ModelsCache};
use error::GatewayError;

pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// An upstream LLM vendor.
///
/// Implementors supply the raw upstream calls (`complete`, `fetch_models`);
/// validation, prompt assembly and caching are shared by the provided methods.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn allowed_models(&self) -> &'static [&'static str];

    fn models_cache(&self) -> &ModelsCache;

    /// Issue one upstream call for a request that already passed validation.
    async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError>;

    /// List models straight from the upstream, bypassing the cache.
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError>;

    async fn generate_content(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        validation::validate_generation(request, self.allowed_models())?;
        self.complete(request).await
    }

    async fn generate_with_context(
        &self,
        request: &ContextGenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        validation::validate_context_generation(request, self.allowed_models())?;

        let rag = prompt::assemble(
            &request.message,
            &request.context,
            &request.source_names,
            request.persona_instructions.as_deref(),
        );
        // The assembled prompt may legitimately exceed the single-prompt
        // bounds (context alone allows 100k chars), so skip re-validation.
        let delegated = GenerationRequest {
            prompt: rag.prompt,
            model_id: request.model_id.clone(),
            provider_hint: request.provider_hint.clone(),
            system_instruction: Some(rag.system_instruction),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        };
        self.complete(&delegated).await
    }

    async fn available_models(&self, force_refresh: bool) -> Result<ModelSnapshot, GatewayError> {
        self.models_cache()
            .get_or_refresh(force_refresh, || self.fetch_models())
            .await
    }

    async fn clear_models_cache(&self) {
        self.models_cache().clear().await;
    }
}

/// The configured providers, keyed by kind.
#[derive(Clone, Default)]
pub struct Gateway {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Build a provider for every vendor that has an API key configured.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let ttl = Duration::from_secs(config.models_cache_ttl_secs);
        let mut gateway = Self::new();

        if let Some(key) = &config.openrouter_api_key {
            gateway = gateway.with_provider(Arc::new(openrouter::OpenRouterProvider::new(
                http.clone(),
                openrouter::OpenRouterConfig {
                    api_key: key.clone(),
                    base_url: config.openrouter_base_url.clone(),
                    referer: config.app_referer.clone(),
                    title: config.app_title.clone(),
                },
                ModelsCache::new(ttl),
            )));
        }

        if let Some(key) = &config.google_api_key {
            gateway = gateway.with_provider(Arc::new(gemini::GeminiProvider::new(
                http,
                gemini::GeminiConfig {
                    api_key: key.clone(),
                    base_url: config.gemini_base_url.clone(),
                },
                ModelsCache::new(ttl),
            )));
        }

        for kind in ProviderKind::ALL {
            if gateway.is_configured(kind) {
                tracing::info!("Provider {} configured", kind);
            } else {
                tracing::warn!("Provider {} not configured ({} is empty)", kind, kind.api_key_env());
            }
        }

        gateway
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub async fn clear_all_caches(&self) {
        for provider in self.providers.values() {
            provider.clear_models_cache().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what reaches the upstream without doing any I/O.
    struct RecordingProvider {
        cache: ModelsCache,
        sent: Mutex<Vec<GenerationRequest>>,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self {
                cache: ModelsCache::new(cache::DEFAULT_MODELS_TTL),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<GenerationRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenRouter
        }

        fn allowed_models(&self) -> &'static [&'static str] {
            validation::OPENROUTER_MODELS
        }

        fn models_cache(&self) -> &ModelsCache {
            &self.cache
        }

        async fn complete(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResult, GatewayError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(GenerationResult {
                content: "ok".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                model_used: request.model_id.clone(),
                provider_label: "openrouter".into(),
            })
        }

        async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_upstream() {
        let provider = RecordingProvider::new();

        let err = provider
            .generate_content(&GenerationRequest::new("hi", "not/allowed"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::UnauthorizedModel("not/allowed".into()));

        let err = provider
            .generate_content(&GenerationRequest::new("", "openai/gpt-4"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Validation);

        let err = provider
            .generate_with_context(&ContextGenerationRequest::new("q", "ctx", "not/allowed"))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::UnauthorizedModel("not/allowed".into()));

        assert!(provider.sent().is_empty());
    }

    #[tokio::test]
    async fn context_generation_delegates_assembled_prompt() {
        let provider = RecordingProvider::new();
        let request = ContextGenerationRequest::new("What is it?", "c".repeat(100_000), "openai/gpt-4")
            .with_source_names(vec!["Doc 1".into(), "Doc 2".into()])
            .with_persona(Some("Be brief.".into()))
            .with_provider_hint(Some("openai".into()));

        provider.generate_with_context(&request).await.unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        let delegated = &sent[0];
        assert!(delegated.prompt.chars().count() > 50_000);
        assert!(delegated.prompt.contains("[1] Source: Doc 1\n[2] Source: Doc 2"));
        assert!(delegated.prompt.ends_with("User Question: What is it?\n\nProvide a well-cited response:"));
        let system = delegated.system_instruction.as_deref().unwrap();
        assert!(system.starts_with("Be brief.\n\n"));
        assert!(system.contains("[1], [2]"));
        assert_eq!(delegated.provider_hint.as_deref(), Some("openai"));
        assert_eq!(delegated.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(delegated.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn gateway_reports_configured_providers() {
        let gateway = Gateway::new().with_provider(Arc::new(RecordingProvider::new()));
        assert!(gateway.is_configured(ProviderKind::OpenRouter));
        assert!(!gateway.is_configured(ProviderKind::Google));
        assert!(gateway.get(ProviderKind::Google).is_none());
    }
}
