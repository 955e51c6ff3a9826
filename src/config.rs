use std::env;

use crate::gateway::cache::DEFAULT_MODELS_TTL;
use crate::models::provider::ProviderKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub admin_key: String,
    pub listen_addr: String,
    /// `None` when `GOOGLE_API_KEY` is unset or empty.
    pub google_api_key: Option<String>,
    /// `None` when `OPENROUTER_API_KEY` is unset or empty.
    pub openrouter_api_key: Option<String>,
    pub default_provider: ProviderKind,
    pub openrouter_default_model: String,
    pub gemini_default_model: String,
    /// Preferred upstream behind OpenRouter, sent as `provider.order`.
    pub openrouter_provider: Option<String>,
    pub openrouter_base_url: String,
    pub gemini_base_url: String,
    pub app_referer: String,
    pub app_title: String,
    pub models_cache_ttl_secs: u64,
    /// Requests per minute per client on the provider endpoints.
    pub rate_limit_per_minute: u32,
    /// Requests per minute per client on the generation endpoints.
    pub generate_rate_limit_per_minute: u32,
    /// Number of days to retain usage records. 0 = keep forever.
    pub usage_retention_days: u32,
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Retention is passed to Postgres as an `int4` day count.
fn retention_days(days: u32) -> anyhow::Result<u32> {
    if i32::try_from(days).is_err() {
        anyhow::bail!("USAGE_RETENTION_DAYS must be at most {}, got {days}", i32::MAX);
    }
    Ok(days)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let default_provider = match optional_env("DEFAULT_LLM_PROVIDER") {
            Some(v) => ProviderKind::from_str(&v).ok_or_else(|| {
                anyhow::anyhow!("DEFAULT_LLM_PROVIDER must be \"google\" or \"openrouter\", got {v:?}")
            })?,
            None => ProviderKind::Google,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            admin_key: env::var("ADMIN_KEY")
                .map_err(|_| anyhow::anyhow!("ADMIN_KEY is required"))?,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            google_api_key: optional_env("GOOGLE_API_KEY"),
            openrouter_api_key: optional_env("OPENROUTER_API_KEY"),
            default_provider,
            openrouter_default_model: optional_env("OPENROUTER_DEFAULT_MODEL")
                .unwrap_or_else(|| "anthropic/claude-3.5-sonnet".into()),
            gemini_default_model: optional_env("GEMINI_DEFAULT_MODEL")
                .unwrap_or_else(|| "gemini-2.0-flash".into()),
            openrouter_provider: optional_env("OPENROUTER_PROVIDER"),
            openrouter_base_url: optional_env("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| ProviderKind::OpenRouter.default_base_url().into()),
            gemini_base_url: optional_env("GEMINI_BASE_URL")
                .unwrap_or_else(|| ProviderKind::Google.default_base_url().into()),
            app_referer: optional_env("APP_REFERER")
                .unwrap_or_else(|| "https://notebooklm-api.vercel.app".into()),
            app_title: optional_env("APP_TITLE").unwrap_or_else(|| "NotebookLM Reimagined".into()),
            models_cache_ttl_secs: parse_env("MODELS_CACHE_TTL_SECS", DEFAULT_MODELS_TTL.as_secs()),
            rate_limit_per_minute: parse_env("RATE_LIMIT_PER_MINUTE", 10),
            generate_rate_limit_per_minute: parse_env("GENERATE_RATE_LIMIT_PER_MINUTE", 30),
            usage_retention_days: retention_days(parse_env("USAGE_RETENTION_DAYS", 30))?,
        })
    }

    pub fn default_model(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Google => &self.gemini_default_model,
            ProviderKind::OpenRouter => &self.openrouter_default_model,
        }
    }

    /// Routing hint applied when the caller does not supply one.
    pub fn default_provider_hint(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::OpenRouter => self.openrouter_provider.clone(),
            ProviderKind::Google => None,
        }
    }
}

#[cfg(test)]
impl Config {
    /// A config that points nowhere; for tests that never touch the network.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379".into(),
            admin_key: "admin-secret".into(),
            listen_addr: "127.0.0.1:0".into(),
            google_api_key: None,
            openrouter_api_key: Some("or-key".into()),
            default_provider: ProviderKind::OpenRouter,
            openrouter_default_model: "anthropic/claude-3.5-sonnet".into(),
            gemini_default_model: "gemini-2.0-flash".into(),
            openrouter_provider: Some("anthropic".into()),
            openrouter_base_url: ProviderKind::OpenRouter.default_base_url().into(),
            gemini_base_url: ProviderKind::Google.default_base_url().into(),
            app_referer: "https://notebook.example".into(),
            app_title: "Notebook".into(),
            models_cache_ttl_secs: 3600,
            rate_limit_per_minute: 10,
            generate_rate_limit_per_minute: 30,
            usage_retention_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_days_must_fit_postgres_int() {
        assert_eq!(retention_days(0).unwrap(), 0);
        assert_eq!(retention_days(30).unwrap(), 30);
        assert!(retention_days(i32::MAX as u32 + 1).is_err());
    }

    #[test]
    fn default_model_and_hint_per_provider() {
        let config = Config::for_tests();
        assert_eq!(config.default_model(ProviderKind::OpenRouter), "anthropic/claude-3.5-sonnet");
        assert_eq!(config.default_model(ProviderKind::Google), "gemini-2.0-flash");
        assert_eq!(
            config.default_provider_hint(ProviderKind::OpenRouter).as_deref(),
            Some("anthropic")
        );
        assert_eq!(config.default_provider_hint(ProviderKind::Google), None);
    }
}
