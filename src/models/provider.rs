use serde::{Deserialize, Serialize};

/// Supported upstream LLM vendors.
/// OpenRouter speaks the OpenAI chat completions format; Google speaks the
/// Gemini `generateContent` format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::OpenRouter];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Some(ProviderKind::Google),
            "openrouter" => Some(ProviderKind::OpenRouter),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google Gemini",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Native Gemini API",
            ProviderKind::OpenRouter => "Access to 100+ LLM providers via unified API",
        }
    }

    /// Default base URL for each provider kind.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Name of the environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Google => "GOOGLE_API_KEY",
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!(ProviderKind::from_str("OpenRouter"), Some(ProviderKind::OpenRouter));
        assert_eq!(ProviderKind::from_str(" gemini "), Some(ProviderKind::Google));
        assert_eq!(ProviderKind::from_str("anthropic"), None);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ProviderKind::OpenRouter).unwrap();
        assert_eq!(json, "\"openrouter\"");
        let kind: ProviderKind = serde_json::from_str("\"google\"").unwrap();
        assert_eq!(kind, ProviderKind::Google);
    }
}
