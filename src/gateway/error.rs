use crate::models::provider::ProviderKind;

/// Errors surfaced by the provider gateway.
///
/// The display strings are fixed and safe to return to API callers. The
/// underlying cause is logged where an [`UpstreamFailure`] is translated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request parameters")]
    Validation,

    #[error("Model '{0}' is not authorized")]
    UnauthorizedModel(String),

    #[error("Content generation failed. Please try again later.")]
    GenerationFailed,

    #[error("Failed to connect to content generation service.")]
    Connectivity,

    #[error("An unexpected error occurred during content generation.")]
    Unexpected,

    /// Refreshing a models listing failed. Carries the raw cause; not for callers.
    #[error("Model listing failed: {0}")]
    ModelListing(String),
}

/// What actually went wrong talking to an upstream provider.
#[derive(Debug)]
pub enum UpstreamFailure {
    /// Non-2xx status; `body` is kept for the log only.
    Status { status: u16, body: String },
    /// Timeout, DNS, refused or reset connection.
    Transport(String),
    /// Anything else: bad request construction, undecodable body, empty choices.
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() || e.is_decode() {
            UpstreamFailure::Malformed(e.to_string())
        } else {
            UpstreamFailure::Transport(e.to_string())
        }
    }
}

const LOGGED_BODY_LIMIT: usize = 512;

fn truncate_for_log(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

impl UpstreamFailure {
    /// Translate a generation failure into the sanitized taxonomy, logging the cause.
    pub fn into_generation_error(self, provider: ProviderKind) -> GatewayError {
        match self {
            UpstreamFailure::Status { status, body } => {
                tracing::error!(
                    "{} generation returned HTTP {}: {}",
                    provider,
                    status,
                    truncate_for_log(&body)
                );
                GatewayError::GenerationFailed
            }
            UpstreamFailure::Transport(detail) => {
                tracing::error!("{} generation request failed: {}", provider, detail);
                GatewayError::Connectivity
            }
            UpstreamFailure::Malformed(detail) => {
                tracing::error!("{} generation failed unexpectedly: {}", provider, detail);
                GatewayError::Unexpected
            }
        }
    }

    /// Translate a listing failure. The detail is kept for internal propagation.
    pub fn into_listing_error(self, provider: ProviderKind) -> GatewayError {
        let detail = match self {
            UpstreamFailure::Status { status, body } => {
                format!("HTTP {}: {}", status, truncate_for_log(&body))
            }
            UpstreamFailure::Transport(detail) | UpstreamFailure::Malformed(detail) => detail,
        };
        tracing::error!("{} model listing failed: {}", provider, detail);
        GatewayError::ModelListing(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_hides_upstream_body() {
        let err = UpstreamFailure::Status {
            status: 401,
            body: "Unauthorized: Invalid API key sk-live-123".into(),
        }
        .into_generation_error(ProviderKind::OpenRouter);

        assert_eq!(err, GatewayError::GenerationFailed);
        let msg = err.to_string();
        assert_eq!(msg, "Content generation failed. Please try again later.");
        assert!(!msg.contains("401"));
        assert!(!msg.contains("Invalid API key"));
    }

    #[test]
    fn transport_failure_hides_detail() {
        let err = UpstreamFailure::Transport("Connection timeout".into())
            .into_generation_error(ProviderKind::Google);
        assert_eq!(err, GatewayError::Connectivity);
        assert!(!err.to_string().to_lowercase().contains("timeout"));
    }

    #[test]
    fn malformed_maps_to_unexpected() {
        let err = UpstreamFailure::Malformed("expected value at line 1".into())
            .into_generation_error(ProviderKind::OpenRouter);
        assert_eq!(
            err.to_string(),
            "An unexpected error occurred during content generation."
        );
    }

    #[test]
    fn listing_failure_keeps_detail() {
        let err = UpstreamFailure::Status { status: 500, body: "boom".into() }
            .into_listing_error(ProviderKind::OpenRouter);
        assert_eq!(err, GatewayError::ModelListing("HTTP 500: boom".into()));
    }

    #[test]
    fn unauthorized_model_names_only_the_model() {
        let err = GatewayError::UnauthorizedModel("evil/model".into());
        assert_eq!(err.to_string(), "Model 'evil/model' is not authorized");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(LOGGED_BODY_LIMIT + 10);
        assert_eq!(truncate_for_log(&body).chars().count(), LOGGED_BODY_LIMIT);
    }
}
