//! Static per-model rates and the cost formula.

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Model whose rates are used when a model has no row of its own.
pub const DEFAULT_PRICED_MODEL: &str = "google/gemini-2.0-flash";

const fn rate(input_per_million: f64, output_per_million: f64) -> ModelRate {
    ModelRate {
        input_per_million,
        output_per_million,
    }
}

pub const PRICING_TABLE: &[(&str, ModelRate)] = &[
    ("anthropic/claude-3.5-sonnet", rate(3.0, 15.0)),
    ("anthropic/claude-3-opus", rate(15.0, 75.0)),
    ("openai/gpt-4", rate(30.0, 60.0)),
    ("openai/gpt-4-turbo", rate(10.0, 30.0)),
    ("google/gemini-2.0-flash", rate(0.10, 0.40)),
    ("google/gemini-2.5-flash", rate(0.15, 0.60)),
    ("google/gemini-2.5-pro", rate(1.25, 10.0)),
    ("meta/llama-3.1-70b", rate(0.70, 0.70)),
    ("zai/c3-7b", rate(0.05, 0.05)),
    ("zai/c3-13b", rate(0.10, 0.10)),
    ("zai/c3-40b", rate(0.50, 0.50)),
    // Native Gemini ids
    ("gemini-2.0-flash", rate(0.10, 0.40)),
    ("gemini-2.0-flash-lite", rate(0.075, 0.30)),
    ("gemini-2.5-flash", rate(0.15, 0.60)),
    ("gemini-2.5-pro", rate(1.25, 10.0)),
];

fn lookup(model_id: &str) -> Option<ModelRate> {
    PRICING_TABLE
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, rate)| *rate)
}

/// Rates for `model_id`, or the default model's rates when it is not listed.
pub fn rate_for(model_id: &str) -> ModelRate {
    lookup(model_id)
        .or_else(|| lookup(DEFAULT_PRICED_MODEL))
        .unwrap_or(rate(0.0, 0.0))
}

/// Cost in USD rounded to 6 decimal places.
pub fn calculate_cost(model_id: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let rate = rate_for(model_id);
    let raw = (input_tokens as f64 / 1_000_000.0) * rate.input_per_million
        + (output_tokens as f64 / 1_000_000.0) * rate.output_per_million;
    round_to_micros(raw)
}

fn round_to_micros(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let cost = calculate_cost("anthropic/claude-3.5-sonnet", 10, 20);
        assert_eq!(cost, 0.00033);

        let cost = calculate_cost("openai/gpt-4", 1_000_000, 1_000_000);
        assert_eq!(cost, 90.0);
    }

    #[test]
    fn zero_tokens_cost_exactly_zero() {
        for (model, _) in PRICING_TABLE {
            assert_eq!(calculate_cost(model, 0, 0), 0.0);
        }
        assert_eq!(calculate_cost("nobody/unknown", 0, 0), 0.0);
    }

    #[test]
    fn unknown_model_uses_default_rates() {
        for (i, o) in [(1, 1), (1_000, 2_000), (123_456, 7_890)] {
            assert_eq!(
                calculate_cost("nobody/unknown", i, o),
                calculate_cost(DEFAULT_PRICED_MODEL, i, o)
            );
        }
    }

    #[test]
    fn cost_is_monotonic_and_non_negative() {
        for (model, _) in PRICING_TABLE {
            let mut previous = 0.0;
            for tokens in [0u64, 1, 10, 1_000, 50_000, 1_000_000, 10_000_000] {
                let cost = calculate_cost(model, tokens, tokens);
                assert!(cost >= 0.0);
                assert!(cost >= previous, "{model} not monotonic at {tokens}");
                previous = cost;
            }
        }
    }

    #[test]
    fn cost_is_rounded_to_six_places() {
        // 1 token of input on the cheapest row is 5e-8 USD, which rounds away.
        assert_eq!(calculate_cost("zai/c3-7b", 1, 0), 0.0);
        let cost = calculate_cost("anthropic/claude-3-opus", 1_234, 567);
        assert_eq!(cost, round_to_micros(cost));
    }

    #[test]
    fn every_allowlisted_model_has_a_row() {
        use crate::gateway::validation::{GEMINI_MODELS, OPENROUTER_MODELS};
        for model in OPENROUTER_MODELS.iter().chain(GEMINI_MODELS) {
            assert!(lookup(model).is_some(), "{model} has no pricing row");
        }
    }
}
