//! Token usage estimation and cost tracking.
//!
//! A read-mostly side channel: recording failures are logged and never
//! block or alter the user-facing response.

use std::sync::Arc;

use crate::store::Store;

/// Rough token estimate: 1 token per 4 characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Price per million tokens, input and output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const FREE: ModelPrice = ModelPrice {
        input_per_million: 0.0,
        output_per_million: 0.0,
    };
}

/// Static price table. CLI and local models, and anything unknown, are
/// priced at zero.
pub fn price_for(model: &str) -> ModelPrice {
    match model {
        "anthropic/claude-sonnet-4" => ModelPrice {
            input_per_million: 3.0,
            output_per_million: 15.0,
        },
        "anthropic/claude-3.5-haiku" => ModelPrice {
            input_per_million: 0.8,
            output_per_million: 4.0,
        },
        "openai/gpt-4o" => ModelPrice {
            input_per_million: 2.5,
            output_per_million: 10.0,
        },
        "openai/gpt-4o-mini" => ModelPrice {
            input_per_million: 0.15,
            output_per_million: 0.6,
        },
        "google/gemini-2.0-flash-001" => ModelPrice {
            input_per_million: 0.1,
            output_per_million: 0.4,
        },
        _ => ModelPrice::FREE,
    }
}

/// Estimated cost in dollars for one call.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let price = price_for(model);
    (input_tokens as f64 * price.input_per_million
        + output_tokens as f64 * price.output_per_million)
        / 1_000_000.0
}

/// Records estimated per-call token counts and cost.
pub struct TokenUsageTracker {
    store: Option<Arc<Store>>,
}

impl TokenUsageTracker {
    pub fn new(store: Option<Arc<Store>>) -> Self {
        Self { store }
    }

    /// Record one completed call. Best effort: failures are logged only.
    pub fn record(&self, agent: &str, provider: &str, model: &str, prompt: &str, response: &str) {
        let input_tokens = estimate_tokens(prompt);
        let output_tokens = estimate_tokens(response);
        let cost = estimate_cost(model, input_tokens, output_tokens);

        tracing::debug!(
            "Usage for {} via {}/{}: ~{} in, ~{} out, ${:.6}",
            agent,
            provider,
            model,
            input_tokens,
            output_tokens,
            cost
        );

        if let Some(store) = &self.store {
            if let Err(e) =
                store.record_usage(agent, provider, model, input_tokens, output_tokens, cost)
            {
                tracing::warn!("Failed to record token usage: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn unknown_and_local_models_cost_nothing() {
        assert_eq!(price_for("sonnet"), ModelPrice::FREE);
        assert_eq!(price_for("llama3.2"), ModelPrice::FREE);
        assert_eq!(estimate_cost("llama3.2", 1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn priced_model_costs_scale_with_tokens() {
        let cost = estimate_cost("anthropic/claude-sonnet-4", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn recording_without_store_does_not_panic() {
        let tracker = TokenUsageTracker::new(None);
        tracker.record("general", "claude", "sonnet", "hello", "world");
    }
}
