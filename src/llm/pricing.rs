use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// USD per million tokens.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PriceEntry {
    #[allow(dead_code)]
    pub provider: String,
    pub input: f64,
    pub output: f64,
}

#[derive(Deserialize)]
struct PricingFile {
    models: HashMap<String, PriceEntry>,
}

const BUILTIN_PRICES: &[(&str, &str, f64, f64)] = &[
    ("gpt-4.1", "openai", 2.00, 8.00),
    ("gpt-4.1-mini", "openai", 0.40, 1.60),
    ("gpt-4", "openai", 30.00, 60.00),
    ("gpt-3.5-turbo", "openai", 0.50, 1.50),
    ("claude-haiku-4-5-20251001", "anthropic", 1.00, 5.00),
];

fn builtin_pricing() -> HashMap<String, PriceEntry> {
    BUILTIN_PRICES
        .iter()
        .map(|(model, provider, input, output)| {
            (
                model.to_string(),
                PriceEntry {
                    provider: provider.to_string(),
                    input: *input,
                    output: *output,
                },
            )
        })
        .collect()
}

/// Entries from `PRICING_JSON_PATH` are layered over the built-in table.
pub static PRICING: LazyLock<HashMap<String, PriceEntry>> = LazyLock::new(|| {
    let mut prices = builtin_pricing();
    let path = std::env::var("PRICING_JSON_PATH").unwrap_or_default();
    if path.is_empty() {
        return prices;
    }
    match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|data| Ok(serde_json::from_str::<PricingFile>(&data)?))
    {
        Ok(parsed) => prices.extend(parsed.models),
        Err(e) => tracing::warn!(path = %path, error = %e, "pricing file unreadable, using built-in prices"),
    }
    prices
});

pub fn calculate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    match PRICING.get(model) {
        Some(entry) => {
            (f64::from(input_tokens) * entry.input / 1_000_000.0)
                + (f64::from(output_tokens) * entry.output / 1_000_000.0)
        }
        None => 0.0,
    }
}

pub static PROVIDER_SERVERS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    HashMap::from([
        ("openai", "api.openai.com"),
        ("anthropic", "api.anthropic.com"),
        ("google", "generativelanguage.googleapis.com"),
        ("ollama", "localhost"),
    ])
});

pub static PROVIDER_PORTS: LazyLock<HashMap<&str, i64>> = LazyLock::new(|| {
    HashMap::from([
        ("openai", 443_i64),
        ("anthropic", 443),
        ("google", 443),
        ("ollama", 11434),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost_known_model() {
        assert!(PRICING.contains_key("gpt-4.1-mini"));
        let cost = calculate_cost("gpt-4.1-mini", 1_000_000, 1_000_000);
        assert!(cost > 0.0, "cost should be positive for known model");
    }

    #[test]
    fn test_builtin_table_covers_default_models() {
        let prices = builtin_pricing();
        for model in ["gpt-4.1", "gpt-4.1-mini", "gpt-4", "gpt-3.5-turbo"] {
            assert!(prices.contains_key(model), "{model} missing from price table");
        }
    }

    #[test]
    fn test_calculate_cost_unknown_model() {
        let cost = calculate_cost("nonexistent-model-xyz", 1000, 1000);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_calculate_cost_zero_tokens() {
        let cost = calculate_cost("gpt-4.1", 0, 0);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_provider_servers() {
        assert_eq!(PROVIDER_SERVERS.get("openai"), Some(&"api.openai.com"));
        assert_eq!(PROVIDER_SERVERS.get("ollama"), Some(&"localhost"));
        assert_eq!(PROVIDER_PORTS.get("ollama"), Some(&11434));
        assert_eq!(PROVIDER_PORTS.get("anthropic"), Some(&443));
    }
}
