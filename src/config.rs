use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Context;

use crate::pipeline::{PipelineSettings, SourcePolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub llm_provider: String,
    pub default_model: String,
    pub allowed_models: Vec<String>,
    pub fallback_provider: String,
    pub fallback_model: String,
    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
    pub default_temperature: f32,
    pub validation_max_tokens: u32,
    pub report_max_tokens: u32,
    pub llm_max_attempts: u32,
    pub word_limit: usize,
    pub max_sources: usize,
    pub source_policy: SourcePolicy,
    pub reprompt_on_overrun: bool,
    pub max_query_chars: usize,
    pub wikipedia_lang: String,
    pub wikipedia_results: u32,
    pub wikipedia_doc_max_chars: usize,
    pub wikipedia_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub session_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. `from_env` is the
    /// production entry point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_model = var("LLM_DEFAULT_MODEL", "gpt-4.1-mini");
        let mut allowed_models: Vec<String> =
            var("ALLOWED_MODELS", "gpt-4.1-mini,gpt-4.1,gpt-4,gpt-3.5-turbo")
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        if !allowed_models.contains(&default_model) {
            allowed_models.insert(0, default_model.clone());
        }

        let default_temperature: f32 = parse(&lookup, "DEFAULT_TEMPERATURE", "0.7")?;
        if !(0.0..=1.0).contains(&default_temperature) {
            anyhow::bail!("DEFAULT_TEMPERATURE must be between 0.0 and 1.0");
        }

        let llm_max_attempts: u32 = parse(&lookup, "LLM_MAX_ATTEMPTS", "1")?;
        if llm_max_attempts == 0 {
            anyhow::bail!("LLM_MAX_ATTEMPTS must be at least 1");
        }

        let max_sources: usize = parse(&lookup, "MAX_SOURCES", "5")?;
        if max_sources == 0 {
            anyhow::bail!("MAX_SOURCES must be at least 1");
        }

        Ok(Self {
            port: parse(&lookup, "APP_PORT", "8080")?,
            environment: var("APP_ENVIRONMENT", "development"),
            llm_provider: var("LLM_PROVIDER", "openai"),
            default_model,
            allowed_models,
            fallback_provider: var("FALLBACK_PROVIDER", "none"),
            fallback_model: var("FALLBACK_MODEL", "claude-haiku-4-5-20251001"),
            ollama_base_url: var("OLLAMA_BASE_URL", "http://localhost:11434"),
            openai_api_key: secret("OPENAI_API_KEY"),
            anthropic_api_key: secret("ANTHROPIC_API_KEY"),
            google_api_key: secret("GOOGLE_API_KEY"),
            otel_service_name: var("OTEL_SERVICE_NAME", "industry-report-assistant"),
            otel_exporter_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            default_temperature,
            validation_max_tokens: parse(&lookup, "VALIDATION_MAX_TOKENS", "10")?,
            report_max_tokens: parse(&lookup, "REPORT_MAX_TOKENS", "1024")?,
            llm_max_attempts,
            word_limit: parse(&lookup, "WORD_LIMIT", "500")?,
            max_sources,
            source_policy: parse(&lookup, "SOURCE_POLICY", "lenient")?,
            reprompt_on_overrun: parse(&lookup, "REPROMPT_ON_OVERRUN", "false")?,
            max_query_chars: parse(&lookup, "MAX_QUERY_CHARS", "200")?,
            wikipedia_lang: var("WIKIPEDIA_LANG", "en"),
            wikipedia_results: parse(&lookup, "WIKIPEDIA_RESULTS", "5")?,
            wikipedia_doc_max_chars: parse(&lookup, "WIKIPEDIA_DOC_MAX_CHARS", "4000")?,
            wikipedia_timeout_secs: parse(&lookup, "WIKIPEDIA_TIMEOUT_SECS", "20")?,
            session_ttl_secs: parse(&lookup, "SESSION_TTL_SECS", "3600")?,
            session_sweep_secs: parse(&lookup, "SESSION_SWEEP_SECS", "60")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// The server-side credential for the primary provider, if one is configured.
    /// Ollama needs no key, so it always reports a placeholder.
    pub fn server_api_key(&self) -> Option<String> {
        self.api_key_for(&self.llm_provider)
    }

    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        match provider {
            "anthropic" => self.anthropic_api_key.clone(),
            "google" => self.google_api_key.clone(),
            "ollama" => Some("ollama".to_string()),
            _ => self.openai_api_key.clone(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_sources: self.max_sources,
            source_policy: self.source_policy,
            word_limit: self.word_limit,
            reprompt_on_overrun: self.reprompt_on_overrun,
            validation_max_tokens: self.validation_max_tokens,
            report_max_tokens: self.report_max_tokens,
            max_query_chars: self.max_query_chars,
            allowed_models: self.allowed_models.clone(),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: &str) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.word_limit, 500);
        assert_eq!(config.max_sources, 5);
        assert_eq!(config.source_policy, SourcePolicy::Lenient);
        assert_eq!(config.llm_max_attempts, 1);
        assert_eq!(config.fallback_provider, "none");
        assert!(!config.reprompt_on_overrun);
        assert!((config.default_temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.allowed_models[0], "gpt-4.1-mini");
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("APP_PORT", "9000"),
            ("SOURCE_POLICY", "strict"),
            ("REPROMPT_ON_OVERRUN", "true"),
            ("ALLOWED_MODELS", " gpt-4 , gpt-3.5-turbo ,"),
            ("LLM_DEFAULT_MODEL", "gpt-4"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.source_policy, SourcePolicy::Strict);
        assert!(config.reprompt_on_overrun);
        assert_eq!(config.allowed_models, vec!["gpt-4", "gpt-3.5-turbo"]);
    }

    #[test]
    fn test_default_model_always_allowed() {
        let config = config_from(&[
            ("ALLOWED_MODELS", "gpt-4"),
            ("LLM_DEFAULT_MODEL", "gpt-4.1"),
        ])
        .unwrap();
        assert_eq!(config.allowed_models, vec!["gpt-4.1", "gpt-4"]);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = config_from(&[("MAX_SOURCES", "0")]).unwrap_err();
        assert!(err.to_string().contains("MAX_SOURCES"));
        let err = config_from(&[("LLM_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = config_from(&[("APP_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn test_temperature_out_of_range() {
        assert!(config_from(&[("DEFAULT_TEMPERATURE", "1.5")]).is_err());
    }

    #[test]
    fn test_blank_key_treated_as_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(config.server_api_key().is_none());
    }

    #[test]
    fn test_server_api_key_follows_provider() {
        let config = config_from(&[
            ("LLM_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", "sk-openai"),
        ])
        .unwrap();
        assert_eq!(config.server_api_key().as_deref(), Some("sk-ant"));

        let ollama = config_from(&[("LLM_PROVIDER", "ollama")]).unwrap();
        assert_eq!(ollama.server_api_key().as_deref(), Some("ollama"));
    }
}
