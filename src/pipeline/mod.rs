pub mod collect;
pub mod synthesize;
pub mod validate;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::llm::LlmClient;
use crate::sources::DocumentSource;

pub use collect::{Collection, SourceSet, collect};
pub use synthesize::{Report, count_words, synthesize};
pub use validate::{ValidationResult, validate};

/// How the collector's below-threshold result is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePolicy {
    /// One to `max_sources - 1` documents continue with a warning.
    Lenient,
    /// Anything short of `max_sources` documents fails the run.
    Strict,
}

impl FromStr for SourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown source policy {other:?}, expected lenient or strict")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_sources: usize,
    pub source_policy: SourcePolicy,
    pub word_limit: usize,
    pub reprompt_on_overrun: bool,
    pub validation_max_tokens: u32,
    pub report_max_tokens: u32,
    pub max_query_chars: usize,
    pub allowed_models: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_sources: 5,
            source_policy: SourcePolicy::Lenient,
            word_limit: 500,
            reprompt_on_overrun: false,
            validation_max_tokens: 10,
            report_max_tokens: 1024,
            max_query_chars: 200,
            allowed_models: vec![
                "gpt-4.1-mini".to_string(),
                "gpt-4.1".to_string(),
                "gpt-4".to_string(),
                "gpt-3.5-turbo".to_string(),
            ],
        }
    }
}

/// The collaborators and settings a session runs against.
#[derive(Clone)]
pub struct Pipeline {
    pub llm: Arc<LlmClient>,
    pub source: Arc<dyn DocumentSource>,
    pub settings: PipelineSettings,
}

/// A trimmed, non-empty industry name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IndustryQuery(String);

impl IndustryQuery {
    pub fn parse(raw: &str, max_chars: usize) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::Input(
                "Please enter an industry name.".to_string(),
            ));
        }
        if trimmed.chars().count() > max_chars {
            return Err(AppError::Input(format!(
                "Industry name must be at most {max_chars} characters."
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndustryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials, model choice and sampling temperature for one run.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ModelConfig {
    pub fn check(&self, allowed_models: &[String]) -> AppResult<()> {
        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(AppError::Input(
                "An API key is required before generating a report.".to_string(),
            ));
        }
        if !allowed_models.iter().any(|m| m == &self.model) {
            return Err(AppError::Input(format!(
                "Model {:?} is not available. Choose one of: {}.",
                self.model,
                allowed_models.join(", ")
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(AppError::Input(
                "Temperature must be between 0.0 and 1.0.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config() -> ModelConfig {
        ModelConfig {
            api_key: Some("sk-test".to_string()),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.7,
        }
    }

    #[test]
    fn test_query_is_trimmed() {
        let query = IndustryQuery::parse("  Renewable Energy \n", 200).unwrap();
        assert_eq!(query.as_str(), "Renewable Energy");
    }

    #[test]
    fn test_blank_queries_rejected() {
        for raw in ["", "   ", "\t\n", "\u{3000}"] {
            let err = IndustryQuery::parse(raw, 200).unwrap_err();
            assert!(matches!(err, AppError::Input(_)), "{raw:?}");
        }
    }

    #[test]
    fn test_overlong_query_rejected() {
        let raw = "x".repeat(201);
        assert!(matches!(
            IndustryQuery::parse(&raw, 200),
            Err(AppError::Input(_))
        ));
        assert!(IndustryQuery::parse(&"x".repeat(200), 200).is_ok());
    }

    #[test]
    fn test_model_config_complete() {
        let allowed = PipelineSettings::default().allowed_models;
        assert!(model_config().check(&allowed).is_ok());
    }

    #[test]
    fn test_model_config_missing_key() {
        let allowed = PipelineSettings::default().allowed_models;
        for api_key in [None, Some(String::new()), Some("  ".to_string())] {
            let config = ModelConfig {
                api_key,
                ..model_config()
            };
            assert!(matches!(config.check(&allowed), Err(AppError::Input(_))));
        }
    }

    #[test]
    fn test_model_config_unknown_model_and_temperature() {
        let allowed = PipelineSettings::default().allowed_models;
        let unknown = ModelConfig {
            model: "gpt-99".to_string(),
            ..model_config()
        };
        assert!(unknown.check(&allowed).is_err());

        let hot = ModelConfig {
            temperature: 1.2,
            ..model_config()
        };
        assert!(hot.check(&allowed).is_err());
    }

    #[test]
    fn test_model_config_debug_redacts_key() {
        let rendered = format!("{:?}", model_config());
        assert!(!rendered.contains("sk-test"));
    }

    #[test]
    fn test_source_policy_parse() {
        assert_eq!("strict".parse::<SourcePolicy>(), Ok(SourcePolicy::Strict));
        assert_eq!("Lenient".parse::<SourcePolicy>(), Ok(SourcePolicy::Lenient));
        assert!("sometimes".parse::<SourcePolicy>().is_err());
    }
}
