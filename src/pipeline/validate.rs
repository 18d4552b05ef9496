use opentelemetry::KeyValue;
use serde::Serialize;

use crate::llm::{GenerateRequest, LlmClient};
use crate::telemetry::metrics::INDUSTRY_VALIDATIONS;

use super::{IndustryQuery, ModelConfig};

const CLASSIFIER_SYSTEM: &str =
    "You classify whether a phrase names a real business industry or sector.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ValidationResult {
    Valid,
    Invalid,
    Error(String),
}

impl ValidationResult {
    fn outcome(&self) -> &'static str {
        match self {
            ValidationResult::Valid => "valid",
            ValidationResult::Invalid => "invalid",
            ValidationResult::Error(_) => "error",
        }
    }
}

pub(crate) fn classification_prompt(query: &IndustryQuery) -> String {
    format!("Is '{query}' a legitimate business industry or sector? Answer only 'Yes' or 'No'.")
}

/// Fail-closed: only an explicit "yes" token counts.
pub(crate) fn is_affirmative(answer: &str) -> bool {
    answer
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case("yes"))
}

#[tracing::instrument(
    name = "pipeline_stage validate",
    skip(llm_client, model, max_tokens),
    fields(
        pipeline.stage = "validate",
        industry = %query,
        validation.outcome,
    )
)]
pub async fn validate(
    llm_client: &LlmClient,
    query: &IndustryQuery,
    model: &ModelConfig,
    max_tokens: u32,
) -> ValidationResult {
    let result = llm_client
        .generate(&GenerateRequest {
            model: model.model.clone(),
            system: CLASSIFIER_SYSTEM.to_string(),
            prompt: classification_prompt(query),
            temperature: 0.0,
            max_tokens,
            stage: "validate".to_string(),
            api_key: model.api_key.clone(),
        })
        .await;

    let validation = match result {
        Ok(resp) if is_affirmative(&resp.content) => ValidationResult::Valid,
        Ok(resp) => {
            tracing::info!(answer = %resp.content.trim(), "industry judged invalid");
            ValidationResult::Invalid
        }
        Err(e) => ValidationResult::Error(e.to_string()),
    };

    tracing::Span::current().record("validation.outcome", validation.outcome());
    INDUSTRY_VALIDATIONS.add(1, &[KeyValue::new("validation.outcome", validation.outcome())]);

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, Provider};
    use std::sync::{Arc, Mutex};

    struct CannedProvider {
        answer: Result<&'static str, &'static str>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for CannedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.seen.lock().unwrap().push(req.clone());
            match self.answer {
                Ok(content) => Ok(GenerateResponse {
                    content: content.to_string(),
                    model: req.model.clone(),
                    input_tokens: 20,
                    output_tokens: 1,
                    cost_usd: 0.0,
                    finish_reason: "stop".to_string(),
                    provider: String::new(),
                }),
                Err(message) => Err(anyhow::anyhow!(message)),
            }
        }

        fn name(&self) -> &str {
            "openai"
        }
    }

    fn canned(answer: Result<&'static str, &'static str>) -> Arc<CannedProvider> {
        Arc::new(CannedProvider {
            answer,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn model() -> ModelConfig {
        ModelConfig {
            api_key: Some("sk-user".to_string()),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.7,
        }
    }

    #[test]
    fn test_affirmative_tokens() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative("yes."));
        assert!(is_affirmative("YES, it is."));
        assert!(is_affirmative("Answer: Yes"));
    }

    #[test]
    fn test_non_affirmative_fails_closed() {
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("Maybe"));
        assert!(!is_affirmative("Yesterday it was not"));
        assert!(!is_affirmative("eyes"));
    }

    #[test]
    fn test_prompt_shape() {
        let query = IndustryQuery::parse(" Fintech ", 200).unwrap();
        assert_eq!(
            classification_prompt(&query),
            "Is 'Fintech' a legitimate business industry or sector? Answer only 'Yes' or 'No'."
        );
    }

    #[tokio::test]
    async fn test_valid_answer() {
        let provider = canned(Ok("Yes."));
        let client = LlmClient::single(provider.clone());
        let query = IndustryQuery::parse("Fintech", 200).unwrap();

        let result = validate(&client, &query, &model(), 10).await;
        assert_eq!(result, ValidationResult::Valid);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_tokens, 10);
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].api_key.as_deref(), Some("sk-user"));
        assert_eq!(seen[0].stage, "validate");
    }

    #[tokio::test]
    async fn test_invalid_answer() {
        let client = LlmClient::single(canned(Ok("No")));
        let query = IndustryQuery::parse("hello", 200).unwrap();
        assert_eq!(
            validate(&client, &query, &model(), 10).await,
            ValidationResult::Invalid
        );
    }

    #[tokio::test]
    async fn test_provider_failure_is_error_not_invalid() {
        let client = LlmClient::single(canned(Err("401 unauthorized: invalid api key")));
        let query = IndustryQuery::parse("Fintech", 200).unwrap();
        match validate(&client, &query, &model(), 10).await {
            ValidationResult::Error(message) => assert!(message.contains("401")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_serialized_shape() {
        assert_eq!(
            serde_json::to_value(ValidationResult::Valid).unwrap(),
            serde_json::json!({"status": "valid"})
        );
        assert_eq!(
            serde_json::to_value(ValidationResult::Error("boom".into())).unwrap(),
            serde_json::json!({"status": "error", "message": "boom"})
        );
    }
}
