pub mod anthropic;
pub mod client;
pub mod openai;
pub mod pricing;

use std::fmt;
use std::sync::Arc;

pub use client::LlmClient;

#[derive(Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stage: String,
    /// Per-session credential. Providers fall back to their configured key when unset.
    pub api_key: Option<String>,
}

impl fmt::Debug for GenerateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateRequest")
            .field("model", &self.model)
            .field("system", &self.system)
            .field("prompt", &self.prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stage", &self.stage)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub provider: String,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}

/// Builds a provider by name. Unknown names resolve to OpenAI; `"none"` yields nothing.
pub fn build_provider(
    name: &str,
    api_key: Option<&str>,
    ollama_base_url: &str,
) -> Option<Arc<dyn Provider>> {
    let key = api_key.unwrap_or("");
    let provider: Arc<dyn Provider> = match name {
        "none" | "" => return None,
        "anthropic" => Arc::new(anthropic::AnthropicProvider::new(key)),
        "google" => Arc::new(openai::OpenAIProvider::new_google(key)),
        "ollama" => Arc::new(openai::OpenAIProvider::new_ollama(ollama_base_url)),
        _ => Arc::new(openai::OpenAIProvider::new(key)),
    };
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let req = GenerateRequest {
            model: "gpt-4.1-mini".to_string(),
            system: String::new(),
            prompt: "hi".to_string(),
            temperature: 0.0,
            max_tokens: 10,
            stage: "validate".to_string(),
            api_key: Some("sk-secret-value".to_string()),
        };
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_build_provider_names() {
        let url = "http://localhost:11434";
        assert!(build_provider("none", None, url).is_none());
        assert_eq!(
            build_provider("anthropic", Some("k"), url).unwrap().name(),
            "anthropic"
        );
        assert_eq!(build_provider("google", Some("k"), url).unwrap().name(), "google");
        assert_eq!(build_provider("ollama", None, url).unwrap().name(), "ollama");
        assert_eq!(build_provider("openai", Some("k"), url).unwrap().name(), "openai");
        assert_eq!(build_provider("mystery", Some("k"), url).unwrap().name(), "openai");
    }
}
