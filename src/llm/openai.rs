use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
};

use super::{GenerateRequest, GenerateResponse, Provider};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    api_base: String,
    provider_name: String,
}

impl OpenAIProvider {
    pub fn new(api_key: &str) -> Self {
        Self::with_base(api_key, OPENAI_API_BASE, "openai")
    }

    pub fn new_google(api_key: &str) -> Self {
        Self::with_base(api_key, GOOGLE_API_BASE, "google")
    }

    pub fn new_ollama(base_url: &str) -> Self {
        Self::with_base("ollama", &format!("{base_url}/v1"), "ollama")
    }

    fn with_base(api_key: &str, api_base: &str, provider_name: &str) -> Self {
        Self {
            client: client_for(api_key, api_base),
            api_base: api_base.to_string(),
            provider_name: provider_name.to_string(),
        }
    }
}

fn client_for(api_key: &str, api_base: &str) -> Client<OpenAIConfig> {
    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base);
    Client::with_config(config)
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(req.system.clone()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(req.prompt.clone()),
                name: None,
            }),
        ];

        #[allow(deprecated)]
        let request = CreateChatCompletionRequest {
            model: req.model.clone(),
            messages,
            temperature: Some(req.temperature),
            max_completion_tokens: Some(req.max_tokens),
            ..Default::default()
        };

        // A session key overrides the configured one for this call only.
        let session_client;
        let client = match req.api_key.as_deref() {
            Some(key) if self.provider_name != "ollama" => {
                session_client = client_for(key, &self.api_base);
                &session_client
            }
            _ => &self.client,
        };

        let response = client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let finish_reason = response
            .choices
            .first()
            .and_then(|c| c.finish_reason)
            .map(|r| format!("{r:?}").to_lowercase())
            .unwrap_or_default();

        let (input_tokens, output_tokens) = match &response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (0, 0),
        };

        Ok(GenerateResponse {
            content,
            model: response.model,
            input_tokens,
            output_tokens,
            cost_usd: 0.0,
            finish_reason,
            provider: String::new(),
        })
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
