//! OpenAIプロバイダー実装

use crate::error::Result;
use crate::llm::{
    config::{ProviderConfig, ProviderKind},
    Completion, ProviderError, ProviderGateway, ProviderResult,
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Instant;

/// OpenAIプロバイダー
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    config: ProviderConfig,
}

impl OpenAIProvider {
    /// 新しいOpenAIプロバイダーを作成
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config.get_api_key().unwrap_or_default();
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);

        if config.kind == ProviderKind::AzureOpenAI {
            if let Some(endpoint) = &config.endpoint {
                openai_config = openai_config.with_api_base(endpoint);
            }
        }

        let client = Client::with_config(openai_config);

        Ok(Self { client, config })
    }

    /// APIエラーをゲートウェイのエラー分類に変換
    fn classify_error(err: OpenAIError) -> ProviderError {
        match err {
            OpenAIError::ApiError(api) => {
                let detail = format!("{:?} {:?}", api.code, api.r#type).to_lowercase();
                if detail.contains("invalid_api_key") || detail.contains("authentication") {
                    ProviderError::Auth(api.message)
                } else if detail.contains("insufficient_quota") || detail.contains("rate_limit") {
                    ProviderError::Quota(api.message)
                } else {
                    ProviderError::Transient(api.message)
                }
            }
            other => ProviderError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
impl ProviderGateway for OpenAIProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, prompt: &str, model_hint: Option<&str>) -> ProviderResult<Completion> {
        let started = Instant::now();
        let model = model_hint.unwrap_or(&self.config.model);

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let messages: Vec<ChatCompletionRequestMessage> = vec![message.into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(Self::classify_error)?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::Transient("No choices in response".to_string()))?;

        let tokens_used = response
            .usage
            .map(|u| u.total_tokens as usize)
            .unwrap_or_default();

        Ok(Completion {
            text,
            tokens_used,
            cost: tokens_used as f64 / 1000.0 * self.config.cost_per_1k_for(model),
            latency: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let config = ProviderConfig::openai("test-key", "gpt-4o-mini");
        let provider = OpenAIProvider::new(config).unwrap();
        assert_eq!(provider.name(), "openai:gpt-4o-mini");
    }

    #[test]
    fn test_provider_requires_api_key() {
        let mut config = ProviderConfig::openai("test-key", "gpt-4o-mini");
        config.api_key = None;
        assert!(OpenAIProvider::new(config).is_err());
    }
}
