//! プロバイダー接続設定

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// プロバイダー種別
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI (GPT-4o など)
    OpenAI,
    /// Azure OpenAI
    AzureOpenAI,
}

/// プロバイダー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 表示名（ログと出典表示に使用）
    pub name: String,
    /// プロバイダー種別
    pub kind: ProviderKind,
    /// APIキー（セキュア）
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,
    /// APIエンドポイント（Azure時）
    pub endpoint: Option<String>,
    /// モデル名
    pub model: String,
    /// 温度
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 最大出力トークン数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 1Kトークンあたりのコスト（USD）。未指定ならモデル名から推定
    pub cost_per_1k_tokens: Option<f64>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl ProviderConfig {
    /// OpenAI設定を作成
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            name: format!("openai:{}", model),
            kind: ProviderKind::OpenAI,
            api_key: Some(SecretString::new(api_key.into().into_boxed_str())),
            endpoint: None,
            model,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            cost_per_1k_tokens: None,
        }
    }

    /// 環境変数からOpenAI設定を読み込み
    pub fn openai_from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".to_string()))?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self::openai(api_key, model))
    }

    /// APIキーを取得（露出）
    pub fn get_api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    /// 1Kトークンあたりのコスト
    pub fn cost_per_1k(&self) -> f64 {
        self.cost_per_1k_for(&self.model)
    }

    /// 指定モデルの1Kトークンあたりのコスト
    ///
    /// 明示的なコスト設定は設定済みモデルにだけ適用する。
    pub fn cost_per_1k_for(&self, model: &str) -> f64 {
        if let Some(cost) = self.cost_per_1k_tokens.filter(|_| model == self.model) {
            return cost;
        }
        match model {
            m if m.starts_with("gpt-4o-mini") => 0.0006,
            m if m.starts_with("gpt-4o") => 0.01,
            m if m.starts_with("gpt-4-turbo") => 0.03,
            m if m.starts_with("gpt-4") => 0.06,
            m if m.starts_with("gpt-3.5") => 0.002,
            _ => 0.0,
        }
    }

    /// 設定を検証
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::Config(format!(
                "API key is required for provider '{}'",
                self.name
            )));
        }

        if self.kind == ProviderKind::AzureOpenAI && self.endpoint.is_none() {
            return Err(Error::Config("Endpoint is required for Azure".to_string()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(
                "Temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(Error::Config("max_tokens must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_config() {
        let config = ProviderConfig::openai("test-key", "gpt-4o");
        assert_eq!(config.kind, ProviderKind::OpenAI);
        assert_eq!(config.name, "openai:gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_temperature() {
        let mut config = ProviderConfig::openai("test-key", "gpt-4o");
        config.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let mut config = ProviderConfig::openai("test-key", "gpt-4o");
        config.kind = ProviderKind::AzureOpenAI;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cost_table() {
        let config = ProviderConfig::openai("k", "gpt-4o-mini");
        assert_eq!(config.cost_per_1k(), 0.0006);

        let mut custom = ProviderConfig::openai("k", "custom-model");
        assert_eq!(custom.cost_per_1k(), 0.0);
        custom.cost_per_1k_tokens = Some(0.5);
        assert_eq!(custom.cost_per_1k(), 0.5);
    }

    #[test]
    fn test_cost_follows_requested_model() {
        let mut config = ProviderConfig::openai("k", "gpt-4o-mini");
        assert_eq!(config.cost_per_1k_for("gpt-4o-mini"), 0.0006);
        assert_eq!(config.cost_per_1k_for("gpt-4-turbo"), 0.03);

        config.cost_per_1k_tokens = Some(0.5);
        assert_eq!(config.cost_per_1k_for("gpt-4o-mini"), 0.5);
        assert_eq!(config.cost_per_1k_for("gpt-4o"), 0.01);
    }
}
