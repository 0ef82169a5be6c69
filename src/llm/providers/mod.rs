//! プロバイダー実装

#[cfg(feature = "llm-integration")]
pub mod openai;

#[cfg(feature = "llm-integration")]
use super::{ProviderConfig, ProviderGateway};
#[cfg(feature = "llm-integration")]
use crate::error::Result;
#[cfg(feature = "llm-integration")]
use std::sync::Arc;

/// プロバイダーファクトリー
#[cfg(feature = "llm-integration")]
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ProviderGateway>> {
    Ok(Arc::new(openai::OpenAIProvider::new(config.clone())?))
}
