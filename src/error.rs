//! Error types for the content generation pipeline.

use crate::llm::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pipeline operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid generation request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider call failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// No provider produced a usable completion
    #[error("All providers failed: {0}")]
    ProviderOutage(String),

    /// Mandatory citation contract could not be met
    #[error("Citation requirement not met: found {found}, required {required} ({reason})")]
    CitationRequirement {
        /// 統合できた引用数
        found: usize,
        /// 必要な引用数
        required: usize,
        /// 理由
        reason: String,
    },

    /// Structural contract violated while structure is configured as blocking
    #[error("Structure violation: {0}")]
    StructureViolation(String),

    /// The run was cancelled by the caller
    #[error("Generation cancelled at stage {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// 結果オブジェクトに載せるエラー種別を取得
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Provider(_) | Error::ProviderOutage(_) => ErrorKind::ProviderOutage,
            Error::CitationRequirement { .. } => ErrorKind::CitationRequirementError,
            Error::StructureViolation(_) => ErrorKind::StructureViolation,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) | Error::Json(_) | Error::Io(_) => ErrorKind::Configuration,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::InvalidRequest(errors.to_string())
    }
}

/// Serializable error classification reported in `GenerationResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// リクエスト検証エラー
    InvalidRequest,
    /// マルチフェーズモードの引用要件違反
    CitationRequirementError,
    /// 全プロバイダー障害
    ProviderOutage,
    /// 構造要件違反（ブロッキング設定時のみ）
    StructureViolation,
    /// キャンセル
    Cancelled,
    /// 設定エラー
    Configuration,
}
