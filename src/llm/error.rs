//! プロバイダーゲートウェイのエラー型定義

use thiserror::Error;

/// テキスト生成プロバイダーのエラー型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 一時的な障害（タイムアウト、5xx）。同一プロバイダーで1回だけ再試行する
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// 認証エラー
    #[error("Authentication error: {0}")]
    Auth(String),

    /// クォータ・レート制限超過
    #[error("Quota exceeded: {0}")]
    Quota(String),
}

impl ProviderError {
    /// 再試行対象かどうか
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// プロバイダー呼び出しの結果型
pub type ProviderResult<T> = Result<T, ProviderError>;
