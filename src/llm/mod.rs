//! プロバイダーゲートウェイ
//!
//! テキスト生成プロバイダーの契約（`ProviderGateway`）と、
//! タイムアウト・再試行・フォールバックを担う `ProviderPool` を提供します。

pub mod config;
pub mod error;
pub mod pool;
pub mod providers;

pub use config::{ProviderConfig, ProviderKind};
pub use error::{ProviderError, ProviderResult};
pub use pool::{PooledCompletion, ProviderPool};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// 1回の補完呼び出しの結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// 生成されたテキスト
    pub text: String,
    /// 使用トークン数
    pub tokens_used: usize,
    /// コスト（USD）
    pub cost: f64,
    /// レイテンシ
    pub latency: Duration,
}

impl Completion {
    /// 使用量を取得
    pub fn usage(&self) -> Usage {
        Usage {
            tokens: self.tokens_used,
            cost: self.cost,
        }
    }
}

/// トークン・コスト使用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// 合計トークン数
    pub tokens: usize,
    /// 合計コスト（USD）
    pub cost: f64,
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            tokens: self.tokens + rhs.tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// テキスト生成プロバイダーの契約
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// プロバイダー名
    fn name(&self) -> &str;

    /// プロンプトを補完
    async fn complete(&self, prompt: &str, model_hint: Option<&str>) -> ProviderResult<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulation() {
        let mut total = Usage::default();
        total += Usage {
            tokens: 120,
            cost: 0.01,
        };
        total += Usage {
            tokens: 80,
            cost: 0.02,
        };
        assert_eq!(total.tokens, 200);
        assert!((total.cost - 0.03).abs() < 1e-9);
    }
}
