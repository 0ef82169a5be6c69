//! プロバイダープール
//!
//! 優先順位付きのプロバイダー一覧に対して、呼び出しごとのタイムアウト、
//! 一時障害時の再試行、代替プロバイダーへのフォールバックを適用します。

use super::{Completion, ProviderError, ProviderGateway, ProviderResult};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// どのプロバイダーが応答したかを含む補完結果
#[derive(Debug, Clone)]
pub struct PooledCompletion {
    /// プール内のインデックス
    pub provider_index: usize,
    /// プロバイダー名
    pub provider_name: String,
    /// 補完結果
    pub completion: Completion,
}

/// 優先順位付きプロバイダープール
#[derive(Clone)]
pub struct ProviderPool {
    providers: Vec<Arc<dyn ProviderGateway>>,
    timeout: Duration,
    transient_retries: u32,
}

impl ProviderPool {
    /// 新規プールを作成（先頭ほど優先度が高い）
    pub fn new(providers: Vec<Arc<dyn ProviderGateway>>) -> Self {
        Self {
            providers,
            timeout: Duration::from_secs(60),
            transient_retries: 1,
        }
    }

    /// 呼び出しごとのタイムアウトを設定
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 一時障害時の再試行回数を設定
    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    /// プロバイダー一覧
    pub fn providers(&self) -> &[Arc<dyn ProviderGateway>] {
        &self.providers
    }

    /// 登録数
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// 呼び出しごとのタイムアウト
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 単一プロバイダーをタイムアウト付きで呼び出し、一時障害なら再試行する
    pub async fn call_with_retry(
        &self,
        provider: &dyn ProviderGateway,
        prompt: &str,
        model_hint: Option<&str>,
    ) -> ProviderResult<Completion> {
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(
                self.timeout,
                provider.complete(prompt, model_hint),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient(format!(
                    "{} timed out after {:?}",
                    provider.name(),
                    self.timeout
                ))),
            };

            match result {
                Err(err) if err.is_transient() && attempt < self.transient_retries => {
                    attempt += 1;
                    warn!(
                        provider = provider.name(),
                        attempt,
                        error = %err,
                        "Transient provider failure, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    /// 優先順位順に呼び出し、最初に成功した結果を返す
    pub async fn complete(&self, prompt: &str, model_hint: Option<&str>) -> Result<PooledCompletion> {
        if self.providers.is_empty() {
            return Err(Error::Config("No text generation provider configured".to_string()));
        }

        let mut failures = Vec::new();
        for (index, provider) in self.providers.iter().enumerate() {
            match self.call_with_retry(provider.as_ref(), prompt, model_hint).await {
                Ok(completion) => {
                    debug!(
                        provider = provider.name(),
                        tokens = completion.tokens_used,
                        latency_ms = completion.latency.as_millis() as u64,
                        "Completion received"
                    );
                    return Ok(PooledCompletion {
                        provider_index: index,
                        provider_name: provider.name().to_string(),
                        completion,
                    });
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "Falling back to next provider");
                    failures.push(format!("{}: {}", provider.name(), err));
                }
            }
        }

        Err(Error::ProviderOutage(failures.join("; ")))
    }

    /// 指定したプロバイダーのみで補完する（修復パス用）
    pub async fn complete_on(
        &self,
        provider_index: usize,
        prompt: &str,
        model_hint: Option<&str>,
    ) -> Result<PooledCompletion> {
        let provider = self.providers.get(provider_index).ok_or_else(|| {
            Error::Config(format!("Provider index {} out of range", provider_index))
        })?;

        let completion = self
            .call_with_retry(provider.as_ref(), prompt, model_hint)
            .await?;

        Ok(PooledCompletion {
            provider_index,
            provider_name: provider.name().to_string(),
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FlakyProvider {
        name: String,
        responses: Mutex<Vec<ProviderResult<String>>>,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(name: &str, responses: Vec<ProviderResult<String>>) -> Self {
            Self {
                name: name.to_string(),
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProviderGateway for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _prompt: &str, _hint: Option<&str>) -> ProviderResult<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            next.map(|text| Completion {
                text,
                tokens_used: 10,
                cost: 0.001,
                latency: Duration::from_millis(1),
            })
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_once() {
        let provider = Arc::new(FlakyProvider::new(
            "primary",
            vec![
                Err(ProviderError::Transient("503".to_string())),
                Ok("hello".to_string()),
            ],
        ));
        let pool = ProviderPool::new(vec![provider.clone()]);

        let result = pool.complete("prompt", None).await.unwrap();
        assert_eq!(result.completion.text, "hello");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_after_repeated_transient_failure() {
        let primary = Arc::new(FlakyProvider::new(
            "primary",
            vec![Err(ProviderError::Transient("timeout".to_string()))],
        ));
        let secondary = Arc::new(FlakyProvider::new("secondary", vec![Ok("ok".to_string())]));
        let pool = ProviderPool::new(vec![primary.clone(), secondary]);

        let result = pool.complete("prompt", None).await.unwrap();
        assert_eq!(result.provider_name, "secondary");
        assert_eq!(result.provider_index, 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let primary = Arc::new(FlakyProvider::new(
            "primary",
            vec![Err(ProviderError::Auth("bad key".to_string()))],
        ));
        let pool = ProviderPool::new(vec![primary.clone()]);

        let err = pool.complete("prompt", None).await.unwrap_err();
        assert!(matches!(err, Error::ProviderOutage(_)));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_is_configuration_error() {
        let pool = ProviderPool::new(vec![]);
        let err = pool.complete("prompt", None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
