//! Shared read-through cache
//!
//! キーワードメトリクスとSERPスナップショットをTTL付きでキャッシュします。
//! 同一キーへの取得は同時に1つだけ実行され、他の呼び出し元はその結果を待ちます。

use crate::config::PipelineConfig;
use crate::content::citation::SearchHit;
use crate::keywords::RawKeywordMetrics;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// 正規化済みキャッシュキー（キーワード + ロケーション + 言語）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// 正規化してキーを作成
    pub fn new(term: &str, location: &str, language: &str) -> Self {
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        Self(format!(
            "{}|{}|{}",
            normalize(term),
            normalize(location),
            normalize(language)
        ))
    }

    /// キー文字列
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Stored<V> {
    value: V,
    inserted: Instant,
}

type Slot<V> = Arc<OnceCell<Stored<V>>>;

/// キャッシュ統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// キャッシュから返した回数
    pub hits: u64,
    /// 外部取得を実行した回数
    pub fetches: u64,
}

/// TTL付きリードスルーキャッシュ
pub struct TtlCache<V> {
    ttl: Duration,
    slots: RwLock<HashMap<CacheKey, Slot<V>>>,
    hits: AtomicU64,
    fetches: AtomicU64,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync,
{
    /// 新規キャッシュを作成
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, slot: &Slot<V>) -> bool {
        slot.get()
            .map(|stored| stored.inserted.elapsed() >= self.ttl)
            .unwrap_or(false)
    }

    /// 有効期限内の値を取得
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        let slots = self.slots.read().await;
        let slot = slots.get(key)?;
        if self.is_expired(slot) {
            return None;
        }
        slot.get().map(|stored| stored.value.clone())
    }

    /// キャッシュから取得し、なければ `fetch` で取得して格納する
    ///
    /// 同じキーの取得が進行中なら新たに取得せずその完了を待つ。
    /// 取得に失敗した場合は何も格納しない。
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: CacheKey, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let existing = {
            let slots = self.slots.read().await;
            slots
                .get(&key)
                .filter(|slot| !self.is_expired(slot))
                .cloned()
        };

        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut slots = self.slots.write().await;
                let slot = slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()));
                if self.is_expired(slot) {
                    debug!(key = %key, "Cache entry expired, refreshing");
                    *slot = Arc::new(OnceCell::new());
                }
                slot.clone()
            }
        };

        if let Some(stored) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(stored.value.clone());
        }

        let stored = slot
            .get_or_try_init(|| async move {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss, fetching");
                fetch().await.map(|value| Stored {
                    value,
                    inserted: Instant::now(),
                })
            })
            .await?;

        Ok(stored.value.clone())
    }

    /// 格納済みエントリ数（期限切れを含む）
    pub async fn len(&self) -> usize {
        self.slots
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// 空かどうか
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 統計を取得
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }
}

/// パイプライン共有キャッシュ
///
/// 実行間で共有できる唯一の状態。呼び出し側が明示的に生成して渡します。
pub struct PipelineCache {
    keyword_metrics: TtlCache<RawKeywordMetrics>,
    serp: TtlCache<Vec<SearchHit>>,
}

impl PipelineCache {
    /// TTLを指定して作成
    pub fn new(keyword_ttl: Duration, serp_ttl: Duration) -> Self {
        Self {
            keyword_metrics: TtlCache::new(keyword_ttl),
            serp: TtlCache::new(serp_ttl),
        }
    }

    /// 設定から作成
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.keyword_cache_ttl(), config.serp_cache_ttl())
    }

    /// キーワードメトリクスキャッシュ
    pub fn keyword_metrics(&self) -> &TtlCache<RawKeywordMetrics> {
        &self.keyword_metrics
    }

    /// SERPキャッシュ
    pub fn serp(&self) -> &TtlCache<Vec<SearchHit>> {
        &self.serp
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cache_key_normalization() {
        let a = CacheKey::new("  Dog   Grooming ", "US", "EN");
        let b = CacheKey::new("dog grooming", "us", "en");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "dog grooming|us|en");
    }

    #[tokio::test]
    async fn test_read_through() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let key = CacheKey::new("k", "us", "en");

        let first: Result<u32, ()> = cache.get_or_try_fetch(key.clone(), || async { Ok(7) }).await;
        let second: Result<u32, ()> = cache.get_or_try_fetch(key.clone(), || async { Ok(9) }).await;

        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
        assert_eq!(cache.stats(), CacheStats { hits: 1, fetches: 1 });
        assert_eq!(cache.get(&key).await, Some(7));
    }

    #[tokio::test]
    async fn test_single_flight_for_concurrent_callers() {
        let cache: Arc<TtlCache<u32>> = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_fetch(CacheKey::new("shared", "us", "en"), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<u32, ()>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let key = CacheKey::new("flaky", "us", "en");

        let failed: Result<u32, &str> = cache
            .get_or_try_fetch(key.clone(), || async { Err("unavailable") })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty().await);

        let ok: Result<u32, &str> = cache.get_or_try_fetch(key, || async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
    }

    #[test]
    fn test_pipeline_cache_keeps_kinds_apart() {
        let cache = PipelineCache::default();
        let key = CacheKey::new("dog grooming", "us", "en");

        tokio_test::block_on(async {
            let raw: Result<RawKeywordMetrics, ()> = cache
                .keyword_metrics()
                .get_or_try_fetch(key.clone(), || async {
                    Ok(RawKeywordMetrics::heuristic("dog grooming"))
                })
                .await;
            assert!(raw.is_ok());
            assert_eq!(cache.keyword_metrics().len().await, 1);
            assert!(cache.serp().get(&key).await.is_none());
        });
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(30));
        let key = CacheKey::new("short", "us", "en");

        let _: Result<u32, ()> = cache.get_or_try_fetch(key.clone(), || async { Ok(1) }).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get(&key).await, None);

        let refreshed: Result<u32, ()> = cache.get_or_try_fetch(key, || async { Ok(2) }).await;
        assert_eq!(refreshed, Ok(2));
        assert_eq!(cache.stats().fetches, 2);
    }
}
