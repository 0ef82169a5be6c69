//! Keyword / Difficulty Engine
//!
//! キーワードメトリクスの取得（キャッシュ経由・並列数制限付き）、
//! 難易度モデル、クラスタリング、アウトライン構築を提供します。

pub mod cluster;
pub mod difficulty;
pub mod outline;

pub use cluster::{cluster_keywords, similarity, KeywordCluster};
pub use difficulty::{BacklinkTier, RankingProbability};
pub use outline::{build_outline, Outline, OutlineSection};

use crate::cache::{CacheKey, PipelineCache};
use crate::content::markdown::tokens;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// 外部ソースから取得した生のメトリクス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawKeywordMetrics {
    pub search_volume: u64,
    /// 競合度（0.0-1.0）
    pub competition: f64,
    /// クリック単価
    pub cpc: f64,
}

impl RawKeywordMetrics {
    /// フレーズ長に基づく決定的な推定値
    ///
    /// 短いフレーズほど検索ボリュームと競合度が高い。
    pub fn heuristic(keyword: &str) -> Self {
        let words = tokens(keyword).len().max(1);
        let competition = (0.9 - 0.15 * (words - 1) as f64).clamp(0.1, 0.9);
        Self {
            search_volume: (40_000.0 / (words * words) as f64).round() as u64,
            competition,
            cpc: ((0.5 + 2.0 * competition) * 100.0).round() / 100.0,
        }
    }
}

/// メトリクスソースのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Keyword data unavailable: {0}")]
    Unavailable(String),

    #[error("Keyword lookup failed: {0}")]
    Failed(String),
}

/// キーワードメトリクスのソース
#[async_trait]
pub trait KeywordMetricsSource: Send + Sync {
    /// キーワードのメトリクスを取得
    async fn metrics(
        &self,
        keyword: &str,
        location: &str,
        language: &str,
    ) -> Result<RawKeywordMetrics, MetricsError>;
}

/// キーワードメトリクス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetrics {
    pub keyword: String,
    pub search_volume: u64,
    pub competition: f64,
    pub cpc: f64,
    /// 難易度（0-100）
    pub difficulty: f64,
    pub domain_authority_required: f64,
    pub backlink_tier: BacklinkTier,
    pub backlinks_needed: u32,
    pub content_length_needed: usize,
    pub ranking_probability: RankingProbability,
    /// ソースから取得したか（false はヒューリスティック推定）
    pub from_source: bool,
}

impl KeywordMetrics {
    /// 生メトリクスから派生指標を計算
    pub fn from_raw(
        keyword: &str,
        raw: &RawKeywordMetrics,
        base_length: usize,
        from_source: bool,
    ) -> Self {
        let competition = if raw.competition.is_finite() {
            raw.competition.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let d = difficulty::difficulty(raw.search_volume, competition);
        Self {
            keyword: keyword.to_string(),
            search_volume: raw.search_volume,
            competition,
            cpc: raw.cpc.max(0.0),
            difficulty: (d * 100.0).round() / 100.0,
            domain_authority_required: difficulty::domain_authority_required(d),
            backlink_tier: difficulty::backlink_tier(d),
            backlinks_needed: difficulty::backlinks_needed(d),
            content_length_needed: difficulty::content_length_needed(base_length, d),
            ranking_probability: difficulty::ranking_schedule(d),
            from_source,
        }
    }
}

/// キーワード分析結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordAnalysis {
    pub metrics: Vec<KeywordMetrics>,
    pub clusters: Vec<KeywordCluster>,
    pub warnings: Vec<String>,
}

impl KeywordAnalysis {
    /// 他クラスタの関連キーワード（ナレッジグラフ用のエンティティ）
    pub fn related_terms(&self, exclude: &[String]) -> Vec<String> {
        let excluded: HashSet<String> = exclude.iter().map(|k| k.to_lowercase()).collect();
        self.clusters
            .iter()
            .flat_map(|c| c.keywords.iter())
            .filter(|k| !excluded.contains(&k.to_lowercase()))
            .cloned()
            .collect()
    }
}

/// キーワードエンジン
pub struct KeywordEngine {
    source: Option<Arc<dyn KeywordMetricsSource>>,
    cache: Arc<PipelineCache>,
    concurrency: usize,
    base_length: usize,
    similarity_threshold: f64,
}

impl KeywordEngine {
    /// 新規エンジンを作成
    pub fn new(source: Option<Arc<dyn KeywordMetricsSource>>, cache: Arc<PipelineCache>) -> Self {
        Self {
            source,
            cache,
            concurrency: 4,
            base_length: 1500,
            similarity_threshold: 0.3,
        }
    }

    /// 同時取得数の上限
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// 基準コンテンツ長
    pub fn with_base_length(mut self, base_length: usize) -> Self {
        self.base_length = base_length;
        self
    }

    /// クラスタリングの類似度しきい値
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// 基準コンテンツ長
    pub fn base_length(&self) -> usize {
        self.base_length
    }

    async fn lookup(
        &self,
        keyword: &str,
        location: &str,
        language: &str,
    ) -> Result<RawKeywordMetrics, MetricsError> {
        let Some(source) = &self.source else {
            return Err(MetricsError::Unavailable(
                "no keyword metrics source configured".to_string(),
            ));
        };
        self.cache
            .keyword_metrics()
            .get_or_try_fetch(CacheKey::new(keyword, location, language), || {
                source.metrics(keyword, location, language)
            })
            .await
    }

    /// キーワードを分析（メトリクス取得 + クラスタリング）
    ///
    /// 取得に失敗したキーワードはヒューリスティック推定で補い、警告を記録する。
    pub async fn analyze(&self, keywords: &[String], location: &str, language: &str) -> KeywordAnalysis {
        let mut seen = HashSet::new();
        let unique: Vec<String> = keywords
            .iter()
            .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
            .collect();

        let lookups: Vec<(String, Result<RawKeywordMetrics, MetricsError>)> = stream::iter(unique)
            .map(|keyword| async move {
                let result = self.lookup(&keyword, location, language).await;
                (keyword, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut warnings = Vec::new();
        let mut unavailable = Vec::new();
        let metrics: Vec<KeywordMetrics> = lookups
            .into_iter()
            .map(|(keyword, result)| match result {
                Ok(raw) => KeywordMetrics::from_raw(&keyword, &raw, self.base_length, true),
                Err(e) => {
                    debug!(keyword = %keyword, error = %e, "Falling back to heuristic metrics");
                    unavailable.push(keyword.clone());
                    KeywordMetrics::from_raw(
                        &keyword,
                        &RawKeywordMetrics::heuristic(&keyword),
                        self.base_length,
                        false,
                    )
                }
            })
            .collect();

        if !unavailable.is_empty() {
            warn!(count = unavailable.len(), "Keyword data unavailable, using estimates");
            warnings.push(format!(
                "Keyword data unavailable for {}; using heuristic estimates",
                unavailable.join(", ")
            ));
        }

        let clusters = cluster_keywords(&metrics, self.similarity_threshold);
        debug!(
            keywords = metrics.len(),
            clusters = clusters.len(),
            "Keyword analysis complete"
        );

        KeywordAnalysis {
            metrics,
            clusters,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeywordMetricsSource for TableSource {
        async fn metrics(
            &self,
            keyword: &str,
            _location: &str,
            _language: &str,
        ) -> Result<RawKeywordMetrics, MetricsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match keyword {
                "dog grooming" => Ok(RawKeywordMetrics {
                    search_volume: 12_000,
                    competition: 0.6,
                    cpc: 1.2,
                }),
                _ => Err(MetricsError::Failed("not found".to_string())),
            }
        }
    }

    #[test]
    fn test_heuristic_prefers_short_phrases() {
        let short = RawKeywordMetrics::heuristic("grooming");
        let long = RawKeywordMetrics::heuristic("how to groom a poodle at home");
        assert!(short.search_volume > long.search_volume);
        assert!(short.competition > long.competition);
        assert_eq!(short, RawKeywordMetrics::heuristic("grooming"));
    }

    #[tokio::test]
    async fn test_analyze_mixes_source_and_heuristics() {
        let source = Arc::new(TableSource {
            calls: AtomicUsize::new(0),
        });
        let engine = KeywordEngine::new(Some(source.clone()), Arc::new(PipelineCache::default()));
        let keywords = vec![
            "dog grooming".to_string(),
            "Dog  Grooming".to_string(),
            "pet care".to_string(),
        ];

        let analysis = engine.analyze(&keywords, "us", "en").await;
        assert_eq!(analysis.metrics.len(), 2);
        assert!(analysis.metrics[0].from_source);
        assert!(!analysis.metrics[1].from_source);
        assert_eq!(analysis.warnings.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        engine.analyze(&keywords, "us", "en").await;
        // 成功分のみキャッシュされる
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_analyze_without_source() {
        let engine = KeywordEngine::new(None, Arc::new(PipelineCache::default()));
        let analysis = engine.analyze(&["dog grooming".to_string()], "us", "en").await;
        assert_eq!(analysis.metrics.len(), 1);
        assert!(!analysis.metrics[0].from_source);
        assert_eq!(analysis.clusters.len(), 1);
        assert_eq!(analysis.clusters[0].cluster_score, 1.0);
    }
}
