//! Keyword Engine Tests
//!
//! メトリクス取得・キャッシュ・クラスタリング・難易度モデルの統合テスト

use async_trait::async_trait;
use content_pipeline::keywords::difficulty::{difficulty, ranking_probability};
use content_pipeline::keywords::outline::{MAX_BODY_SECTIONS, MIN_BODY_SECTIONS};
use content_pipeline::keywords::{build_outline, MetricsError};
use content_pipeline::{KeywordEngine, KeywordMetricsSource, PipelineCache, RawKeywordMetrics};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct CountingSource {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl KeywordMetricsSource for CountingSource {
    async fn metrics(
        &self,
        keyword: &str,
        _location: &str,
        _language: &str,
    ) -> Result<RawKeywordMetrics, MetricsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MetricsError::Unavailable("quota exceeded".to_string()));
        }
        Ok(RawKeywordMetrics {
            search_volume: 1_000 * keyword.len() as u64,
            competition: 0.4,
            cpc: 1.2,
        })
    }
}

fn cache() -> Arc<PipelineCache> {
    Arc::new(PipelineCache::new(
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    ))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_metrics_are_cached_between_runs() {
    let source = Arc::new(CountingSource::new());
    let engine = KeywordEngine::new(Some(source.clone() as Arc<dyn KeywordMetricsSource>), cache());
    let keywords = strings(&["dog grooming", "dog grooming tools", "puppy training"]);

    let first = engine.analyze(&keywords, "us", "en").await;
    assert_eq!(first.metrics.len(), 3);
    assert!(first.metrics.iter().all(|m| m.from_source));
    assert!(first.warnings.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    let second = engine.analyze(&keywords, "US", "EN").await;
    assert_eq!(second.metrics, first.metrics);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_duplicate_keywords_are_looked_up_once() {
    let source = Arc::new(CountingSource::new());
    let engine = KeywordEngine::new(Some(source.clone() as Arc<dyn KeywordMetricsSource>), cache());

    let analysis = engine
        .analyze(&strings(&["dog grooming", "Dog  Grooming"]), "us", "en")
        .await;

    assert_eq!(analysis.metrics.len(), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unavailable_source_falls_back_to_heuristics() {
    let source = Arc::new(CountingSource::failing());
    let engine = KeywordEngine::new(Some(source as Arc<dyn KeywordMetricsSource>), cache());

    let analysis = engine
        .analyze(&strings(&["dog grooming"]), "us", "en")
        .await;

    assert_eq!(analysis.metrics.len(), 1);
    assert!(!analysis.metrics[0].from_source);
    let expected = RawKeywordMetrics::heuristic("dog grooming");
    assert_eq!(analysis.metrics[0].search_volume, expected.search_volume);
    assert!(analysis.warnings[0].contains("dog grooming"));
}

#[tokio::test]
async fn test_single_keyword_forms_singleton_cluster() {
    let engine = KeywordEngine::new(None, cache());

    let analysis = engine.analyze(&strings(&["sourdough"]), "us", "en").await;

    assert_eq!(analysis.clusters.len(), 1);
    let cluster = &analysis.clusters[0];
    assert_eq!(cluster.parent_topic, "sourdough");
    assert_eq!(cluster.keywords, strings(&["sourdough"]));
    assert_eq!(cluster.cluster_score, 1.0);
}

#[tokio::test]
async fn test_related_keywords_share_a_cluster() {
    let engine = KeywordEngine::new(None, cache());
    let keywords = strings(&[
        "dog grooming",
        "dog grooming tools",
        "sourdough starter",
        "sourdough starter recipe",
    ]);

    let analysis = engine.analyze(&keywords, "us", "en").await;

    assert_eq!(analysis.clusters.len(), 2);
    assert_eq!(analysis.clusters[0].parent_topic, "dog grooming");
    assert_eq!(analysis.clusters[1].parent_topic, "sourdough starter");
    let total: usize = analysis.clusters.iter().map(|c| c.keywords.len()).sum();
    assert_eq!(total, keywords.len());
}

#[tokio::test]
async fn test_outline_section_bounds() {
    let engine = KeywordEngine::new(None, cache());
    let many: Vec<String> = (0..12).map(|i| format!("unrelated{} topic{}", i, i)).collect();

    for keywords in [strings(&["dog grooming"]), many] {
        let analysis = engine.analyze(&keywords, "us", "en").await;
        let outline = build_outline(
            "Dog grooming",
            &analysis.metrics,
            &analysis.clusters,
            Some(1500),
            engine.base_length(),
        );
        let body = outline.sections.len() - 1;
        assert!(
            (MIN_BODY_SECTIONS..=MAX_BODY_SECTIONS).contains(&body),
            "{} body sections",
            body
        );
    }
}

#[test]
fn test_ranking_probability_grid_is_monotonic() {
    let difficulties = [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 100.0];
    let months = [0.0, 1.0, 3.0, 6.0, 12.0];

    for &d in &difficulties {
        for pair in months.windows(2) {
            assert!(ranking_probability(d, pair[0]) <= ranking_probability(d, pair[1]));
        }
    }
    for &m in &months {
        for pair in difficulties.windows(2) {
            assert!(ranking_probability(pair[0], m) >= ranking_probability(pair[1], m));
        }
    }
    for &d in &difficulties {
        for &m in &months {
            let p = ranking_probability(d, m);
            assert!((0.0..=1.0).contains(&p));
        }
    }
}

#[test]
fn test_difficulty_reference_values() {
    // 100 × (0.65 × 0.5 + 0.35 × ln(10001)/ln(1000001))
    let expected = 100.0 * (0.65 * 0.5 + 0.35 * (10_001f64).ln() / (1_000_001f64).ln());
    assert!((difficulty(10_000, 0.5) - expected).abs() < 1e-9);
    assert_eq!(difficulty(0, 0.0), 0.0);
}
