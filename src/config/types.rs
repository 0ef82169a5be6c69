use crate::content::prompt::Tone;
use crate::error::{Error, Result};
use crate::llm::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Pipeline tunables
///
/// Every threshold the pipeline applies lives here so that deployments can
/// adjust them without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Aggregate score drop (points) that triggers a rollback to the previous stage
    pub regression_threshold: f64,

    /// Maximum number of citations inserted per run
    pub citation_cap: usize,

    /// Minimum integrated citations required when citations are mandatory
    pub min_citations: usize,

    /// Per-call provider timeout in seconds
    pub provider_timeout_secs: u64,

    /// Retries on transient provider failures before falling back
    pub transient_retries: u32,

    /// Concurrency limit for keyword metric and search lookups
    pub max_concurrent_lookups: usize,

    /// TTL for cached keyword metrics
    pub keyword_cache_ttl_hours: u64,

    /// TTL for cached SERP snapshots
    pub serp_cache_ttl_hours: u64,

    /// Minimum similarity for two keywords to share a cluster
    pub similarity_threshold: f64,

    /// Base article length used by the content-length model
    pub base_content_length: usize,

    /// Flesch Reading Ease below which simplification runs
    pub readability_floor: f64,

    /// Upper bound of the readability target band
    pub readability_target_max: f64,

    /// Minimum experience indicators per 1000 words
    pub experience_indicators_min_per_1000: f64,

    /// Maximum experience indicators per 1000 words
    pub experience_indicators_max_per_1000: f64,

    /// Fail the run when the structural contract cannot be repaired
    pub structure_blocking: bool,

    /// Default keyword data location
    pub default_location: String,

    /// Default keyword data language
    pub default_language: String,

    /// Optional model hint passed to every provider call
    pub model_hint: Option<String>,

    /// Logging settings
    pub logging: LoggingSettings,

    /// Provider definitions used by the CLI
    pub providers: Vec<ProviderConfig>,
}

/// Logging section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: Option<String>,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            json: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            regression_threshold: 10.0,
            citation_cap: 5,
            min_citations: 5,
            provider_timeout_secs: 60,
            transient_retries: 1,
            max_concurrent_lookups: 4,
            keyword_cache_ttl_hours: 24,
            serp_cache_ttl_hours: 6,
            similarity_threshold: 0.3,
            base_content_length: 1500,
            readability_floor: 60.0,
            readability_target_max: 70.0,
            experience_indicators_min_per_1000: 2.0,
            experience_indicators_max_per_1000: 3.0,
            structure_blocking: false,
            default_location: "us".to_string(),
            default_language: "en".to_string(),
            model_hint: None,
            logging: LoggingSettings::default(),
            providers: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// プロバイダー呼び出しのタイムアウト
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// キーワードメトリクスのキャッシュTTL
    pub fn keyword_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.keyword_cache_ttl_hours * 3600)
    }

    /// SERPスナップショットのキャッシュTTL
    pub fn serp_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.serp_cache_ttl_hours * 3600)
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<()> {
        if self.regression_threshold < 0.0 {
            return Err(Error::Config(
                "regression_threshold must not be negative".to_string(),
            ));
        }
        if self.citation_cap == 0 {
            return Err(Error::Config("citation_cap must be positive".to_string()));
        }
        if self.min_citations > self.citation_cap {
            return Err(Error::Config(
                "min_citations must not exceed citation_cap".to_string(),
            ));
        }
        if self.max_concurrent_lookups == 0 {
            return Err(Error::Config(
                "max_concurrent_lookups must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(
                "similarity_threshold must be within 0.0-1.0".to_string(),
            ));
        }
        if self.readability_floor > self.readability_target_max {
            return Err(Error::Config(
                "readability_floor must not exceed readability_target_max".to_string(),
            ));
        }
        if self.experience_indicators_min_per_1000 > self.experience_indicators_max_per_1000 {
            return Err(Error::Config(
                "experience indicator minimum exceeds maximum".to_string(),
            ));
        }
        if self.provider_timeout_secs == 0 {
            return Err(Error::Config(
                "provider_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// サンプル設定ファイル（TOML）を生成
    pub fn sample_toml() -> Result<String> {
        let body = toml::to_string_pretty(&PipelineConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(format!(
            "# content-pipeline configuration\n\
             #\n\
             # 環境変数での上書きも可能です (例: PIPELINE__CITATION_CAP=8)\n\n{}",
            body
        ))
    }
}

/// Writing-style template / organization override
///
/// Recognized fields are typed; anything else the configuration store sends
/// is kept in `extra` and ignored by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_phrases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_phrases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StyleConfig {
    /// `overrides` の設定済みフィールドで上書きした新しい設定を返す
    pub fn merged_with(&self, overrides: &StyleConfig) -> StyleConfig {
        let mut extra = self.extra.clone();
        extra.extend(
            overrides
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        StyleConfig {
            tone: overrides.tone.or(self.tone),
            target_audience: overrides
                .target_audience
                .clone()
                .or_else(|| self.target_audience.clone()),
            voice: overrides.voice.clone().or_else(|| self.voice.clone()),
            call_to_action: overrides
                .call_to_action
                .clone()
                .or_else(|| self.call_to_action.clone()),
            experience_phrases: overrides
                .experience_phrases
                .clone()
                .or_else(|| self.experience_phrases.clone()),
            banned_phrases: overrides
                .banned_phrases
                .clone()
                .or_else(|| self.banned_phrases.clone()),
            preferred_domains: overrides
                .preferred_domains
                .clone()
                .or_else(|| self.preferred_domains.clone()),
            model_hint: overrides
                .model_hint
                .clone()
                .or_else(|| self.model_hint.clone()),
            extra,
        }
    }

    /// テンプレート ← 組織オーバーライド ← リクエストオーバーライド の順に合成
    pub fn resolve(
        template: &StyleConfig,
        organization: &StyleConfig,
        request: Option<&StyleConfig>,
    ) -> StyleConfig {
        let merged = template.merged_with(organization);
        match request {
            Some(overrides) => merged.merged_with(overrides),
            None => merged,
        }
    }
}
