//! 生成結果

use super::stage::{Stage, StageResult};
use crate::content::{Citation, QualityReport, SectionProvenance, SeoSuggestion};
use crate::error::{Error, ErrorKind};
use crate::keywords::{KeywordCluster, KeywordMetrics, Outline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// パイプラインの出力（外部ストレージ・表示用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub run_id: Uuid,
    pub success: bool,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// 最後に到達した状態
    pub final_stage: Stage,
    pub title: String,
    pub content: String,
    pub meta_title: String,
    pub meta_description: String,
    pub quality: Option<QualityReport>,
    /// 本文に統合された引用
    pub citations: Vec<Citation>,
    /// 生成されたが本文に統合されなかった引用
    pub not_integrated_citations: Vec<Citation>,
    pub keyword_metrics: Vec<KeywordMetrics>,
    pub clusters: Vec<KeywordCluster>,
    pub outline: Option<Outline>,
    pub seo_suggestions: Vec<SeoSuggestion>,
    /// 合議生成時のセクション採用元
    pub provenance: Vec<SectionProvenance>,
    pub word_count: usize,
    pub total_tokens: usize,
    pub total_cost: f64,
    pub generation_time_seconds: f64,
    /// 劣化の記録（success を妨げない）
    pub warnings: Vec<String>,
    /// ステージ成果物のチェーン
    pub stages: Vec<StageResult>,
    pub generated_at: DateTime<Utc>,
}

impl GenerationResult {
    /// 空の結果を作成
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            success: false,
            error: None,
            error_message: None,
            final_stage: Stage::Research,
            title: String::new(),
            content: String::new(),
            meta_title: String::new(),
            meta_description: String::new(),
            quality: None,
            citations: Vec::new(),
            not_integrated_citations: Vec::new(),
            keyword_metrics: Vec::new(),
            clusters: Vec::new(),
            outline: None,
            seo_suggestions: Vec::new(),
            provenance: Vec::new(),
            word_count: 0,
            total_tokens: 0,
            total_cost: 0.0,
            generation_time_seconds: 0.0,
            warnings: Vec::new(),
            stages: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// 失敗として確定
    pub fn fail(&mut self, error: &Error) {
        self.success = false;
        self.error = Some(error.kind());
        self.error_message = Some(error.to_string());
        self.final_stage = Stage::Failed;
    }

    /// 指定ステージの成果物
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().rev().find(|s| s.stage == stage)
    }

    /// JSONに変換
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
