//! ステージ定義
//!
//! 状態遷移: Research → Draft → Enhance → Polish → Done（どこからでも Failed へ）

use crate::content::{QualityReport, StructureMetadata};
use crate::error::Error;
use crate::llm::Usage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Draft,
    Enhance,
    Polish,
    Done,
    Failed,
}

impl Stage {
    /// 次の状態（終端状態は自身）
    pub fn next(self) -> Stage {
        match self {
            Stage::Research => Stage::Draft,
            Stage::Draft => Stage::Enhance,
            Stage::Enhance => Stage::Polish,
            Stage::Polish => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Failed => Stage::Failed,
        }
    }

    /// 終端状態か
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Draft => "draft",
            Stage::Enhance => "enhance",
            Stage::Polish => "polish",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ステージの成果物（不変。次ステージは新しい値を作る）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    /// チェーン内の通し番号（1始まり）
    pub version: u32,
    pub text: String,
    pub structure: StructureMetadata,
    pub usage: Usage,
    pub elapsed: Duration,
    pub quality: Option<QualityReport>,
    /// 前ステージのテキストに戻したか
    pub rolled_back: bool,
}

impl StageResult {
    /// テキストから成果物を作成
    pub fn new(stage: Stage, version: u32, text: String, usage: Usage, elapsed: Duration) -> Self {
        let structure = StructureMetadata::from_text(&text);
        Self {
            stage,
            version,
            text,
            structure,
            usage,
            elapsed,
            quality: None,
            rolled_back: false,
        }
    }

    /// 品質レポートを付与
    pub fn with_quality(mut self, report: QualityReport) -> Self {
        self.quality = Some(report);
        self
    }

    /// 集計スコア（未採点なら None）
    pub fn aggregate(&self) -> Option<f64> {
        self.quality.as_ref().map(|q| q.aggregate)
    }
}

/// ステージハンドラーの結果
#[derive(Debug)]
pub enum StageOutcome {
    /// 成功
    Ok(StageResult),
    /// 劣化しつつ継続（警告付き）
    Degraded(StageResult, Vec<String>),
    /// 実行中止
    Fatal(Error),
}

impl StageOutcome {
    /// 警告があれば Degraded、なければ Ok
    pub fn from_warnings(result: StageResult, warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            StageOutcome::Ok(result)
        } else {
            StageOutcome::Degraded(result, warnings)
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        let mut stage = Stage::Research;
        let mut visited = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            visited.push(stage);
        }
        assert_eq!(
            visited,
            vec![
                Stage::Research,
                Stage::Draft,
                Stage::Enhance,
                Stage::Polish,
                Stage::Done
            ]
        );
        assert_eq!(Stage::Failed.next(), Stage::Failed);
    }

    #[test]
    fn test_stage_result_captures_structure() {
        let result = StageResult::new(
            Stage::Draft,
            2,
            "# Title\n\n## A\n\nSee [docs](https://example.org).\n".to_string(),
            Usage::default(),
            Duration::from_millis(5),
        );
        assert_eq!(result.structure.count_level(1), 1);
        assert_eq!(result.structure.count_level(2), 1);
        assert_eq!(result.structure.links.len(), 1);
        assert_eq!(result.aggregate(), None);
    }

    #[test]
    fn test_outcome_from_warnings() {
        let result = StageResult::new(
            Stage::Enhance,
            3,
            String::new(),
            Usage::default(),
            Duration::ZERO,
        );
        assert!(matches!(
            StageOutcome::from_warnings(result.clone(), vec![]),
            StageOutcome::Ok(_)
        ));
        assert!(matches!(
            StageOutcome::from_warnings(result, vec!["w".to_string()]),
            StageOutcome::Degraded(_, _)
        ));
    }
}
