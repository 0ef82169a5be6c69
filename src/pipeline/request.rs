//! 生成リクエスト

use crate::config::StyleConfig;
use crate::content::{ContentType, Tone};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 実行モード
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// 通常モード（引用不足は重大な問題として記録）
    #[default]
    Standard,
    /// マルチフェーズモード（引用必須）
    MultiPhase,
}

/// コンテンツ生成リクエスト
///
/// パイプライン実行中は変更されない（オーケストレーターは参照のみ受け取る）。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    /// トピック（3-200文字）
    #[validate(length(min = 3, max = 200), custom(function = "validate_topic"))]
    pub topic: String,

    /// ターゲットキーワード（1つ以上）
    #[validate(length(min = 1), custom(function = "validate_keywords"))]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub tone: Option<Tone>,

    /// 目標語数
    #[serde(default = "default_word_count")]
    #[validate(range(min = 50, max = 20000))]
    pub word_count_target: usize,

    #[serde(default)]
    pub content_type: ContentType,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default, alias = "use_consensus_generation")]
    pub use_consensus: bool,

    #[serde(default)]
    pub use_citations: bool,

    #[serde(default)]
    pub use_knowledge_graph: bool,

    #[serde(default = "default_true")]
    pub use_quality_scoring: bool,

    /// リクエスト単位の文体オーバーライド
    #[serde(default)]
    pub style_override: Option<StyleConfig>,

    #[serde(default)]
    pub target_audience: Option<String>,

    /// 独自性比較用の過去生成物
    #[serde(default)]
    pub reference_texts: Vec<String>,

    /// キーワードデータのロケーション（未指定なら設定値）
    #[serde(default)]
    pub location: Option<String>,

    /// キーワードデータの言語（未指定なら設定値）
    #[serde(default)]
    pub language: Option<String>,
}

fn default_word_count() -> usize {
    1500
}

fn default_true() -> bool {
    true
}

fn validate_topic(topic: &str) -> std::result::Result<(), ValidationError> {
    if topic.trim().chars().count() < 3 {
        let mut error = ValidationError::new("blank_topic");
        error.message = Some("topic must contain at least 3 non-whitespace characters".into());
        return Err(error);
    }
    Ok(())
}

fn validate_keywords(keywords: &[String]) -> std::result::Result<(), ValidationError> {
    if keywords.iter().any(|k| k.trim().is_empty()) {
        let mut error = ValidationError::new("blank_keyword");
        error.message = Some("keywords must not be blank".into());
        return Err(error);
    }
    Ok(())
}

impl GenerationRequest {
    /// 最小構成のリクエストを作成
    pub fn new(topic: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            keywords,
            tone: None,
            word_count_target: default_word_count(),
            content_type: ContentType::default(),
            mode: Mode::default(),
            use_consensus: false,
            use_citations: false,
            use_knowledge_graph: false,
            use_quality_scoring: true,
            style_override: None,
            target_audience: None,
            reference_texts: Vec::new(),
            location: None,
            language: None,
        }
    }

    /// 目標語数を設定
    pub fn with_word_count(mut self, words: usize) -> Self {
        self.word_count_target = words;
        self
    }

    /// 実行モードを設定
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// 合議生成を使うか
    pub fn with_consensus(mut self, enabled: bool) -> Self {
        self.use_consensus = enabled;
        self
    }

    /// 引用を使うか
    pub fn with_citations(mut self, enabled: bool) -> Self {
        self.use_citations = enabled;
        self
    }

    /// 関連エンティティをプロンプトに含めるか
    pub fn with_knowledge_graph(mut self, enabled: bool) -> Self {
        self.use_knowledge_graph = enabled;
        self
    }

    /// ステージごとの品質判定（ロールバック）を行うか
    pub fn with_quality_scoring(mut self, enabled: bool) -> Self {
        self.use_quality_scoring = enabled;
        self
    }

    /// 文体オーバーライドを設定
    pub fn with_style_override(mut self, style: StyleConfig) -> Self {
        self.style_override = Some(style);
        self
    }

    /// 参照テキストを設定
    pub fn with_reference_texts(mut self, texts: Vec<String>) -> Self {
        self.reference_texts = texts;
        self
    }

    /// 引用が必須か（マルチフェーズでは常に必須）
    pub fn citations_required(&self) -> bool {
        self.mode == Mode::MultiPhase
    }

    /// 引用ステップを実行するか
    pub fn citations_enabled(&self) -> bool {
        self.use_citations || self.citations_required()
    }

    /// リクエストを検証
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }
}
