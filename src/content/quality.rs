//! Quality Scorer
//!
//! 6つの観点（読みやすさ・SEO・構造・事実性・独自性・エンゲージメント）で
//! コンテンツを採点します。同じ入力には常に同じレポートを返します。

use super::citation::{scan_integration, Citation};
use super::markdown::{
    self, paragraphs, parse_headings, plain_text, prose_sentences, split_sections, tokens,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static CLAIM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\$\s?\d)|(\b\d[\d,.]*\s?%)|(\b\d[\d,.]*\s*(percent|million|billion|thousand|times|hours?|minutes?|days?|weeks?|months?|years?|kg|lbs?|pounds?|miles?|km|dollars?)\b)|(\b(in|since|by|from|until|as of)\s+(19|20)\d{2}\b)",
    )
    .expect("valid claim pattern")
});

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\(https?://[^)\s]+\)").expect("valid citation pattern"));

static EXAMPLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\bfor example\b|\bfor instance\b|\bsuch as\b|\be\.g\.|\bimagine\b|\bconsider\b|\bcase study\b|\blet's say\b)")
        .expect("valid example pattern")
});

static CTA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(subscribe|sign up|get started|try it|try this|download|contact us|book a|learn more|share your|join|start today|give it a try)\b")
        .expect("valid cta pattern")
});

static CONCLUSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(conclusion|summary|final thoughts|takeaways?|wrapping up|bottom line|in closing)\b")
        .expect("valid conclusion pattern")
});

/// 引用一覧セクションの見出し
pub const REFERENCES_HEADING: &str = "References";

/// 各観点の重み
pub const WEIGHTS: QualityWeights = QualityWeights {
    readability: 0.20,
    seo: 0.20,
    structure: 0.15,
    factual: 0.15,
    uniqueness: 0.15,
    engagement: 0.15,
};

const DENSITY_MIN: f64 = 0.005;
const DENSITY_MAX: f64 = 0.025;
const QUESTIONS_PER_1000: f64 = 2.0;
const EXAMPLES_PER_1000: f64 = 5.0;
const CTAS_PER_1000: f64 = 1.0;
const NEUTRAL_FACTUAL_SCORE: f64 = 75.0;

/// 観点ごとの重み
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub readability: f64,
    pub seo: f64,
    pub structure: f64,
    pub factual: f64,
    pub uniqueness: f64,
    pub engagement: f64,
}

/// 採点時の文脈
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext<'a> {
    /// ターゲットキーワード
    pub keywords: &'a [String],
    /// 独自性比較用の参照テキスト（同トピックの過去生成物など）
    pub reference_texts: &'a [String],
    /// 必須の引用数（引用が必須でなければ None）
    pub required_citations: Option<usize>,
    /// 生成済みの引用（本文に統合されたものだけを引用数に数える）
    pub citations: &'a [Citation],
}

/// 診断用の数値
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityDiagnostics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub flesch_reading_ease: f64,
    pub keyword_density: BTreeMap<String, f64>,
    pub h1_count: usize,
    pub h2_count: usize,
    pub citation_count: usize,
    pub claim_sentences: usize,
    pub cited_claims: usize,
    pub questions: usize,
    pub examples: usize,
    pub calls_to_action: usize,
}

/// 品質レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub readability: f64,
    pub seo: f64,
    pub structure: f64,
    pub factual: f64,
    pub uniqueness: f64,
    pub engagement: f64,
    /// 重み付き平均
    pub aggregate: f64,
    /// 進行を妨げる重大な問題
    pub critical_issues: Vec<String>,
    pub diagnostics: QualityDiagnostics,
}

impl QualityReport {
    /// 重大な問題がないか
    pub fn passed(&self) -> bool {
        self.critical_issues.is_empty()
    }

    /// スコアグレードを取得
    pub fn grade(&self) -> &str {
        match self.aggregate as u8 {
            90..=100 => "Excellent",
            80..=89 => "Good",
            70..=79 => "Fair",
            60..=69 => "Poor",
            _ => "Very Poor",
        }
    }
}

/// エンゲージメント要素の出現数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementCounts {
    pub questions: usize,
    pub examples: usize,
    pub calls_to_action: usize,
}

/// 品質スコアラー
#[derive(Debug, Clone)]
pub struct QualityScorer {
    readability_floor: f64,
}

impl QualityScorer {
    /// 新規スコアラーを作成
    pub fn new() -> Self {
        Self {
            readability_floor: 60.0,
        }
    }

    /// 読みやすさの下限を設定
    pub fn with_readability_floor(mut self, floor: f64) -> Self {
        self.readability_floor = floor;
        self
    }

    /// コンテンツを採点
    pub fn score(&self, text: &str, ctx: &ScoringContext<'_>) -> QualityReport {
        let headings = parse_headings(text);
        let h1_count = headings.iter().filter(|h| h.level == 1).count();
        let h2_count = headings.iter().filter(|h| h.level == 2).count();

        let flesch = flesch_reading_ease(text);
        let (seo, keyword_density) = seo_score(text, ctx.keywords);
        let structure = structure_score(text);
        let (factual, claim_sentences, cited_claims) = factual_score(text);
        let uniqueness = uniqueness_score(text, ctx.reference_texts);
        let (engagement, counts) = engagement_score(text);
        let citation_count = scan_integration(text, ctx.citations).0.len();

        let readability = round2(flesch);
        let aggregate = round2(
            WEIGHTS.readability * readability
                + WEIGHTS.seo * seo
                + WEIGHTS.structure * structure
                + WEIGHTS.factual * factual
                + WEIGHTS.uniqueness * uniqueness
                + WEIGHTS.engagement * engagement,
        );

        let mut critical_issues = Vec::new();
        if readability < self.readability_floor {
            critical_issues.push(format!(
                "Readability {:.1} is below the minimum of {:.0}",
                readability, self.readability_floor
            ));
        }
        if h1_count != 1 {
            critical_issues.push(format!(
                "Expected exactly one H1 heading, found {}",
                h1_count
            ));
        }
        if h2_count < 3 {
            critical_issues.push(format!(
                "Expected at least 3 H2 headings, found {}",
                h2_count
            ));
        }
        if let Some(required) = ctx.required_citations {
            if citation_count < required {
                critical_issues.push(format!(
                    "Only {} of {} required citations are integrated",
                    citation_count, required
                ));
            }
        }

        let plain = plain_text(text);
        QualityReport {
            readability,
            seo,
            structure,
            factual,
            uniqueness,
            engagement,
            aggregate,
            critical_issues,
            diagnostics: QualityDiagnostics {
                word_count: markdown::words(&plain).len(),
                sentence_count: prose_sentences(text).len(),
                flesch_reading_ease: readability,
                keyword_density,
                h1_count,
                h2_count,
                citation_count,
                claim_sentences,
                cited_claims,
                questions: counts.questions,
                examples: counts.examples,
                calls_to_action: counts.calls_to_action,
            },
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Flesch Reading Ease（0-100にクランプ）
pub fn flesch_reading_ease(text: &str) -> f64 {
    let sentences = prose_sentences(text);
    let words: Vec<String> = sentences
        .iter()
        .flat_map(|s| markdown::words(s).into_iter().map(str::to_string))
        .collect();

    if words.is_empty() || sentences.is_empty() {
        return 0.0;
    }

    let syllables: usize = words.iter().map(|w| markdown::count_syllables(w)).sum();
    let words_per_sentence = words.len() as f64 / sentences.len() as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;

    (206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word).clamp(0.0, 100.0)
}

/// キーワードの出現回数（トークン列として一致）
pub fn keyword_occurrences(text_tokens: &[String], keyword: &str) -> usize {
    let needle = tokens(keyword);
    if needle.is_empty() || text_tokens.len() < needle.len() {
        return 0;
    }
    text_tokens
        .windows(needle.len())
        .filter(|window| *window == needle.as_slice())
        .count()
}

/// キーワード密度（出現回数 / 単語数）
pub fn keyword_density(text: &str, keyword: &str) -> f64 {
    let text_tokens = tokens(&plain_text(text));
    if text_tokens.is_empty() {
        return 0.0;
    }
    keyword_occurrences(&text_tokens, keyword) as f64 / text_tokens.len() as f64
}

/// 密度が推奨範囲内か
pub fn density_in_range(density: f64) -> bool {
    (DENSITY_MIN..=DENSITY_MAX).contains(&density)
}

fn contains_phrase(text: &str, keyword: &str) -> bool {
    keyword_occurrences(&tokens(text), keyword) > 0
}

/// SEOスコアとキーワード密度
pub fn seo_score(text: &str, keywords: &[String]) -> (f64, BTreeMap<String, f64>) {
    let mut densities = BTreeMap::new();
    if keywords.is_empty() {
        return (100.0, densities);
    }

    let first_paragraph = paragraphs(text).into_iter().next().unwrap_or_default();
    let headings = parse_headings(text);

    let mut total = 0.0;
    for keyword in keywords {
        let density = keyword_density(text, keyword);
        densities.insert(keyword.clone(), round2(density * 100.0));

        let density_score = if density_in_range(density) {
            1.0
        } else if density < DENSITY_MIN {
            density / DENSITY_MIN
        } else {
            (1.0 - (density - DENSITY_MAX) / DENSITY_MAX).max(0.0)
        };
        let in_first_paragraph = contains_phrase(&first_paragraph, keyword);
        let in_heading = headings.iter().any(|h| contains_phrase(&h.text, keyword));

        total += 0.5 * density_score
            + if in_first_paragraph { 0.25 } else { 0.0 }
            + if in_heading { 0.25 } else { 0.0 };
    }

    (round2(total / keywords.len() as f64 * 100.0), densities)
}

/// 結論セクションの見出しか
pub fn is_conclusion_heading(text: &str) -> bool {
    CONCLUSION_PATTERN.is_match(text)
}

/// 参考文献セクションの見出しか
pub fn is_references_heading(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower == "references" || lower == "sources"
}

/// 構造契約の違反一覧（H1が1つ、H2が3つ以上、各H2に2-5段落）
pub fn structure_violations(text: &str) -> Vec<String> {
    let headings = parse_headings(text);
    let h1 = headings.iter().filter(|h| h.level == 1).count();
    let h2 = headings.iter().filter(|h| h.level == 2).count();

    let mut violations = Vec::new();
    if h1 != 1 {
        violations.push(format!("expected exactly one top-level heading, found {}", h1));
    }
    if h2 < 3 {
        violations.push(format!("expected at least 3 second-level headings, found {}", h2));
    }
    for section in split_sections(text).sections {
        if is_references_heading(&section.heading.text) {
            continue;
        }
        let count = paragraphs(&section.body).len();
        if !(2..=5).contains(&count) {
            violations.push(format!(
                "section '{}' has {} paragraphs, expected 2-5",
                section.heading.text, count
            ));
        }
    }
    violations
}

/// 構造スコア
pub fn structure_score(text: &str) -> f64 {
    let headings = parse_headings(text);
    let h1 = headings.iter().filter(|h| h.level == 1).count();
    let h2 = headings.iter().filter(|h| h.level == 2).count();

    let mut score: f64 = 100.0;
    if h1 != 1 {
        score -= 25.0;
    }
    if h2 < 3 {
        score -= 10.0 * (3 - h2) as f64;
    }

    let mut previous = 0u8;
    let mut skipped = 0;
    for heading in &headings {
        if heading.level > previous + 1 {
            skipped += 1;
        }
        previous = heading.level;
    }
    score -= (15.0 * skipped as f64).min(45.0);

    if !headings
        .iter()
        .any(|h| h.level <= 3 && is_conclusion_heading(&h.text))
    {
        score -= 15.0;
    }

    let uneven_sections = split_sections(text)
        .sections
        .iter()
        .filter(|s| !is_references_heading(&s.heading.text))
        .filter(|s| !(2..=5).contains(&paragraphs(&s.body).len()))
        .count();
    score -= (5.0 * uneven_sections as f64).min(20.0);

    score.clamp(0.0, 100.0)
}

/// 統計・日付を含む主張文か
pub fn is_claim(sentence: &str) -> bool {
    CLAIM_PATTERN.is_match(sentence)
}

/// 引用マーカーを含むか
pub fn has_citation_marker(sentence: &str) -> bool {
    CITATION_MARKER.is_match(sentence)
}

/// 本文の主張文（リンク記法を保持）
pub fn claim_sentences(text: &str) -> Vec<String> {
    body_without_references(text)
        .iter()
        .flat_map(|p| markdown::sentences(p))
        .filter(|s| is_claim(&plain_text(s)))
        .collect()
}

fn body_without_references(text: &str) -> Vec<String> {
    let doc = split_sections(text);
    let mut blocks = paragraphs(&doc.preamble);
    for section in doc.sections {
        if is_references_heading(&section.heading.text) {
            continue;
        }
        blocks.extend(paragraphs(&section.body));
    }
    blocks
}

/// 事実性スコア（引用付き主張文 / 主張文）
pub fn factual_score(text: &str) -> (f64, usize, usize) {
    let claims = claim_sentences(text);
    if claims.is_empty() {
        return (NEUTRAL_FACTUAL_SCORE, 0, 0);
    }
    let cited = claims.iter().filter(|s| has_citation_marker(s)).count();
    (
        round2(cited as f64 / claims.len() as f64 * 100.0),
        claims.len(),
        cited,
    )
}

fn trigrams(text: &str) -> HashSet<String> {
    let words = tokens(&plain_text(text));
    words.windows(3).map(|w| w.join(" ")).collect()
}

/// 独自性スコア（参照テキストとの単語3-gram重複が少ないほど高い）
pub fn uniqueness_score(text: &str, references: &[String]) -> f64 {
    let own = trigrams(text);
    if own.is_empty() || references.is_empty() {
        return 100.0;
    }

    let max_overlap = references
        .iter()
        .map(|reference| {
            let other = trigrams(reference);
            own.intersection(&other).count() as f64 / own.len() as f64
        })
        .fold(0.0, f64::max);

    round2((1.0 - max_overlap) * 100.0)
}

/// エンゲージメント要素を数える
pub fn engagement_counts(text: &str) -> EngagementCounts {
    let plain = plain_text(text);
    EngagementCounts {
        questions: prose_sentences(text)
            .iter()
            .filter(|s| s.ends_with('?'))
            .count(),
        examples: EXAMPLE_PATTERN.find_iter(&plain).count(),
        calls_to_action: CTA_PATTERN.find_iter(&plain).count(),
    }
}

/// エンゲージメントスコア（1000語あたりの出現率を目標値と比較）
pub fn engagement_score(text: &str) -> (f64, EngagementCounts) {
    let counts = engagement_counts(text);
    let word_count = markdown::word_count(text);
    if word_count == 0 {
        return (0.0, counts);
    }

    let per_1000 = |n: usize| n as f64 * 1000.0 / word_count as f64;
    let component = |n: usize, target: f64| (per_1000(n) / target).min(1.0);

    let score = 100.0
        * (0.35 * component(counts.questions, QUESTIONS_PER_1000)
            + 0.40 * component(counts.examples, EXAMPLES_PER_1000)
            + 0.25 * component(counts.calls_to_action, CTAS_PER_1000));

    (round2(score), counts)
}

/// セクション単体のローカルスコア（構造 + エンゲージメント）
pub fn section_local_score(section_body: &str) -> f64 {
    let paragraph_count = paragraphs(section_body).len();
    let structure = if (2..=5).contains(&paragraph_count) {
        100.0
    } else {
        let distance = if paragraph_count < 2 {
            2 - paragraph_count
        } else {
            paragraph_count - 5
        };
        (100.0 - 25.0 * distance as f64).max(0.0)
    };
    let (engagement, _) = engagement_score(section_body);
    round2((structure + engagement) / 2.0)
}
