//! SEO Polish
//!
//! メタタイトル・メタディスクリプション、キーワード密度の補正判定、
//! リンク検証、見出し正規化、事実主張のフィンガープリントを提供します。

use super::citation::integrated_urls;
use super::markdown::{
    blocks, extract_links, heading_of, is_prose_block, parse_headings, plain_text, tokens,
};
use super::prompt::DensityAdjustment;
use super::quality::{claim_sentences, density_in_range, keyword_density};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

/// メタタイトルの最大文字数
pub const META_TITLE_MAX: usize = 60;
/// メタディスクリプションの最大文字数
pub const META_DESCRIPTION_MAX: usize = 155;

static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\d[\d,]*(?:\.\d+)?%?").expect("valid numeric pattern"));

static META_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(meta\s+)?(title|description)\s*:\s*").expect("valid meta prefix pattern")
});

/// SEO改善提案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoSuggestion {
    /// カテゴリ
    pub category: SuggestionCategory,
    /// 重要度 (1-5)
    pub priority: u8,
    /// メッセージ
    pub message: String,
}

impl SeoSuggestion {
    fn new(category: SuggestionCategory, priority: u8, message: impl Into<String>) -> Self {
        Self {
            category,
            priority,
            message: message.into(),
        }
    }
}

/// 提案カテゴリ
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    /// キーワード
    Keywords,
    /// 見出し
    Headings,
    /// リンク
    Links,
    /// メタデータ
    Metadata,
}

/// 単語境界で切り詰める（`max_chars` 以内）
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }

    let mut out = String::new();
    for word in text.split(' ') {
        let candidate_len = out.chars().count() + usize::from(!out.is_empty()) + word.chars().count();
        if candidate_len > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(max_chars).collect();
    }
    out.trim_end_matches([',', ';', ':', '-']).to_string()
}

/// プロバイダー応答からメタ文字列を整形（空なら None）
pub fn clean_meta(candidate: &str, max_chars: usize) -> Option<String> {
    let line = candidate.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = META_PREFIX.replace(line, "");
    let line = line
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*'))
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(truncate_at_word(line, max_chars))
}

/// ローカルで生成するメタタイトル
pub fn fallback_meta_title(title: &str, keywords: &[String]) -> String {
    let base = truncate_at_word(title, META_TITLE_MAX);
    let Some(primary) = keywords.first() else {
        return base;
    };
    let has_keyword = tokens(&base)
        .windows(tokens(primary).len().max(1))
        .any(|w| w == tokens(primary).as_slice());
    let appended = format!("{} | {}", base, primary);
    if !has_keyword && appended.chars().count() <= META_TITLE_MAX {
        appended
    } else {
        base
    }
}

/// ローカルで生成するメタディスクリプション（最初の本文段落から）
pub fn fallback_meta_description(text: &str) -> String {
    let first = blocks(text)
        .into_iter()
        .find(|b| is_prose_block(b))
        .map(|b| plain_text(&b))
        .unwrap_or_default();
    if first.chars().count() <= META_DESCRIPTION_MAX {
        return first.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let truncated = truncate_at_word(&first, META_DESCRIPTION_MAX - 3);
    format!("{}...", truncated.trim_end_matches('.'))
}

/// 推奨範囲外のキーワード密度
pub fn density_adjustments(text: &str, keywords: &[String]) -> Vec<DensityAdjustment> {
    keywords
        .iter()
        .filter_map(|keyword| {
            let density = keyword_density(text, keyword);
            if density_in_range(density) {
                return None;
            }
            Some(DensityAdjustment {
                keyword: keyword.clone(),
                current_percent: (density * 10_000.0).round() / 100.0,
                increase: density < 0.005,
            })
        })
        .collect()
}

/// 事実主張のフィンガープリント（主張文中の数値と本文の引用URL）
pub fn claim_fingerprints(text: &str) -> BTreeSet<String> {
    let mut fingerprints: BTreeSet<String> = claim_sentences(text)
        .iter()
        .flat_map(|s| {
            let plain = plain_text(s);
            NUMERIC_PATTERN
                .find_iter(&plain)
                .map(|m| m.as_str().trim_end_matches([',', '.']).to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    fingerprints.extend(integrated_urls(text));
    fingerprints
}

/// 書き換え後も事実主張がすべて残っているか
pub fn fingerprints_preserved(original: &str, rewritten: &str) -> bool {
    let before = claim_fingerprints(original);
    if before.is_empty() {
        return true;
    }
    let rewritten_plain = plain_text(rewritten);
    let urls: BTreeSet<String> = integrated_urls(rewritten).into_iter().collect();
    before.iter().all(|fp| {
        if fp.starts_with("http://") || fp.starts_with("https://") {
            urls.contains(fp)
        } else {
            rewritten_plain.contains(fp.as_str())
        }
    })
}

fn is_valid_link_target(target: &str) -> bool {
    if target.starts_with('#') && target.len() > 1 {
        return true;
    }
    if target.starts_with('/') && !target.starts_with("//") {
        return true;
    }
    match Url::parse(target) {
        Ok(url) => match url.scheme() {
            "http" | "https" => url.host_str().map(|h| h.contains('.')).unwrap_or(false),
            "mailto" => !url.path().is_empty(),
            _ => false,
        },
        Err(_) => false,
    }
}

/// 不正なリンクをテキストに展開
///
/// (修正後テキスト, 展開したリンク先) を返す。
pub fn validate_links(text: &str) -> (String, Vec<String>) {
    let mut out = text.to_string();
    let mut removed = Vec::new();

    let mut links = extract_links(text);
    links.sort_by_key(|l| std::cmp::Reverse(l.offset));
    for link in links {
        if is_valid_link_target(&link.url) {
            continue;
        }
        let end = link.offset + link.text.len() + link.url.len() + 4;
        if end > out.len() || &out[link.offset..end] != format!("[{}]({})", link.text, link.url) {
            continue;
        }
        out.replace_range(link.offset..end, &link.text);
        removed.push(link.url);
    }
    removed.reverse();
    (out, removed)
}

/// 見出し階層を正規化
///
/// 余分なH1はH2へ、飛び級は直前レベル+1へ、H1がなければ先頭に挿入する。
pub fn normalize_headings(text: &str, title: &str) -> (String, Vec<SeoSuggestion>) {
    let mut notes = Vec::new();
    let has_h1 = parse_headings(text).iter().any(|h| h.level == 1);

    let mut lines: Vec<String> = Vec::new();
    let mut previous = 0u8;
    if !has_h1 {
        lines.push(format!("# {}", title));
        lines.push(String::new());
        previous = 1;
        notes.push(SeoSuggestion::new(
            SuggestionCategory::Headings,
            5,
            "Inserted missing top-level title",
        ));
    }

    let mut seen_h1 = false;
    let mut in_code = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        let heading = if in_code { None } else { heading_of(line) };
        let Some((level, heading_text)) = heading else {
            lines.push(line.to_string());
            continue;
        };

        let mut target = level;
        if level == 1 {
            if seen_h1 {
                target = 2;
                notes.push(SeoSuggestion::new(
                    SuggestionCategory::Headings,
                    4,
                    format!("Demoted extra top-level heading '{}'", heading_text),
                ));
            }
            seen_h1 = true;
        }
        if target > previous + 1 {
            notes.push(SeoSuggestion::new(
                SuggestionCategory::Headings,
                3,
                format!(
                    "Heading '{}' skipped from level {} to {}",
                    heading_text, previous, target
                ),
            ));
            target = previous + 1;
        }
        previous = target;
        lines.push(format!("{} {}", "#".repeat(target as usize), heading_text));
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    (out, notes)
}

/// H1のテキスト（なければ None）
pub fn extract_title(text: &str) -> Option<String> {
    parse_headings(text)
        .into_iter()
        .find(|h| h.level == 1)
        .map(|h| h.text)
}

/// 推奨範囲外のキーワードを提案に変換
pub fn density_suggestions(adjustments: &[DensityAdjustment]) -> Vec<SeoSuggestion> {
    adjustments
        .iter()
        .map(|a| {
            SeoSuggestion::new(
                SuggestionCategory::Keywords,
                3,
                format!(
                    "Keyword '{}' density {:.2}% is outside 0.5-2.5%",
                    a.keyword, a.current_percent
                ),
            )
        })
        .collect()
}

/// 展開したリンクを提案に変換
pub fn link_suggestions(removed: &[String]) -> Vec<SeoSuggestion> {
    removed
        .iter()
        .map(|url| {
            SeoSuggestion::new(
                SuggestionCategory::Links,
                2,
                format!("Removed malformed link target '{}'", url),
            )
        })
        .collect()
}

/// メタデータのフォールバック使用を提案に変換
pub fn metadata_fallback_suggestion(field: &str) -> SeoSuggestion {
    SeoSuggestion::new(
        SuggestionCategory::Metadata,
        2,
        format!("Generated {} locally after provider failure", field),
    )
}
