//! Markdown Analysis
//!
//! 見出し・リンク・画像・セクション・文・音節の解析ユーティリティ。
//! 品質スコアラー、引用ジェネレーター、合議ジェネレーターが共通で使用します。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]*)\]\(([^)\s]*)\)").expect("valid link pattern"));

static IMAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]\n]*)\]\(([^)\s]*)\)").expect("valid image pattern"));

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").expect("valid list pattern"));

const ABBREVIATIONS: &[&str] = &["e.g.", "i.e.", "etc.", "vs.", "dr.", "mr.", "mrs.", "ms."];

/// 見出し
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// レベル（1-6）
    pub level: u8,
    /// 見出しテキスト
    pub text: String,
    /// 行番号（0始まり）
    pub line: usize,
}

/// Markdownリンク
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// リンクテキスト
    pub text: String,
    /// URL
    pub url: String,
    /// マーカー開始位置（バイトオフセット）
    pub offset: usize,
}

/// Markdown画像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// 代替テキスト
    pub alt: String,
    /// URL
    pub url: String,
}

/// 構造メタデータ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureMetadata {
    /// 見出し一覧
    pub headings: Vec<Heading>,
    /// 検出されたリンク
    pub links: Vec<Link>,
    /// 検出された画像
    pub images: Vec<Image>,
}

impl StructureMetadata {
    /// テキストから構造メタデータを抽出
    pub fn from_text(text: &str) -> Self {
        Self {
            headings: parse_headings(text),
            links: extract_links(text),
            images: extract_images(text),
        }
    }

    /// 指定レベルの見出し数
    pub fn count_level(&self, level: u8) -> usize {
        self.headings.iter().filter(|h| h.level == level).count()
    }
}

/// H2で区切られたセクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// セクション見出し（H2）
    pub heading: Heading,
    /// 見出し行を除いた本文
    pub body: String,
}

impl Section {
    /// 見出し行を含めたMarkdownを再構成
    pub fn to_markdown(&self) -> String {
        format!("## {}\n\n{}", self.heading.text, self.body.trim())
    }
}

/// 文書をH2単位で分割した結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionedDocument {
    /// 最初のH2より前（H1と導入文）
    pub preamble: String,
    /// H2セクション
    pub sections: Vec<Section>,
}

impl SectionedDocument {
    /// Markdownに再構成
    pub fn to_markdown(&self) -> String {
        let mut parts = Vec::new();
        if !self.preamble.trim().is_empty() {
            parts.push(self.preamble.trim().to_string());
        }
        parts.extend(self.sections.iter().map(Section::to_markdown));
        let mut out = parts.join("\n\n");
        out.push('\n');
        out
    }
}

/// 行が見出しなら (レベル, テキスト) を返す
pub fn heading_of(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    if text.is_empty() {
        return None;
    }
    Some((hashes as u8, text.to_string()))
}

/// 箇条書き・番号付きリストの行か
pub fn is_list_item(line: &str) -> bool {
    LIST_MARKER.is_match(line)
}

/// 見出しを抽出（コードブロック内は除外）
pub fn parse_headings(text: &str) -> Vec<Heading> {
    let mut in_code = false;
    let mut headings = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            continue;
        }
        if let Some((level, text)) = heading_of(line) {
            headings.push(Heading {
                level,
                text,
                line: line_no,
            });
        }
    }
    headings
}

/// 画像を除いたリンクを抽出
pub fn extract_links(text: &str) -> Vec<Link> {
    LINK_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if whole.start() > 0 && text.as_bytes()[whole.start() - 1] == b'!' {
                return None;
            }
            Some(Link {
                text: caps[1].to_string(),
                url: caps[2].to_string(),
                offset: whole.start(),
            })
        })
        .collect()
}

/// 画像を抽出
pub fn extract_images(text: &str) -> Vec<Image> {
    IMAGE_PATTERN
        .captures_iter(text)
        .map(|caps| Image {
            alt: caps[1].to_string(),
            url: caps[2].to_string(),
        })
        .collect()
}

/// 空行区切りのブロック（コードブロック内の空行では分割しない）
pub fn blocks(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_code = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && line.trim().is_empty() {
            if !current.is_empty() {
                result.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        result.push(current.join("\n"));
    }
    result
}

/// 本文の段落ブロックか（見出し・コード・表・引用・画像・リストを除く）
pub fn is_prose_block(block: &str) -> bool {
    let first = block.trim_start();
    !(first.starts_with('#')
        || first.starts_with("```")
        || first.starts_with('|')
        || first.starts_with('>')
        || first.starts_with("![")
        || is_list_item(first))
}

/// H2単位で分割
pub fn split_sections(text: &str) -> SectionedDocument {
    let mut preamble = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<(Heading, Vec<&str>)> = None;

    for (line_no, line) in text.lines().enumerate() {
        match heading_of(line) {
            Some((2, heading_text)) => {
                if let Some((heading, body)) = current.take() {
                    sections.push(Section {
                        heading,
                        body: body.join("\n").trim().to_string(),
                    });
                }
                current = Some((
                    Heading {
                        level: 2,
                        text: heading_text,
                        line: line_no,
                    },
                    Vec::new(),
                ));
            }
            _ => match current.as_mut() {
                Some((_, body)) => body.push(line),
                None => preamble.push(line),
            },
        }
    }

    if let Some((heading, body)) = current {
        sections.push(Section {
            heading,
            body: body.join("\n").trim().to_string(),
        });
    }

    SectionedDocument {
        preamble: preamble.join("\n").trim().to_string(),
        sections,
    }
}

/// 段落を抽出（見出し行は除外、空行区切り）
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() || heading_of(line).is_some() {
            if !current.is_empty() {
                result.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        result.push(current.join("\n"));
    }
    result
}

/// Markdown記法を除いたプレーンテキスト
pub fn plain_text(text: &str) -> String {
    let without_images = IMAGE_PATTERN.replace_all(text, "");
    let without_links = LINK_PATTERN.replace_all(&without_images, "$1");

    without_links
        .lines()
        .map(|line| {
            let line = match heading_of(line) {
                Some((_, heading)) => heading,
                None => line.to_string(),
            };
            let line = LIST_MARKER.replace(&line, "");
            line.replace("**", "")
                .replace("__", "")
                .replace('`', "")
                .trim_start_matches('>')
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 単語に分割
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .collect()
}

/// Markdown記法を除いた単語数
pub fn word_count(markdown: &str) -> usize {
    words(&plain_text(markdown)).len()
}

/// 小文字の英数字トークン列
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// プレーンテキストを文に分割
pub fn sentences(text: &str) -> Vec<String> {
    let mut result = Vec::new();

    for block in text.split("\n\n") {
        let block = block.split_whitespace().collect::<Vec<_>>().join(" ");
        if block.is_empty() {
            continue;
        }

        let mut start = 0;
        let chars: Vec<(usize, char)> = block.char_indices().collect();
        for (i, &(pos, c)) in chars.iter().enumerate() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            let at_end = i + 1 == chars.len();
            let followed_by_space = chars.get(i + 1).map(|(_, n)| *n == ' ').unwrap_or(false);
            if !(at_end || followed_by_space) {
                continue;
            }
            let candidate = &block[start..pos + c.len_utf8()];
            let last_word = candidate
                .rsplit(' ')
                .next()
                .unwrap_or("")
                .to_lowercase();
            if c == '.' && ABBREVIATIONS.contains(&last_word.as_str()) {
                continue;
            }
            let sentence = candidate.trim();
            if !sentence.is_empty() {
                result.push(sentence.to_string());
            }
            start = pos + c.len_utf8();
        }

        let rest = block[start..].trim();
        if !rest.is_empty() {
            result.push(rest.to_string());
        }
    }

    result
}

/// 本文（見出しを除く）の文一覧
pub fn prose_sentences(markdown: &str) -> Vec<String> {
    paragraphs(markdown)
        .iter()
        .flat_map(|p| sentences(&plain_text(p)))
        .collect()
}

/// 英単語の音節数を推定
pub fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if word.is_empty() {
        return 0;
    }
    if word.len() <= 3 {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for c in word.chars() {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    if word.ends_with('e') && !word.ends_with("le") && count > 1 {
        count -= 1;
    }
    if (word.ends_with("es") || word.ends_with("ed")) && count > 1 {
        let stem = &word[..word.len() - 2];
        if !stem.ends_with('t') && !stem.ends_with('d') && !stem.ends_with('s') {
            count -= 1;
        }
    }

    count.max(1)
}
