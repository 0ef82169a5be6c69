//! Enhancement helpers
//!
//! E-E-A-T（経験）表現の挿入と、読みやすさ改善リライトの採用判定。

use super::markdown::{blocks, extract_links, heading_of, is_prose_block, parse_headings, word_count};
use super::quality::{flesch_reading_ease, is_conclusion_heading, is_references_heading, structure_violations};
use super::seo::fingerprints_preserved;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static EXPERIENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(in my experience|in our experience|from my experience|i've found|i have found|we've found|we found|we tested|i tested|hands-on|first-hand|firsthand|after years of|i've seen|i have seen|what i've learned|i recommend|we recommend)\b",
    )
    .expect("valid experience pattern")
});

/// 既定の経験表現
pub const DEFAULT_EXPERIENCE_PHRASES: &[&str] = &[
    "In my experience,",
    "From hands-on testing,",
    "What I've found is that",
    "After years of working with this,",
    "In our experience,",
];

/// 経験表現の出現数
pub fn count_experience_indicators(text: &str) -> usize {
    EXPERIENCE_PATTERN.find_iter(text).count()
}

/// 必要な経験表現の数（1000語あたり `per_1000`）
pub fn required_indicators(words: usize, per_1000: f64) -> usize {
    (words as f64 * per_1000 / 1000.0).floor() as usize
}

/// 経験表現挿入の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceInjection {
    pub text: String,
    /// 挿入前の出現数
    pub existing: usize,
    /// 挿入した数
    pub injected: usize,
}

fn lower_first(sentence: &str) -> String {
    let mut chars = sentence.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();
    let keeps_case = rest.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
        || sentence.starts_with("I ")
        || sentence.starts_with("I'")
        || !first.is_alphabetic();
    if keeps_case {
        sentence.to_string()
    } else {
        format!("{}{}", first.to_lowercase(), rest)
    }
}

/// 段落の先頭に経験表現を付ける
fn prefix_paragraph(paragraph: &str, phrase: &str) -> String {
    format!("{} {}", phrase.trim(), lower_first(paragraph.trim_start()))
}

/// 経験表現を挿入（決定的）
///
/// 1000語あたり `min_per_1000` 個に満たない分だけ、結論と参考文献以外の
/// 各セクションの段落へ順番に挿入する。`max_per_1000` を超える挿入はしない。
pub fn inject_experience(
    text: &str,
    phrases: &[String],
    min_per_1000: f64,
    max_per_1000: f64,
) -> ExperienceInjection {
    let existing = count_experience_indicators(text);
    let words = word_count(text);
    let required = required_indicators(words, min_per_1000);
    let ceiling = required_indicators(words, max_per_1000).max(required);
    let wanted = required.saturating_sub(existing).min(ceiling.saturating_sub(existing));

    if wanted == 0 {
        return ExperienceInjection {
            text: text.to_string(),
            existing,
            injected: 0,
        };
    }

    let phrases: Vec<String> = if phrases.is_empty() {
        DEFAULT_EXPERIENCE_PHRASES.iter().map(|p| p.to_string()).collect()
    } else {
        phrases.to_vec()
    };

    let mut parts = blocks(text);

    // セクションごとの候補段落（H2セクション単位、結論・参考文献は除外）
    let mut sections: Vec<Vec<usize>> = Vec::new();
    let mut eligible_section = false;
    for (index, block) in parts.iter().enumerate() {
        if let Some((level, heading)) = block.lines().next().and_then(heading_of) {
            if level == 2 {
                eligible_section =
                    !is_conclusion_heading(&heading) && !is_references_heading(&heading);
                sections.push(Vec::new());
            }
            continue;
        }
        if eligible_section && is_prose_block(block) && count_experience_indicators(block) == 0 {
            if let Some(current) = sections.last_mut() {
                current.push(index);
            }
        }
    }

    // 各セクションの段落を順に巡回
    let mut order = Vec::new();
    let depth = sections.iter().map(Vec::len).max().unwrap_or(0);
    for round in 0..depth {
        for section in &sections {
            if let Some(&index) = section.get(round) {
                order.push(index);
            }
        }
    }

    let mut injected = 0;
    for (n, index) in order.into_iter().take(wanted).enumerate() {
        let phrase = &phrases[n % phrases.len()];
        parts[index] = prefix_paragraph(&parts[index], phrase);
        injected += 1;
    }

    let mut out = parts.join("\n\n");
    out.push('\n');
    ExperienceInjection {
        text: out,
        existing,
        injected,
    }
}

/// 読みやすさ改善リライトを採用できるか
///
/// 見出し・リンク・事実主張が保たれ、構造違反が増えず、スコアが改善した場合のみ採用。
pub fn accept_simplification(original: &str, rewrite: &str) -> Result<(), String> {
    let headings = |text: &str| -> Vec<(u8, String)> {
        parse_headings(text)
            .into_iter()
            .map(|h| (h.level, h.text.to_lowercase()))
            .collect()
    };
    if headings(original) != headings(rewrite) {
        return Err("headings changed".to_string());
    }
    if structure_violations(rewrite).len() > structure_violations(original).len() {
        return Err("structure regressed".to_string());
    }

    let rewritten_links: HashSet<String> =
        extract_links(rewrite).into_iter().map(|l| l.url).collect();
    if let Some(missing) = extract_links(original)
        .into_iter()
        .find(|l| !rewritten_links.contains(&l.url))
    {
        return Err(format!("link {} was dropped", missing.url));
    }

    if !fingerprints_preserved(original, rewrite) {
        return Err("factual claims changed".to_string());
    }

    let before = flesch_reading_ease(original);
    let after = flesch_reading_ease(rewrite);
    if after <= before {
        return Err(format!(
            "readability did not improve ({:.1} -> {:.1})",
            before, after
        ));
    }
    Ok(())
}
