//! Outline builder
//!
//! クラスタごとにセクションを割り当て、語数目標を
//! `content_length_needed × (1 + competition)` に比例して配分します。

use super::{KeywordCluster, KeywordMetrics};
use serde::{Deserialize, Serialize};

/// 本文セクションの最小数（結論を除く）
pub const MIN_BODY_SECTIONS: usize = 3;
/// 本文セクションの最大数
pub const MAX_BODY_SECTIONS: usize = 8;

const CONCLUSION_SHARE: f64 = 0.1;
const MIN_SECTION_WORDS: usize = 20;

/// アウトラインのセクション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    pub target_words: usize,
    pub keywords: Vec<String>,
}

/// 記事アウトライン
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

impl Outline {
    /// 全セクションの目標語数
    pub fn total_words(&self) -> usize {
        self.sections.iter().map(|s| s.target_words).sum()
    }

    /// Markdown形式（見出しのみ）
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        for section in &self.sections {
            out.push_str(&format!("\n## {}\n", section.heading));
        }
        out
    }
}

/// 先頭を大文字にしたタイトル表記
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn filler_headings(topic: &str) -> [String; 4] {
    [
        format!("What Is {}?", topic),
        format!("Getting Started with {}", topic),
        "Common Mistakes to Avoid".to_string(),
        "Tips from Experience".to_string(),
    ]
}

/// アウトラインを構築
///
/// `total_words` が None の場合はクラスタの必要コンテンツ長の最大値を使う。
pub fn build_outline(
    topic: &str,
    metrics: &[KeywordMetrics],
    clusters: &[KeywordCluster],
    total_words: Option<usize>,
    base_length: usize,
) -> Outline {
    let title = title_case(topic);

    let mut bodies: Vec<(String, f64, Vec<String>)> = Vec::new();
    for (index, cluster) in clusters.iter().enumerate() {
        let members: Vec<&KeywordMetrics> = metrics
            .iter()
            .filter(|m| cluster.keywords.contains(&m.keyword))
            .collect();
        let weight = if members.is_empty() {
            base_length as f64
        } else {
            members
                .iter()
                .map(|m| m.content_length_needed as f64 * (1.0 + m.competition))
                .sum::<f64>()
                / members.len() as f64
        };

        if index < MAX_BODY_SECTIONS {
            bodies.push((title_case(&cluster.parent_topic), weight, cluster.keywords.clone()));
        } else {
            let slot = index % MAX_BODY_SECTIONS;
            bodies[slot].2.extend(cluster.keywords.iter().cloned());
        }
    }

    let average_weight = if bodies.is_empty() {
        base_length as f64
    } else {
        bodies.iter().map(|(_, w, _)| *w).sum::<f64>() / bodies.len() as f64
    };
    for heading in filler_headings(&title) {
        if bodies.len() >= MIN_BODY_SECTIONS {
            break;
        }
        if bodies.iter().any(|(h, _, _)| h.eq_ignore_ascii_case(&heading)) {
            continue;
        }
        bodies.push((heading, average_weight, Vec::new()));
    }

    let total = total_words.unwrap_or_else(|| {
        metrics
            .iter()
            .map(|m| m.content_length_needed)
            .max()
            .unwrap_or(base_length)
    });
    let conclusion_words = ((total as f64 * CONCLUSION_SHARE).round() as usize).max(MIN_SECTION_WORDS);
    let body_words = total.saturating_sub(conclusion_words) as f64;
    let weight_sum: f64 = bodies.iter().map(|(_, w, _)| *w).sum();

    let mut sections: Vec<OutlineSection> = bodies
        .into_iter()
        .map(|(heading, weight, keywords)| OutlineSection {
            heading,
            target_words: ((body_words * weight / weight_sum).round() as usize)
                .max(MIN_SECTION_WORDS),
            keywords,
        })
        .collect();

    sections.push(OutlineSection {
        heading: "Conclusion".to_string(),
        target_words: conclusion_words,
        keywords: Vec::new(),
    });

    Outline { title, sections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::{cluster_keywords, RawKeywordMetrics};

    fn metrics(items: &[(&str, u64, f64)]) -> Vec<KeywordMetrics> {
        items
            .iter()
            .map(|(k, v, c)| {
                KeywordMetrics::from_raw(
                    k,
                    &RawKeywordMetrics {
                        search_volume: *v,
                        competition: *c,
                        cpc: 1.0,
                    },
                    1500,
                    true,
                )
            })
            .collect()
    }

    #[test]
    fn test_single_keyword_gets_three_body_sections_and_conclusion() {
        let m = metrics(&[("dog grooming", 10_000, 0.5)]);
        let clusters = cluster_keywords(&m, 0.3);
        let outline = build_outline("dog grooming", &m, &clusters, Some(1000), 1500);

        assert_eq!(outline.title, "Dog Grooming");
        assert_eq!(outline.sections.len(), 4);
        assert_eq!(outline.sections[0].heading, "Dog Grooming");
        assert_eq!(outline.sections[3].heading, "Conclusion");
        let total = outline.total_words();
        assert!((990..=1010).contains(&total), "total {}", total);
    }

    #[test]
    fn test_harder_cluster_gets_more_words() {
        let m = metrics(&[
            ("easy niche phrase", 10, 0.05),
            ("insurance", 900_000, 0.95),
            ("aquarium filters", 1_000, 0.3),
        ]);
        let clusters = cluster_keywords(&m, 0.3);
        assert_eq!(clusters.len(), 3);
        let outline = build_outline("pets", &m, &clusters, Some(2000), 1500);
        let easy = outline.sections[0].target_words;
        let hard = outline.sections[1].target_words;
        assert!(hard > easy);
    }

    #[test]
    fn test_markdown_skeleton() {
        let outline = Outline {
            title: "T".to_string(),
            sections: vec![OutlineSection {
                heading: "A".to_string(),
                target_words: 100,
                keywords: vec![],
            }],
        };
        assert_eq!(outline.to_markdown(), "# T\n\n## A\n");
    }
}
