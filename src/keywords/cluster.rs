//! Keyword clustering
//!
//! 類似度 = 0.6 × トークンJaccard + 0.4 × 文字トライグラムDice。
//! 入力順に貪欲に割り当て、最も類似する親を持つクラスタに入れる（同点は先のクラスタ）。

use super::KeywordMetrics;
use crate::content::markdown::tokens;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const TOKEN_WEIGHT: f64 = 0.6;
const TRIGRAM_WEIGHT: f64 = 0.4;

/// キーワードクラスタ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCluster {
    /// 代表キーワード（クラスタの最初のキーワード）
    pub parent_topic: String,
    pub keywords: Vec<String>,
    /// メンバー間の平均類似度（単独クラスタは 1.0）
    pub cluster_score: f64,
    pub total_volume: u64,
    pub average_difficulty: f64,
}

fn char_trigrams(text: &str) -> HashSet<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < 3 {
        return std::iter::once(normalized).filter(|s| !s.is_empty()).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// 2つのキーワードの類似度（0.0-1.0）
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta: HashSet<String> = tokens(a).into_iter().collect();
    let tb: HashSet<String> = tokens(b).into_iter().collect();
    let union = ta.union(&tb).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        ta.intersection(&tb).count() as f64 / union as f64
    };

    let ga = char_trigrams(a);
    let gb = char_trigrams(b);
    let total = ga.len() + gb.len();
    let dice = if total == 0 {
        0.0
    } else {
        2.0 * ga.intersection(&gb).count() as f64 / total as f64
    };

    TOKEN_WEIGHT * jaccard + TRIGRAM_WEIGHT * dice
}

/// キーワードをグループ化し、各クラスタのメンバー添字を返す
pub fn group_keywords(keywords: &[String], threshold: f64) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (index, keyword) in keywords.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (group_index, group) in groups.iter().enumerate() {
            let score = similarity(&keywords[group[0]], keyword);
            if score >= threshold && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((group_index, score));
            }
        }
        match best {
            Some((group_index, _)) => groups[group_index].push(index),
            None => groups.push(vec![index]),
        }
    }

    groups
}

fn cohesion(members: &[&str]) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            total += similarity(members[i], members[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// メトリクス付きキーワードをクラスタ化
pub fn cluster_keywords(metrics: &[KeywordMetrics], threshold: f64) -> Vec<KeywordCluster> {
    let keywords: Vec<String> = metrics.iter().map(|m| m.keyword.clone()).collect();

    group_keywords(&keywords, threshold)
        .into_iter()
        .map(|group| {
            let members: Vec<&KeywordMetrics> = group.iter().map(|&i| &metrics[i]).collect();
            let names: Vec<&str> = members.iter().map(|m| m.keyword.as_str()).collect();
            KeywordCluster {
                parent_topic: names[0].to_string(),
                keywords: names.iter().map(|s| s.to_string()).collect(),
                cluster_score: cohesion(&names),
                total_volume: members.iter().map(|m| m.search_volume).sum(),
                average_difficulty: members.iter().map(|m| m.difficulty).sum::<f64>()
                    / members.len() as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::RawKeywordMetrics;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_similarity_range() {
        assert!((similarity("dog grooming", "dog grooming") - 1.0).abs() < 1e-9);
        assert_eq!(similarity("dog", "zebra"), 0.0);
        let partial = similarity("dog grooming", "dog grooming tools");
        assert!(partial > 0.3 && partial < 1.0);
    }

    #[test]
    fn test_every_keyword_in_exactly_one_group() {
        let keywords = strings(&[
            "dog grooming",
            "cat food",
            "dog grooming tools",
            "best cat food",
            "aquarium filters",
        ]);
        let groups = group_keywords(&keywords, 0.3);
        let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }

    #[test]
    fn test_ties_go_to_earliest_group() {
        let keywords = strings(&["dog", "cat", "dog cat"]);
        assert_eq!(similarity("dog", "dog cat"), similarity("cat", "dog cat"));
        let groups = group_keywords(&keywords, 0.3);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);

        let keywords = strings(&["red", "blue", "red"]);
        let groups = group_keywords(&keywords, 0.3);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_singleton_cluster_score() {
        let metrics = vec![KeywordMetrics::from_raw(
            "aquarium filters",
            &RawKeywordMetrics {
                search_volume: 500,
                competition: 0.2,
                cpc: 0.4,
            },
            1500,
            true,
        )];
        let clusters = cluster_keywords(&metrics, 0.3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cluster_score, 1.0);
        assert_eq!(clusters[0].total_volume, 500);
        assert_eq!(clusters[0].parent_topic, "aquarium filters");
    }
}
