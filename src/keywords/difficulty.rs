//! Difficulty model
//!
//! 検索ボリュームと競合度からキーワード難易度と関連指標を算出します。
//! すべて純粋関数で、同じ入力には同じ値を返します。

use serde::{Deserialize, Serialize};

const VOLUME_SATURATION: f64 = 1_000_000.0;
const COMPETITION_WEIGHT: f64 = 0.65;
const VOLUME_WEIGHT: f64 = 0.35;

/// 被リンク数の目安
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklinkTier {
    Low,
    Medium,
    High,
}

/// 順位到達確率（上位10位以内）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingProbability {
    pub one_month: f64,
    pub three_months: f64,
    pub six_months: f64,
}

/// 難易度（0-100）
///
/// 競合度と検索ボリュームの対数の加重和。どちらの入力に対しても単調非減少。
pub fn difficulty(search_volume: u64, competition: f64) -> f64 {
    let competition = if competition.is_finite() {
        competition.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let volume = ((1.0 + search_volume as f64).ln() / (1.0 + VOLUME_SATURATION).ln()).min(1.0);
    (100.0 * (COMPETITION_WEIGHT * competition + VOLUME_WEIGHT * volume)).clamp(0.0, 100.0)
}

/// 必要なドメインオーソリティ
pub fn domain_authority_required(difficulty: f64) -> f64 {
    10.0 + 0.8 * difficulty.clamp(0.0, 100.0)
}

/// 被リンクティア
pub fn backlink_tier(difficulty: f64) -> BacklinkTier {
    if difficulty < 33.0 {
        BacklinkTier::Low
    } else if difficulty < 66.0 {
        BacklinkTier::Medium
    } else {
        BacklinkTier::High
    }
}

/// 必要な被リンク数の推定
pub fn backlinks_needed(difficulty: f64) -> u32 {
    let d = difficulty.clamp(0.0, 100.0);
    (d * d / 100.0).ceil() as u32
}

/// 上位表示に必要なコンテンツ長（語）
pub fn content_length_needed(base_length: usize, difficulty: f64) -> usize {
    (base_length as f64 * (1.0 + difficulty.clamp(0.0, 100.0) / 100.0)).round() as usize
}

/// `months` か月後に上位表示される確率
///
/// 月数に対して非減少、難易度に対して非増加。
pub fn ranking_probability(difficulty: f64, months: f64) -> f64 {
    let d = difficulty.clamp(0.0, 100.0);
    let months = months.max(0.0);
    let ceiling = 1.0 - 0.9 * d / 100.0;
    let tau = 1.0 + d / 25.0;
    (ceiling * (1.0 - (-months / tau).exp())).clamp(0.0, 1.0)
}

/// 1・3・6か月の到達確率
pub fn ranking_schedule(difficulty: f64) -> RankingProbability {
    RankingProbability {
        one_month: ranking_probability(difficulty, 1.0),
        three_months: ranking_probability(difficulty, 3.0),
        six_months: ranking_probability(difficulty, 6.0),
    }
}
