//! Consensus Generator
//!
//! 複数プロバイダーに同じプロンプトを並行送信し、セクションごとに
//! 最もスコアの高い候補を選んで1つのドラフトに統合します。

use super::markdown::{parse_headings, split_sections, Section, SectionedDocument};
use super::quality::{section_local_score, structure_violations, QualityScorer, ScoringContext};
use crate::error::{Error, Result};
use crate::llm::{ProviderPool, Usage};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 有効な候補
#[derive(Debug, Clone)]
struct Candidate {
    provider_index: usize,
    provider_name: String,
    text: String,
}

/// 統合から除外されたプロバイダー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedProvider {
    pub provider: String,
    pub reason: String,
}

/// セクションの採用元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProvenance {
    /// セクション見出し（H2より前の導入部は "preamble"）
    pub section: String,
    pub provider: String,
}

/// 合議ドラフト
#[derive(Debug, Clone)]
pub struct ConsensusDraft {
    pub text: String,
    /// 全成功呼び出しの合計使用量
    pub usage: Usage,
    /// 最も遅い呼び出しの所要時間
    pub latency: Duration,
    pub provenance: Vec<SectionProvenance>,
    pub excluded: Vec<ExcludedProvider>,
    /// 導入部（H1）を提供したプロバイダー。修復パスの送信先
    pub primary_provider: usize,
    /// セクション単位の統合を行ったか
    pub merged: bool,
    pub warnings: Vec<String>,
}

/// 合議ジェネレーター
pub struct ConsensusGenerator {
    pool: ProviderPool,
}

impl ConsensusGenerator {
    /// 新規ジェネレーターを作成
    pub fn new(pool: ProviderPool) -> Self {
        Self { pool }
    }

    /// 全プロバイダーでドラフトを生成して統合
    pub async fn generate(&self, prompt: &str, model_hint: Option<&str>) -> Result<ConsensusDraft> {
        if self.pool.is_empty() {
            return Err(Error::Config(
                "No text generation provider configured".to_string(),
            ));
        }

        let calls = self
            .pool
            .providers()
            .iter()
            .enumerate()
            .map(|(index, provider)| async move {
                let started = Instant::now();
                let result = self
                    .pool
                    .call_with_retry(provider.as_ref(), prompt, model_hint)
                    .await;
                (index, provider.name().to_string(), result, started.elapsed())
            });
        let responses = join_all(calls).await;

        let mut usage = Usage::default();
        let mut latency = Duration::ZERO;
        let mut excluded = Vec::new();
        let mut successes = Vec::new();
        for (index, name, result, elapsed) in responses {
            latency = latency.max(elapsed);
            match result {
                Ok(completion) => {
                    usage += completion.usage();
                    successes.push(Candidate {
                        provider_index: index,
                        provider_name: name,
                        text: completion.text,
                    });
                }
                Err(err) => {
                    warn!(provider = %name, error = %err, "Consensus provider failed");
                    excluded.push(ExcludedProvider {
                        provider: name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if successes.is_empty() {
            let reasons: Vec<String> = excluded
                .iter()
                .map(|e| format!("{}: {}", e.provider, e.reason))
                .collect();
            return Err(Error::ProviderOutage(reasons.join("; ")));
        }

        let mut warnings = Vec::new();
        let (valid, malformed): (Vec<Candidate>, Vec<Candidate>) = successes
            .into_iter()
            .partition(|c| h1_count(&c.text) == 1);
        for candidate in &malformed {
            excluded.push(ExcludedProvider {
                provider: candidate.provider_name.clone(),
                reason: format!(
                    "malformed draft with {} top-level headings",
                    h1_count(&candidate.text)
                ),
            });
        }

        let draft = |text: String,
                     primary: &Candidate,
                     provenance: Vec<SectionProvenance>,
                     merged: bool,
                     excluded: Vec<ExcludedProvider>,
                     warnings: Vec<String>| ConsensusDraft {
            text,
            usage,
            latency,
            provenance,
            excluded,
            primary_provider: primary.provider_index,
            merged,
            warnings,
        };

        if valid.is_empty() {
            // 全候補が不正な場合は構造違反が最も少ない候補を修復パスに回す
            let fallback = least_violations(&malformed);
            warnings.push(format!(
                "All consensus candidates were malformed; using draft from {}",
                fallback.provider_name
            ));
            let provenance = whole_provenance(fallback);
            return Ok(draft(
                fallback.text.clone(),
                fallback,
                provenance,
                false,
                excluded,
                warnings,
            ));
        }

        if valid.len() == 1 {
            let only = &valid[0];
            debug!(provider = %only.provider_name, "Single valid consensus candidate");
            let provenance = whole_provenance(only);
            return Ok(draft(
                only.text.clone(),
                only,
                provenance,
                false,
                excluded,
                warnings,
            ));
        }

        let (merged_text, provenance, primary) = merge_sections(&valid);
        if let Some(problem) = merge_problem(&merged_text) {
            let best = best_whole_candidate(&valid);
            warn!(problem = %problem, provider = %best.provider_name, "Consensus merge rejected");
            warnings.push(format!(
                "Consensus merge rejected ({}); using best single draft from {}",
                problem, best.provider_name
            ));
            let provenance = whole_provenance(best);
            return Ok(draft(
                best.text.clone(),
                best,
                provenance,
                false,
                excluded,
                warnings,
            ));
        }

        info!(
            candidates = valid.len(),
            sections = provenance.len(),
            latency_ms = latency.as_millis() as u64,
            "Consensus draft merged"
        );
        Ok(draft(
            merged_text,
            &valid[primary],
            provenance,
            true,
            excluded,
            warnings,
        ))
    }
}

fn h1_count(text: &str) -> usize {
    parse_headings(text).iter().filter(|h| h.level == 1).count()
}

fn least_violations(candidates: &[Candidate]) -> &Candidate {
    let mut best = &candidates[0];
    let mut best_count = structure_violations(&best.text).len();
    for candidate in &candidates[1..] {
        let count = structure_violations(&candidate.text).len();
        if count < best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

fn best_whole_candidate(candidates: &[Candidate]) -> &Candidate {
    let scorer = QualityScorer::new();
    let ctx = ScoringContext::default();
    let mut best = &candidates[0];
    let mut best_score = scorer.score(&best.text, &ctx).aggregate;
    for candidate in &candidates[1..] {
        let score = scorer.score(&candidate.text, &ctx).aggregate;
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

fn whole_provenance(candidate: &Candidate) -> Vec<SectionProvenance> {
    let doc = split_sections(&candidate.text);
    std::iter::once("preamble".to_string())
        .chain(doc.sections.iter().map(|s| s.heading.text.clone()))
        .map(|section| SectionProvenance {
            section,
            provider: candidate.provider_name.clone(),
        })
        .collect()
}

/// 論理セクション（導入部、k番目のH2）ごとに最高スコアの候補を選ぶ
///
/// 同点は先に登録されたプロバイダー。(統合テキスト, 採用元, 導入部の候補添字) を返す。
fn merge_sections(candidates: &[Candidate]) -> (String, Vec<SectionProvenance>, usize) {
    let docs: Vec<SectionedDocument> = candidates.iter().map(|c| split_sections(&c.text)).collect();

    let pick = |scores: Vec<(usize, f64)>| -> usize {
        let mut best = scores[0];
        for &(index, score) in &scores[1..] {
            if score > best.1 {
                best = (index, score);
            }
        }
        best.0
    };

    let preamble_owner = pick(
        docs.iter()
            .enumerate()
            .map(|(i, d)| (i, section_local_score(&d.preamble)))
            .collect(),
    );
    let mut provenance = vec![SectionProvenance {
        section: "preamble".to_string(),
        provider: candidates[preamble_owner].provider_name.clone(),
    }];

    let slots = docs.iter().map(|d| d.sections.len()).max().unwrap_or(0);
    let mut sections: Vec<Section> = Vec::new();
    for k in 0..slots {
        let scores: Vec<(usize, f64)> = docs
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.sections.get(k).map(|s| (i, section_local_score(&s.body))))
            .collect();
        let owner = pick(scores);
        let section = docs[owner].sections[k].clone();
        provenance.push(SectionProvenance {
            section: section.heading.text.clone(),
            provider: candidates[owner].provider_name.clone(),
        });
        sections.push(section);
    }

    let merged = SectionedDocument {
        preamble: docs[preamble_owner].preamble.clone(),
        sections,
    };
    (merged.to_markdown(), provenance, preamble_owner)
}

/// 統合結果の再検証（H1がちょうど1つ、H2見出しの重複なし）
fn merge_problem(text: &str) -> Option<String> {
    let headings = parse_headings(text);
    let h1 = headings.iter().filter(|h| h.level == 1).count();
    if h1 != 1 {
        return Some(format!("{} top-level headings", h1));
    }
    let mut seen = HashSet::new();
    for heading in headings.iter().filter(|h| h.level == 2) {
        if !seen.insert(heading.text.to_lowercase()) {
            return Some(format!("duplicate section '{}'", heading.text));
        }
    }
    None
}
