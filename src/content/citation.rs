//! Citation Generator
//!
//! トピックとキーワードから検索クエリを作り、権威あるソースを選んで
//! 本文の主張文に `([title](url))` 形式で挿入し、末尾に参考文献一覧を付与します。

use super::markdown::{
    self, blocks, extract_links, heading_of, is_prose_block, plain_text, tokens, Link,
};
use super::quality::{has_citation_marker, is_claim, is_references_heading, REFERENCES_HEADING};
use crate::cache::{CacheKey, PipelineCache};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "what", "with", "your", "you",
];

const MAX_TITLE_CHARS: usize = 90;

/// 検索結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// ドメインの優先方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainPreference {
    /// 教育機関・政府機関を優先
    Authoritative,
    /// 指定なし
    Any,
}

impl DomainPreference {
    fn as_str(&self) -> &'static str {
        match self {
            DomainPreference::Authoritative => "authoritative",
            DomainPreference::Any => "any",
        }
    }
}

/// 検索ソースのエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search source unavailable: {0}")]
    Unavailable(String),

    #[error("Search failed: {0}")]
    Failed(String),
}

/// Web検索ソース
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// クエリを検索し、関連度順の結果を返す
    async fn search(
        &self,
        query: &str,
        preference: DomainPreference,
    ) -> Result<Vec<SearchHit>, SearchError>;

    /// 利用可能かを確認
    async fn health_check(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// 引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub snippet: String,
    pub url: String,
    pub title: String,
    /// 本文中のマーカー位置（バイトオフセット、未挿入なら None）
    pub position: Option<usize>,
}

/// 引用生成の結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationOutcome {
    /// 引用挿入後のテキスト
    pub text: String,
    /// 本文に統合された引用
    pub citations: Vec<Citation>,
    /// 生成されたが本文に統合されなかった引用
    pub not_integrated: Vec<Citation>,
    /// 重複除去後の候補数
    pub candidates_found: usize,
    /// 実行したクエリ数
    pub queries: usize,
    /// 失敗したクエリ
    pub failed_queries: Vec<String>,
}

impl CitationOutcome {
    /// すべてのクエリが失敗したか
    pub fn all_queries_failed(&self) -> bool {
        self.queries > 0 && self.failed_queries.len() == self.queries
    }

    /// 統合された引用数
    pub fn integrated_count(&self) -> usize {
        self.citations.len()
    }
}

/// 引用ジェネレーター
pub struct CitationGenerator {
    source: Arc<dyn SearchSource>,
    cache: Arc<PipelineCache>,
    cap: usize,
    concurrency: usize,
    location: String,
    language: String,
    preference: DomainPreference,
    preferred_domains: Vec<String>,
}

impl CitationGenerator {
    /// 新規ジェネレーターを作成
    pub fn new(source: Arc<dyn SearchSource>, cache: Arc<PipelineCache>) -> Self {
        Self {
            source,
            cache,
            cap: 5,
            concurrency: 4,
            location: "us".to_string(),
            language: "en".to_string(),
            preference: DomainPreference::Authoritative,
            preferred_domains: Vec::new(),
        }
    }

    /// 挿入する引用数の上限
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// 同時検索数の上限
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// 検索ロケール
    pub fn with_locale(mut self, location: impl Into<String>, language: impl Into<String>) -> Self {
        self.location = location.into();
        self.language = language.into();
        self
    }

    /// ドメイン優先方針
    pub fn with_preference(mut self, preference: DomainPreference) -> Self {
        self.preference = preference;
        self
    }

    /// 最上位に扱う追加ドメイン
    pub fn with_preferred_domains(mut self, domains: Vec<String>) -> Self {
        self.preferred_domains = domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches("www.").to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// 検索ソースの疎通確認
    pub async fn health_check(&self) -> Result<(), SearchError> {
        self.source.health_check().await
    }

    /// 引用を検索・挿入する
    pub async fn generate(&self, text: &str, topic: &str, keywords: &[String]) -> CitationOutcome {
        let queries = build_queries(topic, keywords);
        let query_count = queries.len();

        let results: Vec<(String, Result<Vec<SearchHit>, SearchError>)> =
            stream::iter(queries)
                .map(|query| async move {
                    let key = CacheKey::new(
                        &format!("{}#{}", query, self.preference.as_str()),
                        &self.location,
                        &self.language,
                    );
                    let result = self
                        .cache
                        .serp()
                        .get_or_try_fetch(key, || self.source.search(&query, self.preference))
                        .await;
                    (query, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut failed_queries = Vec::new();
        let mut ranked_input = Vec::new();
        for (query_index, (query, result)) in results.into_iter().enumerate() {
            match result {
                Ok(hits) => {
                    for (rank, hit) in hits.into_iter().enumerate() {
                        ranked_input.push((query_index, rank, hit));
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Citation search failed");
                    failed_queries.push(query);
                }
            }
        }

        let candidates = rank_hits(ranked_input, &self.preferred_domains);
        let candidates_found = candidates.len();
        let selected: Vec<Citation> = candidates.into_iter().take(self.cap).collect();
        debug!(
            candidates = candidates_found,
            selected = selected.len(),
            "Ranked citation candidates"
        );

        let text = insert_citations(text, &selected);
        let (citations, not_integrated) = scan_integration(&text, &selected);

        info!(
            integrated = citations.len(),
            not_integrated = not_integrated.len(),
            failed_queries = failed_queries.len(),
            "Citation generation complete"
        );

        CitationOutcome {
            text,
            citations,
            not_integrated,
            candidates_found,
            queries: query_count,
            failed_queries,
        }
    }
}

/// サブトピッククエリ（トピック、トピック + 各キーワード）
pub fn build_queries(topic: &str, keywords: &[String]) -> Vec<String> {
    let topic = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut seen = HashSet::new();
    let mut queries = Vec::new();

    let mut push = |query: String| {
        if !query.is_empty() && seen.insert(query.to_lowercase()) {
            queries.push(query);
        }
    };

    push(topic.clone());
    for keyword in keywords {
        let keyword = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
        if keyword.is_empty() || topic.to_lowercase().contains(&keyword.to_lowercase()) {
            continue;
        }
        push(format!("{} {}", topic, keyword));
    }
    queries
}

fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    let mut normalized = url.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    Some(
        normalized
            .replace(' ', "%20")
            .replace('(', "%28")
            .replace(')', "%29"),
    )
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
        .unwrap_or_default()
}

/// ドメインの権威ティア（小さいほど優先）
pub fn authority_tier(url: &str, preferred_domains: &[String]) -> u8 {
    let host = host_of(url);
    let matches_domain = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

    if preferred_domains.iter().any(|d| matches_domain(d))
        || host.ends_with(".edu")
        || host.ends_with(".gov")
        || host.contains(".edu.")
        || host.contains(".gov.")
    {
        0
    } else if host.ends_with(".org") || host.contains(".org.") {
        1
    } else {
        2
    }
}

fn sanitize_title(title: &str, url: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return host_of(url);
    }
    if cleaned.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
        return format!("{}...", truncated.trim_end());
    }
    cleaned
}

/// 検索結果を重複除去して順位付け
///
/// 入力は (クエリ順, クエリ内順位, 結果)。ティア → クエリ順 → 順位 の順に並べる。
pub fn rank_hits(
    hits: Vec<(usize, usize, SearchHit)>,
    preferred_domains: &[String],
) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<(u8, usize, usize, Citation)> = Vec::new();

    for (query_index, rank, hit) in hits {
        let Some(url) = normalize_url(&hit.url) else {
            debug!(url = %hit.url, "Skipping malformed search result URL");
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let tier = authority_tier(&url, preferred_domains);
        candidates.push((
            tier,
            query_index,
            rank,
            Citation {
                snippet: hit.snippet.trim().to_string(),
                title: sanitize_title(&hit.title, &url),
                url,
                position: None,
            },
        ));
    }

    candidates.sort_by_key(|(tier, query_index, rank, _)| (*tier, *query_index, *rank));
    candidates.into_iter().map(|(_, _, _, c)| c).collect()
}

fn citation_marker(citation: &Citation) -> String {
    format!(" ([{}]({}))", citation.title, citation.url)
}

struct DocBlock {
    text: String,
    /// 0 = 最初のH2より前、k = k番目のH2セクション
    section: usize,
}

/// 挿入対象の本文ブロックと、既存の参考文献セクションにあったリンク
struct Document {
    blocks: Vec<DocBlock>,
    existing_references: Vec<Link>,
}

fn document_blocks(text: &str) -> Document {
    let mut section = 0;
    let mut in_references = false;
    let mut blocks_out = Vec::new();
    let mut existing_references = Vec::new();

    for block in blocks(text) {
        if let Some((2, heading)) = block.lines().next().and_then(heading_of) {
            in_references = is_references_heading(&heading);
            if !in_references {
                section += 1;
            }
        }
        if in_references {
            existing_references.extend(extract_links(&block));
            continue;
        }
        blocks_out.push(DocBlock {
            text: block,
            section,
        });
    }
    Document {
        blocks: blocks_out,
        existing_references,
    }
}

fn content_tokens(text: &str) -> HashSet<String> {
    tokens(&plain_text(text))
        .into_iter()
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn insert_marker(sentence: &str, marker: &str) -> String {
    let trimmed = sentence.trim_end();
    match trimmed.char_indices().last() {
        Some((i, c)) if matches!(c, '.' | '!' | '?') => {
            format!("{}{}{}", &trimmed[..i], marker, c)
        }
        _ => format!("{}{}", trimmed, marker),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Placement {
    MatchingClaim,
    UncitedInSection,
    MatchingClaimAnywhere,
    UncitedAnywhere,
}

/// 引用を本文へ挿入し、参考文献一覧を付与
///
/// 既存の参考文献セクションは1つの一覧にまとめ直し、元のリンクは生成した引用の後ろに残す。
/// 引用が空なら本文には手を加えない。
pub fn insert_citations(text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }
    let Document {
        blocks: mut doc,
        existing_references,
    } = document_blocks(text);

    for citation in citations {
        let topic_tokens = content_tokens(&format!("{} {}", citation.title, citation.snippet));

        let section_count = doc.iter().map(|b| b.section).max().unwrap_or(0);
        let best_section = (0..=section_count)
            .map(|section| {
                let section_text: String = doc
                    .iter()
                    .filter(|b| b.section == section)
                    .map(|b| b.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let overlap = content_tokens(&section_text)
                    .intersection(&topic_tokens)
                    .count();
                (section, overlap)
            })
            // 同点は先のセクション
            .fold((0, 0), |best, (section, overlap)| {
                if overlap > best.1 {
                    (section, overlap)
                } else {
                    best
                }
            })
            .0;

        let mut choice: Option<(Placement, usize, usize)> = None;
        for (block_index, block) in doc.iter().enumerate() {
            if !is_prose_block(&block.text) {
                continue;
            }
            for (sentence_index, sentence) in markdown::sentences(&block.text).iter().enumerate() {
                if has_citation_marker(sentence) {
                    continue;
                }
                let plain = plain_text(sentence);
                let claim = is_claim(&plain);
                let matches_topic = content_tokens(sentence)
                    .intersection(&topic_tokens)
                    .next()
                    .is_some();
                let in_section = block.section == best_section;

                let placement = match (in_section, claim && matches_topic) {
                    (true, true) => Placement::MatchingClaim,
                    (true, false) => Placement::UncitedInSection,
                    (false, true) => Placement::MatchingClaimAnywhere,
                    (false, false) => Placement::UncitedAnywhere,
                };
                if choice.map(|(p, _, _)| placement < p).unwrap_or(true) {
                    choice = Some((placement, block_index, sentence_index));
                }
            }
        }

        let Some((_, block_index, sentence_index)) = choice else {
            debug!(url = %citation.url, "No sentence available for citation");
            continue;
        };

        let block = &mut doc[block_index];
        let mut sentences = markdown::sentences(&block.text);
        sentences[sentence_index] =
            insert_marker(&sentences[sentence_index], &citation_marker(citation));
        block.text = sentences.join(" ");
    }

    let mut out = doc
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut seen: HashSet<&str> = HashSet::new();
    let list = citations
        .iter()
        .map(|c| (c.title.as_str(), c.url.as_str()))
        .chain(
            existing_references
                .iter()
                .map(|link| (link.text.as_str(), link.url.as_str())),
        )
        .filter(|&(_, url)| seen.insert(url))
        .enumerate()
        .map(|(i, (title, url))| format!("{}. [{}]({})", i + 1, title, url))
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str(&format!("\n\n## {}\n\n", REFERENCES_HEADING));
    out.push_str(&list);
    out.push('\n');
    out
}

/// 参考文献セクションの開始位置（バイトオフセット）
fn references_offset(text: &str) -> usize {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if let Some((2, heading)) = heading_of(line.trim_end_matches('\n')) {
            if is_references_heading(&heading) {
                return offset;
            }
        }
        offset += line.len();
    }
    text.len()
}

/// 本文（参考文献一覧を除く）に統合された外部リンクURL（重複なし、出現順）
pub fn integrated_urls(text: &str) -> Vec<String> {
    let end = references_offset(text);
    let mut seen = HashSet::new();
    extract_links(text)
        .into_iter()
        .filter(|link| link.offset < end)
        .filter(|link| link.url.starts_with("http://") || link.url.starts_with("https://"))
        .filter(|link| seen.insert(link.url.clone()))
        .map(|link| link.url)
        .collect()
}

/// 引用が本文に統合されているかを走査
///
/// (統合済み, 未統合) を返す。統合済みには本文中の位置を設定する。
pub fn scan_integration(text: &str, citations: &[Citation]) -> (Vec<Citation>, Vec<Citation>) {
    let end = references_offset(text);
    let links: Vec<_> = extract_links(text)
        .into_iter()
        .filter(|link| link.offset < end)
        .collect();

    let mut integrated = Vec::new();
    let mut missing = Vec::new();
    for citation in citations {
        match links.iter().find(|link| link.url == citation.url) {
            Some(link) => integrated.push(Citation {
                position: Some(link.offset),
                ..citation.clone()
            }),
            None => missing.push(Citation {
                position: None,
                ..citation.clone()
            }),
        }
    }
    (integrated, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ARTICLE: &str = "# Dog Grooming\n\n\
Grooming matters for every dog.\n\n\
## Brushing\n\n\
Brushing removes 90% of loose hair. Do it weekly.\n\n\
Long coats tangle quickly.\n\n\
## Bathing\n\n\
Vets suggest a bath every 4 weeks for shampoo safety. Rinse well.\n\n\
Dry the coat fully.\n\n\
## Conclusion\n\n\
Grooming is simple with practice.\n\n\
Start small.\n";

    struct StaticSource {
        hits: Vec<SearchHit>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchSource for StaticSource {
        async fn search(
            &self,
            _query: &str,
            _preference: DomainPreference,
        ) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    struct DownSource;

    #[async_trait]
    impl SearchSource for DownSource {
        async fn search(
            &self,
            _query: &str,
            _preference: DomainPreference,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::Unavailable("offline".to_string()))
        }
    }

    fn hit(title: &str, url: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn test_build_queries_dedupes() {
        let queries = build_queries(
            "dog grooming",
            &["brushing".to_string(), "Brushing".to_string(), "grooming".to_string()],
        );
        assert_eq!(queries, vec!["dog grooming", "dog grooming brushing"]);
    }

    #[test]
    fn test_rank_prefers_authoritative_domains() {
        let ranked = rank_hits(
            vec![
                (0, 0, hit("Blog", "https://blog.example.com/a", "")),
                (0, 1, hit("Org", "https://akc.org/grooming", "")),
                (1, 0, hit("Gov", "https://www.usda.gov/pets", "")),
                (1, 1, hit("Dup", "https://blog.example.com/a/", "")),
            ],
            &[],
        );
        let urls: Vec<_> = ranked.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.usda.gov/pets",
                "https://akc.org/grooming",
                "https://blog.example.com/a"
            ]
        );
    }

    #[test]
    fn test_preferred_domain_is_top_tier() {
        assert_eq!(authority_tier("https://vetstreet.com/x", &["vetstreet.com".to_string()]), 0);
        assert_eq!(authority_tier("https://vetstreet.com/x", &[]), 2);
        assert_eq!(authority_tier("https://ox.ac.uk/x", &[]), 2);
        assert_eq!(authority_tier("https://nih.gov.au/x", &[]), 0);
    }

    #[test]
    fn test_title_sanitized_for_markdown() {
        let ranked = rank_hits(
            vec![(0, 0, hit("[Guide] to\nbrushing", "https://a.edu/x_(1)", ""))],
            &[],
        );
        assert_eq!(ranked[0].title, "Guide to brushing");
        assert_eq!(ranked[0].url, "https://a.edu/x_%281%29");
    }

    #[test]
    fn test_insert_prefers_matching_claim_in_relevant_section() {
        let citation = Citation {
            snippet: "How often to bath a dog with shampoo".to_string(),
            url: "https://vet.edu/bath".to_string(),
            title: "Bathing Guide".to_string(),
            position: None,
        };
        let text = insert_citations(ARTICLE, &[citation.clone()]);
        assert!(text.contains(
            "every 4 weeks for shampoo safety ([Bathing Guide](https://vet.edu/bath))."
        ));
        assert!(text.contains("## References\n\n1. [Bathing Guide](https://vet.edu/bath)"));

        let (integrated, missing) = scan_integration(&text, &[citation]);
        assert_eq!(integrated.len(), 1);
        assert!(missing.is_empty());
        let position = integrated[0].position.unwrap();
        assert!(text[position..].starts_with("[Bathing Guide]"));
    }

    #[test]
    fn test_integrated_urls_excludes_reference_list() {
        let text = "# T\n\nA claim ([S](https://a.gov/x)).\n\n## References\n\n1. [S](https://a.gov/x)\n2. [Other](https://b.org/y)\n";
        assert_eq!(integrated_urls(text), vec!["https://a.gov/x".to_string()]);
    }

    #[test]
    fn test_existing_references_replaced() {
        let citation = Citation {
            snippet: String::new(),
            url: "https://a.gov/x".to_string(),
            title: "S".to_string(),
            position: None,
        };
        let once = insert_citations(ARTICLE, &[citation.clone()]);
        let twice = insert_citations(&once, &[citation]);
        assert_eq!(twice.matches("## References").count(), 1);
        assert_eq!(twice.matches("https://a.gov/x)\n").count(), 1);
    }

    #[test]
    fn test_draft_sources_kept_without_citations() {
        let draft = format!(
            "{}\n## Sources\n\n- [Kennel Club](https://www.thekennelclub.org.uk/grooming)\n",
            ARTICLE
        );
        let text = insert_citations(&draft, &[]);
        assert_eq!(text, draft);
        assert!(text.contains("## Sources"));
        assert!(text.contains("https://www.thekennelclub.org.uk/grooming"));
    }

    #[test]
    fn test_draft_sources_merged_into_reference_list() {
        let draft = format!(
            "{}\n## Sources\n\n- [Kennel Club](https://www.thekennelclub.org.uk/grooming)\n",
            ARTICLE
        );
        let citation = Citation {
            snippet: "How often to bath a dog with shampoo".to_string(),
            url: "https://vet.edu/bath".to_string(),
            title: "Bathing Guide".to_string(),
            position: None,
        };
        let text = insert_citations(&draft, &[citation]);
        assert!(!text.contains("## Sources"));
        assert!(text.contains(
            "## References\n\n1. [Bathing Guide](https://vet.edu/bath)\n\
             2. [Kennel Club](https://www.thekennelclub.org.uk/grooming)\n"
        ));
    }

    #[test]
    fn test_citation_without_prose_is_not_integrated() {
        let outline_only = "# Dog Grooming\n\n## Brushing\n\n- Weekly brushing\n- Soft brush\n";
        let citation = Citation {
            snippet: "brushing".to_string(),
            url: "https://vet.edu/brush".to_string(),
            title: "Brushing Study".to_string(),
            position: None,
        };
        let text = insert_citations(outline_only, &[citation.clone()]);
        let (integrated, missing) = scan_integration(&text, &[citation]);
        assert!(integrated.is_empty());
        assert_eq!(missing.len(), 1);
        assert!(missing[0].position.is_none());
        assert!(text.contains("1. [Brushing Study](https://vet.edu/brush)"));
    }

    #[tokio::test]
    async fn test_generate_integrates_and_caches() {
        let source = Arc::new(StaticSource {
            hits: vec![
                hit("Brushing Study", "https://vet.edu/brush", "brushing loose hair study"),
                hit("Bath Advice", "https://dogs.org/bath", "bath weeks shampoo"),
            ],
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(PipelineCache::default());
        let generator = CitationGenerator::new(source.clone(), cache.clone()).with_cap(5);
        let keywords = vec!["brushing".to_string()];

        let outcome = generator.generate(ARTICLE, "dog grooming", &keywords).await;
        assert_eq!(outcome.candidates_found, 2);
        assert_eq!(outcome.integrated_count(), 2);
        assert!(outcome.not_integrated.is_empty());
        assert_eq!(integrated_urls(&outcome.text).len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        generator.generate(ARTICLE, "dog grooming", &keywords).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generate_reports_failed_queries() {
        let generator = CitationGenerator::new(Arc::new(DownSource), Arc::new(PipelineCache::default()));
        let outcome = generator.generate(ARTICLE, "dog grooming", &[]).await;
        assert!(outcome.all_queries_failed());
        assert!(outcome.citations.is_empty());
        assert!(!outcome.text.contains("## References"));
    }
}
