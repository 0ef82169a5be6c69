//! 統合テスト共通のスクリプト化プロバイダーと検索ソース

#![allow(dead_code)]

use async_trait::async_trait;
use content_pipeline::content::{DomainPreference, SearchError, SearchHit, SearchSource};
use content_pipeline::llm::{Completion, ProviderError, ProviderGateway, ProviderResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DOG_GROOMING_ARTICLE: &str = "# Dog Grooming Tips

Dog grooming keeps your pet happy. Good pet care starts at home. This guide covers the basics.

## Brushing

Brush your dog each week. It stops mats.

Short coats need less time. Long coats need more.

## Bathing

Bathe your dog once a month. Use a mild soap.

Rinse well so the skin stays calm.

## Nails and Ears

Trim nails when they click on the floor. Check ears for dirt.

Ask your vet if you see red skin.

## Conclusion

Small habits make grooming easy. Why not start today?

Try one tip this week and see the change.
";

/// 箇条書きだけで構成されたドラフト（引用を挿入できる文がない）
pub const CHECKLIST_ARTICLE: &str = "# Dog Grooming Checklist

## Brushing

- Brush your dog each week
- Use a soft brush

- Short coats need less time
- Long coats need more

## Bathing

- Bathe your dog once a month
- Use a mild soap

- Rinse well
- Dry the coat

## Nails and Ears

- Trim nails when they click
- Check ears for dirt

- Ask your vet about red skin
- Keep treats nearby

## Conclusion

- Small habits make grooming easy
- Start with one tip

- Pet care gets easier with practice
- Share tips with friends
";

/// H1が2つある不正なドラフト
pub const DUPLICATE_H1_ARTICLE: &str = "# Dog Grooming Tips

Intro text for the article.

# Another Title

## Brushing

Brush often. Keep it short.

Use a soft brush.

## Bathing

Bathe monthly.

Dry well.

## Conclusion

Start today.

Share your tips.
";

/// H2が足りないドラフト
pub const THIN_ARTICLE: &str = "# Dog Grooming Tips

Dog grooming is simple.

## Brushing

Brush every week.
";

/// 見出しと段落数は同じだが読みにくく、キーワードもない書き換え
pub const DEGRADED_ARTICLE: &str = "# Dog Grooming Tips

Comprehensive institutional methodologies necessitate extraordinarily meticulous considerations. Organizational responsibilities predominantly characterize professionalization.

## Brushing

Comprehensive institutional methodologies necessitate extraordinarily meticulous considerations.

Organizational responsibilities predominantly characterize professionalization.

## Bathing

Comprehensive institutional methodologies necessitate extraordinarily meticulous considerations.

Organizational responsibilities predominantly characterize professionalization.

## Nails and Ears

Comprehensive institutional methodologies necessitate extraordinarily meticulous considerations.

Organizational responsibilities predominantly characterize professionalization.

## Conclusion

Comprehensive institutional methodologies necessitate extraordinarily meticulous considerations.

Organizational responsibilities predominantly characterize professionalization.
";

/// プロンプトの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Draft,
    Repair,
    Simplify,
    Density,
    MetaTitle,
    MetaDescription,
}

pub fn classify(prompt: &str) -> PromptKind {
    if prompt.starts_with("Write an SEO title") {
        PromptKind::MetaTitle
    } else if prompt.starts_with("Write a meta description") {
        PromptKind::MetaDescription
    } else if prompt.starts_with("Revise the following") {
        PromptKind::Repair
    } else if prompt.starts_with("Rewrite the following") {
        PromptKind::Simplify
    } else if prompt.starts_with("Lightly edit") {
        PromptKind::Density
    } else {
        PromptKind::Draft
    }
}

/// プロンプトに埋め込まれた記事本文を取り出す
pub fn embedded_article(prompt: &str) -> String {
    let start = prompt.find("Article:\n\n").map(|i| i + "Article:\n\n".len());
    let end = prompt.rfind("\n\nReturn only");
    match (start, end) {
        (Some(start), Some(end)) if start <= end => prompt[start..end].to_string(),
        _ => String::new(),
    }
}

/// プロンプト種別ごとに応答を返すプロバイダー
pub struct ScriptedProvider {
    name: String,
    drafts: Mutex<Vec<String>>,
    repair: Option<String>,
    density: Option<String>,
    draft_delay: Duration,
    failure: Option<ProviderError>,
    cancel_on_draft: Option<CancellationToken>,
    calls: AtomicUsize,
    kinds: Mutex<Vec<PromptKind>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, draft: &str) -> Self {
        Self {
            name: name.to_string(),
            drafts: Mutex::new(vec![draft.to_string()]),
            repair: None,
            density: None,
            draft_delay: Duration::ZERO,
            failure: None,
            cancel_on_draft: None,
            calls: AtomicUsize::new(0),
            kinds: Mutex::new(Vec::new()),
        }
    }

    /// 常に失敗するプロバイダー
    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(name, "")
        }
    }

    pub fn with_repair(mut self, text: &str) -> Self {
        self.repair = Some(text.to_string());
        self
    }

    pub fn with_density_rewrite(mut self, text: &str) -> Self {
        self.density = Some(text.to_string());
        self
    }

    pub fn with_draft_delay(mut self, delay: Duration) -> Self {
        self.draft_delay = delay;
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_draft = Some(token);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<PromptKind> {
        self.kinds.lock().unwrap().clone()
    }

    fn next_draft(&self) -> String {
        let mut drafts = self.drafts.lock().unwrap();
        if drafts.len() > 1 {
            drafts.remove(0)
        } else {
            drafts[0].clone()
        }
    }
}

#[async_trait]
impl ProviderGateway for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str, _model_hint: Option<&str>) -> ProviderResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = classify(prompt);
        self.kinds.lock().unwrap().push(kind);

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let text = match kind {
            PromptKind::Draft => {
                if !self.draft_delay.is_zero() {
                    tokio::time::sleep(self.draft_delay).await;
                }
                if let Some(token) = &self.cancel_on_draft {
                    token.cancel();
                }
                self.next_draft()
            }
            PromptKind::Repair => self
                .repair
                .clone()
                .unwrap_or_else(|| embedded_article(prompt)),
            PromptKind::Simplify => embedded_article(prompt),
            PromptKind::Density => self
                .density
                .clone()
                .unwrap_or_else(|| embedded_article(prompt)),
            PromptKind::MetaTitle => "Dog Grooming Tips: A Simple Pet Care Guide".to_string(),
            PromptKind::MetaDescription => {
                "Meta description: Easy dog grooming habits for brushing, bathing and nail care at home."
                    .to_string()
            }
        };

        Ok(Completion {
            text,
            tokens_used: 100,
            cost: 0.002,
            latency: Duration::from_millis(1),
        })
    }
}

/// 固定の検索結果を返す検索ソース
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    healthy: bool,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            healthy: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// 疎通確認に失敗する検索ソース
    pub fn unavailable() -> Self {
        Self {
            hits: Vec::new(),
            healthy: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchSource for StaticSearch {
    async fn search(
        &self,
        _query: &str,
        _preference: DomainPreference,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy {
            return Err(SearchError::Unavailable("connection refused".to_string()));
        }
        Ok(self.hits.clone())
    }

    async fn health_check(&self) -> Result<(), SearchError> {
        if self.healthy {
            Ok(())
        } else {
            Err(SearchError::Unavailable("connection refused".to_string()))
        }
    }
}

/// 権威ある（.edu/.gov）グルーミング関連の検索結果
pub fn grooming_hits() -> Vec<SearchHit> {
    let sources = [
        ("Coat Care", "https://vet.cornell.edu/coat-care", "Brushing a dog coat each week prevents mats."),
        ("Bathing Dogs", "https://extension.umn.edu/bathing-dogs", "Bathe a dog with a mild soap."),
        ("Nail Health", "https://www.avma.gov/nail-health", "Trim dog nails before they click on the floor."),
        ("Ear Checks", "https://vetmed.tamu.edu/ear-checks", "Check dog ears for dirt and red skin."),
        ("Grooming Basics", "https://www.fda.gov/grooming-basics", "Dog grooming habits support pet care at home."),
        ("Pet Care", "https://www.aspca.org/pet-care", "Pet care tips for owners."),
    ];
    sources
        .iter()
        .map(|(title, url, snippet)| SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        })
        .collect()
}
