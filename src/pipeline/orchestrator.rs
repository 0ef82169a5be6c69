//! Stage Orchestrator
//!
//! Research → Draft → Enhance → Polish の状態機械。各ステージの後に品質スコアを計算し、
//! 集計スコアが閾値を超えて低下した場合は前ステージのテキストを引き継ぎます。

use super::request::GenerationRequest;
use super::result::GenerationResult;
use super::stage::{Stage, StageOutcome, StageResult};
use crate::cache::PipelineCache;
use crate::config::{PipelineConfig, StyleConfig};
use crate::content::citation::{scan_integration, Citation, CitationGenerator, SearchSource};
use crate::content::consensus::{ConsensusGenerator, SectionProvenance};
use crate::content::enhance::{accept_simplification, inject_experience};
use crate::content::markdown::word_count;
use crate::content::prompt::{self, ContentPrompt};
use crate::content::quality::{
    flesch_reading_ease, structure_violations, QualityReport, QualityScorer, ScoringContext,
};
use crate::content::seo::{self, SeoSuggestion, META_DESCRIPTION_MAX, META_TITLE_MAX};
use crate::error::{Error, Result};
use crate::keywords::outline::title_case;
use crate::keywords::{build_outline, KeywordAnalysis, KeywordEngine, KeywordMetricsSource, Outline};
use crate::llm::{ProviderGateway, ProviderPool, Usage};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// キャンセルと競合させてフューチャーを実行
///
/// キャンセルされた場合、実行中のフューチャー（プロバイダー・検索呼び出し）は破棄される。
async fn guarded<F: Future>(cancel: &CancellationToken, stage: Stage, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(stage = %stage, "Generation cancelled in flight");
            Err(Error::Cancelled(stage.to_string()))
        }
        output = future => Ok(output),
    }
}

/// 1回の実行の作業状態
struct RunState<'a> {
    request: &'a GenerationRequest,
    style: StyleConfig,
    location: String,
    language: String,
    model_hint: Option<String>,
    citations: Option<CitationGenerator>,
    analysis: KeywordAnalysis,
    outline: Option<Outline>,
    /// ドラフトを書いたプロバイダー（修復パスの送信先）
    primary_provider: usize,
    provenance: Vec<SectionProvenance>,
    /// 生成した全引用（統合の有無は最終テキストで再判定する）
    generated_citations: Vec<Citation>,
    structure_issues: Vec<String>,
    meta_title: Option<String>,
    meta_description: Option<String>,
    seo_suggestions: Vec<SeoSuggestion>,
    warnings: Vec<String>,
    stages: Vec<StageResult>,
}

impl RunState<'_> {
    fn last_content_stage(&self) -> Option<&StageResult> {
        self.stages
            .iter()
            .rev()
            .find(|s| matches!(s.stage, Stage::Draft | Stage::Enhance | Stage::Polish))
    }

    fn current_text(&self) -> &str {
        self.last_content_stage()
            .map(|s| s.text.as_str())
            .unwrap_or_default()
    }

    fn next_version(&self) -> u32 {
        self.stages.len() as u32 + 1
    }
}

/// オーケストレーターのビルダー
#[derive(Default)]
pub struct OrchestratorBuilder {
    providers: Vec<Arc<dyn ProviderGateway>>,
    search: Option<Arc<dyn SearchSource>>,
    metrics: Option<Arc<dyn KeywordMetricsSource>>,
    cache: Option<Arc<PipelineCache>>,
    style_template: StyleConfig,
    organization: StyleConfig,
    config: PipelineConfig,
}

impl OrchestratorBuilder {
    /// プロバイダーを追加（追加順が優先順位）
    pub fn with_provider(mut self, provider: Arc<dyn ProviderGateway>) -> Self {
        self.providers.push(provider);
        self
    }

    /// プロバイダー一覧を設定
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ProviderGateway>>) -> Self {
        self.providers = providers;
        self
    }

    /// 引用検索ソースを設定
    pub fn with_search_source(mut self, source: Arc<dyn SearchSource>) -> Self {
        self.search = Some(source);
        self
    }

    /// キーワードメトリクスソースを設定
    pub fn with_metrics_source(mut self, source: Arc<dyn KeywordMetricsSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// 共有キャッシュを設定（未設定なら設定値のTTLで新規作成）
    pub fn with_cache(mut self, cache: Arc<PipelineCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 文体テンプレート
    pub fn with_style_template(mut self, style: StyleConfig) -> Self {
        self.style_template = style;
        self
    }

    /// 組織オーバーライド
    pub fn with_organization_overrides(mut self, style: StyleConfig) -> Self {
        self.organization = style;
        self
    }

    /// パイプライン設定
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// オーケストレーターを構築
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        if self.providers.is_empty() {
            return Err(Error::Config(
                "At least one text generation provider is required".to_string(),
            ));
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(PipelineCache::from_config(&self.config)));
        let pool = ProviderPool::new(self.providers)
            .with_timeout(self.config.provider_timeout())
            .with_transient_retries(self.config.transient_retries);
        let scorer = QualityScorer::new().with_readability_floor(self.config.readability_floor);

        Ok(Orchestrator {
            pool,
            search: self.search,
            metrics: self.metrics,
            cache,
            style_template: self.style_template,
            organization: self.organization,
            config: self.config,
            scorer,
        })
    }
}

/// ステージオーケストレーター
pub struct Orchestrator {
    pool: ProviderPool,
    search: Option<Arc<dyn SearchSource>>,
    metrics: Option<Arc<dyn KeywordMetricsSource>>,
    cache: Arc<PipelineCache>,
    style_template: StyleConfig,
    organization: StyleConfig,
    config: PipelineConfig,
    scorer: QualityScorer,
}

impl Orchestrator {
    /// ビルダーを作成
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// パイプライン設定
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 共有キャッシュ
    pub fn cache(&self) -> &Arc<PipelineCache> {
        &self.cache
    }

    /// コンテンツを生成
    ///
    /// 失敗・キャンセル時も、それまでに完了したステージの成果物を含む結果を返す。
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> GenerationResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("generation", %run_id, topic = %request.topic);
        let mut result = GenerationResult::new(run_id);

        info!(parent: &span, mode = ?request.mode, consensus = request.use_consensus, "🚀 Generation started");

        let mut state = match self
            .preflight(request, &cancel)
            .instrument(span.clone())
            .await
        {
            Ok(state) => state,
            Err(err) => {
                warn!(parent: &span, error = %err, "Pre-flight check failed");
                result.fail(&err);
                result.generation_time_seconds = started.elapsed().as_secs_f64();
                return result;
            }
        };

        let outcome = self
            .run_stages(&mut state, &cancel)
            .instrument(span.clone())
            .await;
        self.assemble(&state, &mut result);

        match outcome.and_then(|()| self.check_final(&state, &result)) {
            Ok(()) => {
                result.success = true;
                result.final_stage = Stage::Done;
                info!(
                    parent: &span,
                    words = result.word_count,
                    aggregate = result.quality.as_ref().map(|q| q.aggregate),
                    warnings = result.warnings.len(),
                    "✅ Generation complete"
                );
            }
            Err(err) => {
                error!(parent: &span, error = %err, stages = result.stages.len(), "Generation failed");
                result.fail(&err);
            }
        }

        result.generation_time_seconds = started.elapsed().as_secs_f64();
        result
    }

    /// 事前検証・文体解決・引用ソースの疎通確認
    async fn preflight<'a>(
        &self,
        request: &'a GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunState<'a>> {
        request.check()?;

        let style = StyleConfig::resolve(
            &self.style_template,
            &self.organization,
            request.style_override.as_ref(),
        );
        let location = request
            .location
            .clone()
            .unwrap_or_else(|| self.config.default_location.clone());
        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        let model_hint = style
            .model_hint
            .clone()
            .or_else(|| self.config.model_hint.clone());

        let mut warnings = Vec::new();
        let required = self.config.min_citations;
        let generator = if request.citations_enabled() {
            self.citation_generator(&style, &location, &language)
        } else {
            None
        };

        let citations = match generator {
            Some(generator) => {
                let health = guarded(cancel, Stage::Research, generator.health_check()).await?;
                match health {
                    Ok(()) => Some(generator),
                    Err(err) if request.citations_required() => {
                        return Err(Error::CitationRequirement {
                            found: 0,
                            required,
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => {
                        warnings.push(format!(
                            "{}; continuing without citations",
                            err
                        ));
                        None
                    }
                }
            }
            None if request.citations_required() => {
                return Err(Error::CitationRequirement {
                    found: 0,
                    required,
                    reason: "no citation search source configured".to_string(),
                });
            }
            None if request.use_citations => {
                warnings.push("Citation source unavailable, continuing without citations".to_string());
                None
            }
            None => None,
        };

        Ok(RunState {
            request,
            style,
            location,
            language,
            model_hint,
            citations,
            analysis: KeywordAnalysis::default(),
            outline: None,
            primary_provider: 0,
            provenance: Vec::new(),
            generated_citations: Vec::new(),
            structure_issues: Vec::new(),
            meta_title: None,
            meta_description: None,
            seo_suggestions: Vec::new(),
            warnings,
            stages: Vec::new(),
        })
    }

    fn citation_generator(
        &self,
        style: &StyleConfig,
        location: &str,
        language: &str,
    ) -> Option<CitationGenerator> {
        let source = self.search.clone()?;
        Some(
            CitationGenerator::new(source, self.cache.clone())
                .with_cap(self.config.citation_cap)
                .with_concurrency(self.config.max_concurrent_lookups)
                .with_locale(location, language)
                .with_preferred_domains(style.preferred_domains.clone().unwrap_or_default()),
        )
    }

    /// 状態機械を終端まで進める
    async fn run_stages(&self, state: &mut RunState<'_>, cancel: &CancellationToken) -> Result<()> {
        let mut stage = Stage::Research;
        while !stage.is_terminal() {
            if cancel.is_cancelled() {
                info!(stage = %stage, "Cancellation requested, not starting stage");
                return Err(Error::Cancelled(stage.to_string()));
            }

            let started = Instant::now();
            debug!(stage = %stage, version = state.next_version(), "Stage started");
            let outcome = guarded(cancel, stage, self.run_stage(stage, state)).await?;

            let elapsed = started.elapsed();
            let stamp = |mut result: StageResult| {
                result.elapsed = elapsed;
                result
            };
            match outcome {
                StageOutcome::Ok(result) => self.record(state, stamp(result)),
                StageOutcome::Degraded(result, warnings) => {
                    for warning in &warnings {
                        warn!(stage = %stage, warning = %warning, "Stage degraded");
                    }
                    state.warnings.extend(warnings);
                    self.record(state, stamp(result));
                }
                StageOutcome::Fatal(err) => {
                    error!(stage = %stage, error = %err, "Stage failed");
                    return Err(err);
                }
            }

            stage = stage.next();
        }
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, state: &mut RunState<'_>) -> StageOutcome {
        match stage {
            Stage::Research => self.research(state).await,
            Stage::Draft => self.draft(state).await,
            Stage::Enhance => self.enhance(state).await,
            Stage::Polish => self.polish(state).await,
            Stage::Done | Stage::Failed => {
                StageOutcome::Fatal(Error::Config(format!("{} is a terminal state", stage)))
            }
        }
    }

    fn score(&self, text: &str, state: &RunState<'_>) -> QualityReport {
        let request = state.request;
        let ctx = ScoringContext {
            keywords: &request.keywords,
            reference_texts: &request.reference_texts,
            required_citations: request
                .citations_enabled()
                .then_some(self.config.min_citations),
            citations: &state.generated_citations,
        };
        self.scorer.score(text, &ctx)
    }

    /// 採点してチェーンに追加（退行時は前ステージのテキストを引き継ぐ）
    fn record(&self, state: &mut RunState<'_>, result: StageResult) {
        let report = self.score(&result.text, state);
        let mut result = result.with_quality(report);

        let checks_regression = state.request.use_quality_scoring
            && matches!(result.stage, Stage::Enhance | Stage::Polish);
        if let Some(previous) = state.last_content_stage().cloned().filter(|_| checks_regression) {
            let before = previous.aggregate().unwrap_or_default();
            let after = result.aggregate().unwrap_or_default();
            let drop = before - after;

            if drop > self.config.regression_threshold {
                if self.rollback_loses_citations(state, &previous) {
                    warn!(stage = %result.stage, drop, "Regression kept: previous text lacks required citations");
                    state.warnings.push(format!(
                        "{} stage lowered quality by {:.1} points; kept because the {} text lacks required citations",
                        result.stage, drop, previous.stage
                    ));
                } else {
                    warn!(
                        stage = %result.stage,
                        before,
                        after,
                        "Quality regression, rolling back to {}",
                        previous.stage
                    );
                    state.warnings.push(format!(
                        "{} stage lowered quality by {:.1} points; kept the {} text",
                        result.stage, drop, previous.stage
                    ));
                    result = StageResult {
                        text: previous.text,
                        structure: previous.structure,
                        quality: previous.quality,
                        rolled_back: true,
                        ..result
                    };
                }
            }
        }

        info!(
            stage = %result.stage,
            version = result.version,
            aggregate = result.aggregate(),
            rolled_back = result.rolled_back,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Stage complete"
        );
        state.stages.push(result);
    }

    fn rollback_loses_citations(&self, state: &RunState<'_>, previous: &StageResult) -> bool {
        if !state.request.citations_required() {
            return false;
        }
        let (integrated, _) = scan_integration(&previous.text, &state.generated_citations);
        integrated.len() < self.config.min_citations
    }

    /// Research: キーワード分析とアウトライン
    async fn research(&self, state: &mut RunState<'_>) -> StageOutcome {
        let request = state.request;
        let engine = KeywordEngine::new(self.metrics.clone(), self.cache.clone())
            .with_concurrency(self.config.max_concurrent_lookups)
            .with_base_length(self.config.base_content_length)
            .with_similarity_threshold(self.config.similarity_threshold);

        let analysis = engine
            .analyze(&request.keywords, &state.location, &state.language)
            .await;
        let outline = build_outline(
            &request.topic,
            &analysis.metrics,
            &analysis.clusters,
            Some(request.word_count_target),
            engine.base_length(),
        );
        debug!(
            keywords = analysis.metrics.len(),
            clusters = analysis.clusters.len(),
            sections = outline.sections.len(),
            "Outline built"
        );

        let warnings = analysis.warnings.clone();
        let text = outline.to_markdown();
        state.analysis = analysis;
        state.outline = Some(outline);

        StageOutcome::from_warnings(
            StageResult::new(
                Stage::Research,
                state.next_version(),
                text,
                Usage::default(),
                Duration::ZERO,
            ),
            warnings,
        )
    }

    fn draft_prompt(&self, state: &RunState<'_>) -> String {
        let request = state.request;
        let mut builder = ContentPrompt::new(request.topic.as_str())
            .with_content_type(request.content_type)
            .with_word_count(request.word_count_target)
            .with_keywords(request.keywords.clone());
        if let Some(audience) = &request.target_audience {
            builder = builder.with_audience(audience.as_str());
        }
        builder = builder.with_style(&state.style);
        if let Some(tone) = request.tone {
            builder = builder.with_tone(tone);
        }
        if let Some(outline) = &state.outline {
            builder = builder.with_outline(outline.clone());
        }
        if request.use_knowledge_graph {
            let entities = state.analysis.related_terms(&request.keywords);
            if !entities.is_empty() {
                builder = builder.with_entities(entities);
            }
        }
        builder.to_llm_prompt()
    }

    /// Draft: 単一プロバイダーまたは合議生成、構造違反時は1回だけ修復
    async fn draft(&self, state: &mut RunState<'_>) -> StageOutcome {
        let request = state.request;
        let prompt_text = self.draft_prompt(state);
        let model_hint = state.model_hint.clone();
        let hint = model_hint.as_deref();
        let mut usage = Usage::default();
        let mut warnings = Vec::new();

        let (mut text, primary) = if request.use_consensus && self.pool.len() >= 2 {
            match ConsensusGenerator::new(self.pool.clone())
                .generate(&prompt_text, hint)
                .await
            {
                Ok(draft) => {
                    usage += draft.usage;
                    warnings.extend(draft.warnings);
                    warnings.extend(draft.excluded.iter().map(|e| {
                        format!("Consensus excluded {}: {}", e.provider, e.reason)
                    }));
                    state.provenance = draft.provenance;
                    (draft.text, draft.primary_provider)
                }
                Err(err) => return StageOutcome::Fatal(err),
            }
        } else {
            if request.use_consensus {
                warnings.push(
                    "Consensus generation needs at least two providers; drafted with one"
                        .to_string(),
                );
            }
            match self.pool.complete(&prompt_text, hint).await {
                Ok(pooled) => {
                    usage += pooled.completion.usage();
                    (pooled.completion.text, pooled.provider_index)
                }
                Err(err) => return StageOutcome::Fatal(err),
            }
        };
        state.primary_provider = primary;

        let violations = structure_violations(&text);
        if !violations.is_empty() {
            warn!(violations = violations.len(), "Draft violates structure, requesting repair");
            let repair = prompt::repair_prompt(&text, &violations);
            let remaining = match self.pool.complete_on(primary, &repair, hint).await {
                Ok(pooled) => {
                    usage += pooled.completion.usage();
                    let repaired = structure_violations(&pooled.completion.text);
                    if repaired.len() < violations.len() {
                        text = pooled.completion.text;
                        repaired
                    } else {
                        violations
                    }
                }
                Err(err) => {
                    warnings.push(format!("Structure repair call failed: {}", err));
                    violations
                }
            };

            if !remaining.is_empty() {
                if self.config.structure_blocking {
                    return StageOutcome::Fatal(Error::StructureViolation(remaining.join("; ")));
                }
                warnings.push(format!(
                    "Draft structure could not be fully repaired: {}",
                    remaining.join("; ")
                ));
                state.structure_issues = remaining;
            }
        }

        StageOutcome::from_warnings(
            StageResult::new(Stage::Draft, state.next_version(), text, usage, Duration::ZERO),
            warnings,
        )
    }

    /// Enhance: 読みやすさ改善 → 引用 → E-E-A-T
    async fn enhance(&self, state: &mut RunState<'_>) -> StageOutcome {
        let request = state.request;
        let model_hint = state.model_hint.clone();
        let mut text = state.current_text().to_string();
        let mut usage = Usage::default();
        let mut warnings = Vec::new();

        let flesch = flesch_reading_ease(&text);
        if flesch < self.config.readability_floor {
            debug!(flesch, "Readability below floor, requesting simplification");
            let prompt_text = prompt::simplify_prompt(
                &text,
                self.config.readability_floor,
                self.config.readability_target_max,
            );
            match self.pool.complete(&prompt_text, model_hint.as_deref()).await {
                Ok(pooled) => {
                    usage += pooled.completion.usage();
                    match accept_simplification(&text, &pooled.completion.text) {
                        Ok(()) => {
                            info!(
                                before = flesch,
                                after = flesch_reading_ease(&pooled.completion.text),
                                "Readability rewrite accepted"
                            );
                            text = pooled.completion.text;
                        }
                        Err(reason) => {
                            warnings.push(format!("Readability rewrite rejected: {}", reason))
                        }
                    }
                }
                Err(err) => {
                    warnings.push(format!("Readability simplification skipped: {}", err))
                }
            }
        }

        if let Some(generator) = &state.citations {
            let outcome = generator
                .generate(&text, &request.topic, &request.keywords)
                .await;

            if outcome.all_queries_failed() {
                warnings.push("Citation source unavailable, continuing without citations".to_string());
            } else if outcome.candidates_found == 0 {
                warnings.push("No citations found for this topic".to_string());
            }
            if !outcome.not_integrated.is_empty() {
                warnings.push(format!(
                    "{} citations were generated but not integrated",
                    outcome.not_integrated.len()
                ));
            }

            let found = outcome.integrated_count();
            let required = self.config.min_citations;
            if found < required {
                if request.citations_required() {
                    let reason = if outcome.all_queries_failed() {
                        "citation source unavailable"
                    } else {
                        "not enough authoritative sources"
                    };
                    return StageOutcome::Fatal(Error::CitationRequirement {
                        found,
                        required,
                        reason: reason.to_string(),
                    });
                }
                warnings.push(format!("Only {} of {} citations integrated", found, required));
            }

            state.generated_citations = outcome
                .citations
                .iter()
                .chain(outcome.not_integrated.iter())
                .cloned()
                .collect();
            text = outcome.text;
        }

        let phrases = state.style.experience_phrases.clone().unwrap_or_default();
        let injection = inject_experience(
            &text,
            &phrases,
            self.config.experience_indicators_min_per_1000,
            self.config.experience_indicators_max_per_1000,
        );
        if injection.injected > 0 {
            debug!(
                existing = injection.existing,
                injected = injection.injected,
                "Experience indicators injected"
            );
            text = injection.text;
        }

        StageOutcome::from_warnings(
            StageResult::new(Stage::Enhance, state.next_version(), text, usage, Duration::ZERO),
            warnings,
        )
    }

    /// Polish: キーワード密度・リンク・見出し・メタデータ
    async fn polish(&self, state: &mut RunState<'_>) -> StageOutcome {
        let request = state.request;
        let model_hint = state.model_hint.clone();
        let hint = model_hint.as_deref();
        let enhanced = state.current_text().to_string();
        let mut text = enhanced.clone();
        let mut usage = Usage::default();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        let adjustments = seo::density_adjustments(&text, &request.keywords);
        if !adjustments.is_empty() {
            suggestions.extend(seo::density_suggestions(&adjustments));
            let prompt_text = prompt::density_rewrite_prompt(&text, &adjustments);
            match self.pool.complete(&prompt_text, hint).await {
                Ok(pooled) => {
                    usage += pooled.completion.usage();
                    let candidate = pooled.completion.text;
                    if !seo::fingerprints_preserved(&enhanced, &candidate) {
                        warnings.push(
                            "Keyword density rewrite rejected: factual claims changed".to_string(),
                        );
                    } else if structure_violations(&candidate).len()
                        > structure_violations(&text).len()
                    {
                        warnings.push(
                            "Keyword density rewrite rejected: structure regressed".to_string(),
                        );
                    } else {
                        text = candidate;
                    }
                }
                Err(err) => warnings.push(format!("Keyword density correction skipped: {}", err)),
            }
        }

        let (linked, removed) = seo::validate_links(&text);
        if !removed.is_empty() {
            debug!(removed = removed.len(), "Unwrapped malformed links");
            suggestions.extend(seo::link_suggestions(&removed));
        }
        text = linked;

        let title = seo::extract_title(&text).unwrap_or_else(|| title_case(&request.topic));
        let (normalized, notes) = seo::normalize_headings(&text, &title);
        suggestions.extend(notes);
        text = normalized;

        let meta_title = match self
            .pool
            .complete(
                &prompt::meta_title_prompt(&text, &request.keywords, META_TITLE_MAX),
                hint,
            )
            .await
        {
            Ok(pooled) => {
                usage += pooled.completion.usage();
                seo::clean_meta(&pooled.completion.text, META_TITLE_MAX)
            }
            Err(err) => {
                debug!(error = %err, "Meta title generation failed");
                None
            }
        };
        let meta_title = meta_title.unwrap_or_else(|| {
            suggestions.push(seo::metadata_fallback_suggestion("meta title"));
            seo::fallback_meta_title(&title, &request.keywords)
        });

        let meta_description = match self
            .pool
            .complete(
                &prompt::meta_description_prompt(&text, &request.keywords, META_DESCRIPTION_MAX),
                hint,
            )
            .await
        {
            Ok(pooled) => {
                usage += pooled.completion.usage();
                seo::clean_meta(&pooled.completion.text, META_DESCRIPTION_MAX)
            }
            Err(err) => {
                debug!(error = %err, "Meta description generation failed");
                None
            }
        };
        let meta_description = meta_description.unwrap_or_else(|| {
            suggestions.push(seo::metadata_fallback_suggestion("meta description"));
            seo::fallback_meta_description(&text)
        });

        state.meta_title = Some(meta_title);
        state.meta_description = Some(meta_description);
        state.seo_suggestions = suggestions;

        StageOutcome::from_warnings(
            StageResult::new(Stage::Polish, state.next_version(), text, usage, Duration::ZERO),
            warnings,
        )
    }

    /// 作業状態から結果オブジェクトを組み立てる（部分結果にも使う）
    fn assemble(&self, state: &RunState<'_>, result: &mut GenerationResult) {
        let request = state.request;
        let text = state.current_text().to_string();

        let (integrated, missing) = scan_integration(&text, &state.generated_citations);
        let title = seo::extract_title(&text).unwrap_or_else(|| title_case(&request.topic));

        if !text.is_empty() {
            let mut report = self.score(&text, state);
            if !state.structure_issues.is_empty() {
                report.critical_issues.push(format!(
                    "Draft structure could not be repaired: {}",
                    state.structure_issues.join("; ")
                ));
            }
            result.quality = Some(report);
            result.meta_title = state
                .meta_title
                .clone()
                .unwrap_or_else(|| seo::fallback_meta_title(&title, &request.keywords));
            result.meta_description = state
                .meta_description
                .clone()
                .unwrap_or_else(|| seo::fallback_meta_description(&text));
        }

        let usage = state
            .stages
            .iter()
            .fold(Usage::default(), |acc, s| acc + s.usage);

        result.title = title;
        result.word_count = word_count(&text);
        result.content = text;
        result.citations = integrated;
        result.not_integrated_citations = missing;
        result.keyword_metrics = state.analysis.metrics.clone();
        result.clusters = state.analysis.clusters.clone();
        result.outline = state.outline.clone();
        result.seo_suggestions = state.seo_suggestions.clone();
        result.provenance = state.provenance.clone();
        result.total_tokens = usage.tokens;
        result.total_cost = usage.cost;
        result.warnings = state.warnings.clone();
        result.stages = state.stages.clone();
        result.final_stage = state
            .stages
            .last()
            .map(|s| s.stage)
            .unwrap_or(Stage::Research);
    }

    /// 最終テキストでの必須条件（マルチフェーズの引用数）
    fn check_final(&self, state: &RunState<'_>, result: &GenerationResult) -> Result<()> {
        let required = self.config.min_citations;
        if state.request.citations_required() && result.citations.len() < required {
            return Err(Error::CitationRequirement {
                found: result.citations.len(),
                required,
                reason: "citations missing from the final text".to_string(),
            });
        }
        Ok(())
    }
}
