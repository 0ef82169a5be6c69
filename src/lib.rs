//! # content-pipeline
//!
//! Multi-stage LLM content generation pipeline.
//!
//! A run moves through Research → Draft → Enhance → Polish. Keyword metrics and an
//! outline come first, a draft is produced by one provider or by multi-provider
//! consensus, citations and experience signals are added, and a final SEO pass
//! produces metadata. Every stage is scored and rolled back on quality regression.

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod keywords;
pub mod llm;
pub mod logging;
pub mod pipeline;

pub use cache::{CacheKey, PipelineCache, TtlCache};
pub use config::{ConfigLoader, PipelineConfig, StyleConfig};
pub use content::{
    Citation, ContentType, QualityReport, QualityScorer, SearchHit, SearchSource, Tone,
};
pub use error::{Error, ErrorKind, Result};
pub use keywords::{KeywordEngine, KeywordMetrics, KeywordMetricsSource, RawKeywordMetrics};
pub use llm::{Completion, ProviderError, ProviderGateway, ProviderPool, Usage};
pub use pipeline::{GenerationRequest, GenerationResult, Mode, Orchestrator, Stage};
