//! Content Module
//!
//! パイプライン各ステージが使うコンテンツ解析・生成・仕上げ機能を提供

pub mod citation;
pub mod consensus;
pub mod enhance;
pub mod markdown;
pub mod prompt;
pub mod quality;
pub mod seo;

pub use citation::{
    Citation, CitationGenerator, CitationOutcome, DomainPreference, SearchError, SearchHit,
    SearchSource,
};
pub use consensus::{ConsensusDraft, ConsensusGenerator, ExcludedProvider, SectionProvenance};
pub use markdown::StructureMetadata;
pub use prompt::{ContentPrompt, ContentType, Tone};
pub use quality::{QualityReport, QualityScorer, ScoringContext};
pub use seo::{SeoSuggestion, SuggestionCategory};
