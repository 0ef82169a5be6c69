//! Content Generation Pipeline
//!
//! リクエスト検証、ステージ状態機械、結果オブジェクトを提供します。

pub mod orchestrator;
pub mod request;
pub mod result;
pub mod stage;

pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use request::{GenerationRequest, Mode};
pub use result::GenerationResult;
pub use stage::{Stage, StageOutcome, StageResult};
