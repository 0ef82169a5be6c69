//! 設定管理
//!
//! パイプラインの調整パラメータ（`PipelineConfig`）と、
//! 文体テンプレート・組織オーバーライドの合成（`StyleConfig`）を提供します。

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{LoggingSettings, PipelineConfig, StyleConfig};
