use anyhow::{Context, Result};
use clap::Parser;
use content_pipeline::config::ConfigLoader;
use content_pipeline::llm::providers::create_provider;
use content_pipeline::llm::{ProviderConfig, ProviderGateway};
use content_pipeline::logging::{init_logging, LogConfig};
use content_pipeline::{GenerationRequest, Orchestrator, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Multi-stage LLM content generation
#[derive(Parser, Debug)]
#[command(name = "content-pipeline", version, about)]
struct Args {
    /// Generation request (JSON)
    #[arg(short, long, required_unless_present = "sample_config")]
    request: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "PIPELINE_CONFIG")]
    config: Option<String>,

    /// Write the result JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level or filter expression
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Print a sample configuration and exit
    #[arg(long)]
    sample_config: bool,
}

fn build_providers(config: &PipelineConfig) -> Result<Vec<Arc<dyn ProviderGateway>>> {
    let provider_configs = if config.providers.is_empty() {
        vec![ProviderConfig::openai_from_env()?]
    } else {
        config.providers.clone()
    };

    provider_configs
        .iter()
        .map(|provider| {
            provider.validate()?;
            create_provider(provider)
        })
        .collect::<content_pipeline::Result<Vec<_>>>()
        .context("Failed to create providers")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.sample_config {
        println!("{}", PipelineConfig::sample_toml()?);
        return Ok(());
    }

    let config = ConfigLoader::new()
        .load_from_file(args.config.as_deref())
        .load_from_env()
        .build()?;

    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &args.log_level {
        log_config = log_config.with_level(level.as_str());
    }
    let _guard = init_logging(&log_config)?;

    let request_path = args
        .request
        .as_ref()
        .context("--request is required")?;
    let body = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("Failed to read {}", request_path.display()))?;
    let request: GenerationRequest =
        serde_json::from_str(&body).context("Failed to parse generation request")?;

    let orchestrator = Orchestrator::builder()
        .with_providers(build_providers(&config)?)
        .with_config(config)
        .build()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling generation");
            ctrl_c.cancel();
        }
    });

    let result = orchestrator.generate(&request, cancel).await;
    let json = result.to_json()?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{}", json),
    }

    if !result.success {
        error!(
            error = ?result.error,
            message = result.error_message.as_deref().unwrap_or_default(),
            "Generation did not succeed"
        );
        std::process::exit(1);
    }

    Ok(())
}
