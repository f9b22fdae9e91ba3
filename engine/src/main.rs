// Assay pipeline runner
// Main entry point for the assay binary

use anyhow::Context;
use assay_engine::cli::{Cli, Command};
use assay_engine::config::Config;
use assay_engine::handlers::{
    build_request, handle_batch, handle_config, handle_run, load_request, OutputFormat,
};
use assay_engine::telemetry::init_telemetry_with_level;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        Config::load_or_create()?
    };

    // --log overrides the configured level; RUST_LOG still wins over both
    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
        config.validate()?;
    }
    init_telemetry_with_level(&config.core.log_level);

    tracing::info!(
        "Assay v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Handle commands
    match cli.command {
        Command::Run {
            data_source,
            request_id,
            file,
        } => {
            let request = match file {
                Some(path) => load_request(&path)?,
                None => build_request(&data_source, request_id.as_deref()),
            };
            tracing::info!("Running request: {}", request);
            handle_run(request, &config, format).await
        }

        Command::Batch { sources } => {
            tracing::info!("Running batch of {} requests", sources.len());
            handle_batch(sources, &config, format).await
        }

        Command::Config { validate } => handle_config(validate, &config, format),
    }
}
