//! Ambience CLI - Ambient Effect Tools
//!
//! Command-line interface for the ambient effect engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ambience::cli::{commands, Cli, Commands};
use ambience::EngineSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Ambience v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = match &cli.config {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => EngineSettings::default(),
    };
    settings
        .apply_env_overrides()
        .context("invalid AMBIENCE_* environment override")?;

    match cli.command {
        Some(cmd) => handle_command(cmd, settings).await,
        None => {
            println!("Ambience v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

async fn handle_command(cmd: Commands, mut settings: EngineSettings) -> anyhow::Result<()> {
    match cmd {
        Commands::Meter { path, frame_ms } => commands::meter(&path, frame_ms)
            .with_context(|| format!("metering {}", path.display())),
        Commands::Library { dir } => commands::library(&dir, &settings)
            .await
            .with_context(|| format!("loading {}", dir.display())),
        Commands::Upload { dir, file, name } => commands::upload(&dir, &file, name.as_deref())
            .await
            .with_context(|| format!("uploading {}", file.display())),
        Commands::Simulate {
            input,
            output,
            threshold,
            gain,
            budget_ms,
        } => {
            if let Some(threshold) = threshold {
                settings.sfx_threshold_db = threshold;
            }
            if let Some(gain) = gain {
                settings.sfx_gain = gain;
            }
            if let Some(budget_ms) = budget_ms {
                settings.silence_budget_ms = budget_ms;
            }
            settings.validate()?;
            commands::simulate(&input, &output, &settings).context("simulation failed")
        }
    }
}
