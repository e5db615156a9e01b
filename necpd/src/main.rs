//! # NECP Host Daemon
//!
//! Main entry point for `necpd`.

use anyhow::{Context, Result};
use clap::Parser;
use necpd::{init_logging, HostRuntime, HostRuntimeConfig, NecpdConfig, Script};
use std::path::PathBuf;
use tracing::info;

/// Run an NECP command script against a simulated kernel
#[derive(Parser)]
#[command(name = "necpd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "NECPD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Command script to run
    #[arg(short, long, value_name = "FILE")]
    script: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "NECPD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print raw packets and results as hex
    #[arg(long)]
    hex: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NecpdConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => NecpdConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level, config.json_logs).context("Failed to initialize logging")?;

    let text = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("Failed to read script {}", cli.script.display()))?;
    let script = Script::from_text(&text).context("Failed to parse script")?;
    info!(commands = script.len(), "script loaded");

    let mut runtime = HostRuntime::new(HostRuntimeConfig {
        config,
        hex: cli.hex,
    })
    .context("Failed to start host runtime")?;
    for line in runtime.run(script).context("Script failed")? {
        println!("{}", line);
    }
    runtime.shutdown().context("Failed to shut down")?;
    Ok(())
}
