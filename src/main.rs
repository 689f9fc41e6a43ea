#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use autocatcher::config::{Config, mask_config_secrets};
use autocatcher::util::group_thousands;
use autocatcher::{daemon, doctor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

/// `Autocatcher` - watches spawn prompts for many accounts and answers them.
#[derive(Parser, Debug)]
#[command(name = "autocatcher")]
#[command(version)]
#[command(about = "Multi-account spawn watcher and catch daemon.", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.autocatcher/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon: bridge events on stdin, actions on stdout
    Run,

    /// Check configuration, upstream services and daemon health
    Doctor,

    /// Show the sessions recorded by a running daemon
    Status,

    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries bridge actions, so logs go to stderr.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_init()?,
    };

    match cli.command {
        Commands::Run => daemon::run(config).await,
        Commands::Doctor => doctor::run(&config).await,
        Commands::Status => print_status(&config),
        Commands::Config => {
            let mut value = serde_json::to_value(&config)?;
            mask_config_secrets(&mut value);
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
    }
}

fn print_status(config: &Config) -> Result<()> {
    let state_file = daemon::state_file_path(config);
    if !state_file.exists() {
        println!("No daemon state at {}", state_file.display());
        return Ok(());
    }
    let raw = std::fs::read_to_string(&state_file)
        .with_context(|| format!("Failed to read {}", state_file.display()))?;
    let state: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", state_file.display()))?;

    println!("🎯 Autocatcher Status");
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Written at:  {}",
        state["written_at"].as_str().unwrap_or("unknown")
    );

    let sessions = state["sessions"].as_array().cloned().unwrap_or_default();
    if sessions.is_empty() {
        println!("No running sessions.");
        return Ok(());
    }
    for session in sessions {
        let stats = &session["stats"];
        let lifecycle = match session["pause_reason"].as_str() {
            Some(reason) => format!("paused ({reason})"),
            None => "active".to_string(),
        };
        let balance = session["balance"]
            .as_u64()
            .map_or_else(|| "-".to_string(), group_thousands);
        println!(
            "  {:<16} {:<20} spawns {:>5}  caught {:>5}  failed {:>4}  challenges {:>3}  balance {}",
            session["username"].as_str().unwrap_or("?"),
            lifecycle,
            stats["spawns_detected"].as_u64().unwrap_or(0),
            stats["success"].as_u64().unwrap_or(0),
            stats["failed"].as_u64().unwrap_or(0),
            stats["challenges_detected"].as_u64().unwrap_or(0),
            balance,
        );
    }
    Ok(())
}
