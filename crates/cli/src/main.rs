//! Colloquy CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive chat or single-message mode
//! - `models`: List models installed on the backend
//! - `tools`: Show the tools offered to the model

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "colloquy",
    about = "Colloquy: chat with a local model that can call tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Config file (default: ~/.colloquy/config.toml)
    #[arg(short, long, global = true, value_name = "PATH", env = "COLLOQUY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Wait for complete replies instead of streaming them
        #[arg(long)]
        no_stream: bool,

        /// Ask the model to show its reasoning
        #[arg(long)]
        think: bool,
    },

    /// List installed models
    Models,

    /// Show registered tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_file.as_ref())?;

    let config = commands::load_config(cli.config.as_deref())
        .map_err(|e| format!("Failed to load config: {e}"))?;

    match cli.command {
        Commands::Chat {
            message,
            no_stream,
            think,
        } => {
            let args = commands::chat::ChatArgs {
                message,
                stream: config.stream && !no_stream,
                think: config.think || think,
            };
            commands::chat::run(config, args).await?
        }
        Commands::Models => commands::models::run(&config).await?,
        Commands::Tools => commands::tools::run(&config)?,
    }

    Ok(())
}

/// Initialize tracing. Interactive output owns stdout, so terminal logs go
/// to stderr and stay quiet unless `--verbose`.
fn init_tracing(
    verbose: bool,
    log_file: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = |default: &str| {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default))
    };

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {}: {e}", path.display()))?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter(if verbose { "debug" } else { "info" }))
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(if verbose { "debug" } else { "warn" }))
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
    Ok(())
}
