// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # llmgate CLI
//!
//! The `llmgate` binary drives the provider factory from a shell: it lists
//! providers, inspects configuration, sends prompts through task routing and
//! manages models on a local Ollama daemon.
//!
//! ## Commands
//!
//! - `llmgate providers` - Configured providers and their availability
//! - `llmgate config show|validate` - Configuration management
//! - `llmgate invoke|stream|batch` - Generate text
//! - `llmgate models list|pull|delete|info` - Local model lifecycle

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use llmgate::commands::{self, BatchArgs, ConfigCommand, GenerateArgs, ModelsCommand};

/// llmgate - Route prompts to local and cloud language models
#[derive(Parser)]
#[command(name = "llmgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "LLMGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LLMGATE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers and whether they are reachable
    #[command(name = "providers")]
    Providers,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate a complete response
    #[command(name = "invoke")]
    Invoke(GenerateArgs),

    /// Generate a response, printing chunks as they arrive
    #[command(name = "stream")]
    Stream(GenerateArgs),

    /// Generate responses for several conversations
    #[command(name = "batch")]
    Batch(BatchArgs),

    /// Local model management
    #[command(name = "models")]
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is loaded before configuration so ${VAR} placeholders can see it
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    if let Some(path) = dotenv {
        debug!("Loaded environment from {:?}", path);
    }

    match cli.command {
        Some(Commands::Providers) => commands::providers::list(cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Invoke(args)) => commands::generate::invoke(args, cli.config).await,
        Some(Commands::Stream(args)) => commands::generate::stream(args, cli.config).await,
        Some(Commands::Batch(args)) => commands::generate::batch(args, cli.config).await,
        Some(Commands::Models { command }) => {
            commands::models::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
