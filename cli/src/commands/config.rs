// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use llmgate_core::domain::llm_config::{LlmConfig, RoutingTarget};
use llmgate_core::infrastructure::config_loader::{discover_config, load_config, CONFIG_PATH_ENV};

use super::config_source;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./config/llm_config.yaml");
        println!("  4. ./llm_config.yaml");
        println!("  5. ~/.llmgate/llm_config.yaml");
        if config_override.is_none() {
            match discover_config() {
                Some(found) => println!("  Using: {}", found.display().to_string().green()),
                None => println!("  Using: {}", "(nothing found)".red()),
            }
        }
        println!();
    }

    let config = load_config(&config_source(config_override))
        .context("Failed to load configuration")?;

    print_config(&config);
    Ok(())
}

fn print_config(config: &LlmConfig) {
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Providers:".bold());
    for (name, provider) in &config.providers {
        let state = if provider.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {} ({}) [{}]", name.bold(), provider.kind(name), state);
        if let Some(host) = &provider.host {
            println!("    Host: {}", host);
        }
        if provider.api_key.as_deref().is_some_and(|key| !key.is_empty()) {
            println!("    API key: {}", "(set)".dimmed());
        }
        if let Some(model) = provider.default_model() {
            println!("    Default model: {}", model);
        }
        for (alias, model) in &provider.models {
            println!("      - {} → {}", alias, model);
        }
    }
    println!();

    println!("{}", "Selection:".bold());
    println!("  Default provider: {}", config.default_provider);
    match &config.fallback_provider {
        Some(fallback) if config.enable_fallback => println!("  Fallback provider: {}", fallback),
        Some(fallback) => println!("  Fallback provider: {} {}", fallback, "(disabled)".dimmed()),
        None => println!("  Fallback provider: {}", "(none)".dimmed()),
    }
    println!();

    if !config.task_routing.is_empty() {
        println!("{}", "Task routing:".bold());
        for (task, entry) in &config.task_routing {
            let target = RoutingTarget::parse(entry);
            match config.routed_model(&target) {
                Some(model) => println!("  {} → {} ({})", task, target.provider(), model),
                None => println!("  {} → {}", task, target.provider()),
            }
        }
        println!();
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = load_config(&config_source(config_path))
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    println!(
        "  {} provider(s), {} task route(s), default '{}'",
        config.providers.len(),
        config.task_routing.len(),
        config.default_provider
    );

    Ok(())
}
