// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local model management commands
//!
//! Commands: list, pull, delete, info

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use llmgate_core::domain::llm_config::LlmConfig;
use llmgate_core::infrastructure::llm::OllamaProvider;

use super::factory;

#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List models present on the daemon
    List {
        /// Ollama-kind provider (default: first enabled one)
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Pull a model onto the daemon
    Pull {
        /// Model name, e.g. llama3.2 or qwen2.5-coder:7b
        name: String,

        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Delete a model from the daemon
    Delete {
        name: String,

        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show the default model of a provider (any kind)
    Info {
        /// Provider name (default: default_provider)
        #[arg(short, long)]
        provider: Option<String>,
    },
}

pub async fn handle_command(
    command: ModelsCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ModelsCommand::List { provider } => list(config_override, provider).await,
        ModelsCommand::Pull { name, provider } => pull(config_override, provider, &name).await,
        ModelsCommand::Delete { name, provider } => {
            delete(config_override, provider, &name).await
        }
        ModelsCommand::Info { provider } => info(config_override, provider).await,
    }
}

/// Name of the provider to manage: the requested one, or the first enabled
/// provider of the ollama kind
fn local_provider_name(config: &LlmConfig, requested: Option<String>) -> Result<String> {
    if let Some(name) = requested {
        let provider_config = config.provider(&name)?;
        if provider_config.kind(&name) != "ollama" {
            bail!(
                "Provider '{}' is of type '{}'; model management needs an ollama provider",
                name,
                provider_config.kind(&name)
            );
        }
        return Ok(name);
    }

    config
        .providers
        .iter()
        .find(|(name, provider)| provider.enabled && provider.kind(name) == "ollama")
        .map(|(name, _)| name.clone())
        .context("No enabled ollama provider configured")
}

fn local_provider(
    config_override: Option<PathBuf>,
    requested: Option<String>,
) -> Result<OllamaProvider> {
    let config = factory(config_override)
        .initialize(None)
        .context("Failed to load configuration")?;
    let name = local_provider_name(&config, requested)?;
    let provider = OllamaProvider::from_config(&name, config.provider(&name)?)?;
    Ok(provider)
}

async fn list(config_override: Option<PathBuf>, provider: Option<String>) -> Result<()> {
    let provider = local_provider(config_override, provider)?;
    let models = provider
        .list_available_models()
        .await
        .with_context(|| format!("Failed to list models at {}", provider.endpoint()))?;

    if models.is_empty() {
        println!("{}", "No models pulled yet".yellow());
        return Ok(());
    }

    println!("{}", format!("Models at {}:", provider.endpoint()).bold());
    for model in models {
        println!("  - {}", model);
    }
    Ok(())
}

async fn pull(config_override: Option<PathBuf>, provider: Option<String>, name: &str) -> Result<()> {
    let provider = local_provider(config_override, provider)?;
    println!("Pulling {} (this may take a while)...", name);

    provider.pull_model(name).await?;

    println!("{}", format!("✓ Pulled {}", name).green());
    Ok(())
}

async fn delete(config_override: Option<PathBuf>, provider: Option<String>, name: &str) -> Result<()> {
    let provider = local_provider(config_override, provider)?;
    provider.delete_model(name).await?;

    println!("{}", format!("✓ Deleted {}", name).green());
    Ok(())
}

async fn info(config_override: Option<PathBuf>, provider: Option<String>) -> Result<()> {
    let factory = factory(config_override);
    let resolved = factory
        .resolve(provider.as_deref(), None)
        .context("Failed to resolve provider")?;

    let info = resolved.model_info().await;

    println!("{} {}", "Provider:".bold(), resolved.name);
    println!("{} {}", "Model:".bold(), info.name);
    if info.available {
        println!("  Status: {}", "available".green());
    } else {
        println!("  Status: {}", "unavailable".red());
    }
    if let Some(size) = info.size {
        println!("  Size: {:.1} GB", size as f64 / 1_000_000_000.0);
    }
    if let Some(modified) = info.modified_at {
        println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(details) = &info.details {
        println!("  Details: {}", details);
    }
    if let Some(message) = &info.message {
        println!("  {}", message.dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::infrastructure::config_loader::parse_config;

    const CONFIG: &str = r#"
llm:
  default_provider: cloud
  providers:
    cloud:
      type: anthropic
      enabled: true
      api_key: sk-test
    workstation:
      type: ollama
      enabled: false
    laptop:
      type: ollama
      enabled: true
"#;

    #[test]
    fn test_first_enabled_ollama_provider_is_picked() {
        let config = parse_config(CONFIG).unwrap();
        assert_eq!(local_provider_name(&config, None).unwrap(), "laptop");
    }

    #[test]
    fn test_requested_provider_must_be_ollama() {
        let config = parse_config(CONFIG).unwrap();
        assert!(local_provider_name(&config, Some("cloud".to_string())).is_err());
        assert!(local_provider_name(&config, Some("workstation".to_string())).is_err());
        assert_eq!(
            local_provider_name(&config, Some("laptop".to_string())).unwrap(),
            "laptop"
        );
    }
}
