// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Generation commands
//!
//! Commands: invoke, stream, batch

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};

use llmgate_core::domain::llm::{parse_messages, GenerationOptions, LLMError, Message};
use llmgate_core::{ProviderFactory, ResolvedProvider};

use super::factory;

/// Provider selection and sampling flags shared by invoke and stream
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Provider name (overrides task routing)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Task name used for routing
    #[arg(short, long)]
    pub task: Option<String>,

    /// Model identifier or alias (overrides routing)
    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Substitute the fallback provider when the selected one is down
    #[arg(long)]
    pub fallback: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// System prompt prepended to the conversation
    #[arg(short, long)]
    pub system: Option<String>,

    /// JSON file holding a message array (replaces PROMPT)
    #[arg(long, value_name = "FILE", conflicts_with = "prompt")]
    pub messages: Option<PathBuf>,

    /// User prompt
    pub prompt: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// JSON file holding an array of message arrays
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,
}

impl GenerateArgs {
    fn conversation(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }

        match (&self.messages, &self.prompt) {
            (Some(path), _) => messages.extend(read_messages(path)?),
            (None, Some(prompt)) => messages.push(Message::user(prompt.clone())),
            (None, None) => bail!("Provide a PROMPT or --messages FILE"),
        }

        Ok(messages)
    }
}

fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read messages from {:?}", path))?;
    parse_messages(&json).with_context(|| format!("Invalid messages in {:?}", path))
}

/// Parse a batch file; malformed conversations keep their slot as an error
pub fn parse_batch(json: &str) -> Result<Vec<Result<Vec<Message>, LLMError>>> {
    let conversations: Vec<serde_json::Value> =
        serde_json::from_str(json).context("Batch file must be a JSON array")?;

    Ok(conversations
        .into_iter()
        .map(|conversation| parse_messages(&conversation.to_string()))
        .collect())
}

async fn select(factory: &ProviderFactory, selection: &SelectionArgs) -> Result<ResolvedProvider> {
    let provider = selection.provider.as_deref();
    let task = selection.task.as_deref();

    let resolved = if selection.fallback {
        factory.resolve_with_fallback(provider, task).await
    } else {
        factory.resolve(provider, task)
    };

    resolved.context("Failed to resolve provider")
}

fn options_for(resolved: &ResolvedProvider, selection: &SelectionArgs) -> GenerationOptions {
    let mut options = resolved.options();
    if let Some(model) = &selection.model {
        options.model = Some(model.clone());
    }
    options.temperature = selection.temperature;
    options.max_tokens = selection.max_tokens;
    options
}

pub async fn invoke(args: GenerateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let messages = args.conversation()?;
    let factory = factory(config_override);
    let resolved = select(&factory, &args.selection).await?;
    let options = options_for(&resolved, &args.selection);

    eprintln!(
        "{}",
        format!(
            "→ {} ({})",
            resolved.name,
            options.model.as_deref().unwrap_or(resolved.default_model())
        )
        .dimmed()
    );

    let reply = resolved
        .provider
        .invoke(&messages, &options)
        .await
        .context("Generation failed")?;

    println!("{}", reply);
    Ok(())
}

pub async fn stream(args: GenerateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let messages = args.conversation()?;
    let factory = factory(config_override);
    let resolved = select(&factory, &args.selection).await?;
    let options = options_for(&resolved, &args.selection);

    let mut chunks = resolved
        .provider
        .stream(&messages, &options)
        .await
        .context("Failed to start stream")?;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            Err(e) => {
                writeln!(stdout)?;
                return Err(e).context("Stream interrupted");
            }
        }
    }
    writeln!(stdout)?;

    Ok(())
}

pub async fn batch(args: BatchArgs, config_override: Option<PathBuf>) -> Result<()> {
    let json = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read batch file {:?}", args.file))?;
    let slots = parse_batch(&json)?;

    let factory = factory(config_override);
    let resolved = select(&factory, &args.selection).await?;
    let options = options_for(&resolved, &args.selection);

    let conversations: Vec<Vec<Message>> = slots
        .iter()
        .filter_map(|slot| slot.as_ref().ok().cloned())
        .collect();
    let mut results = resolved
        .provider
        .batch(&conversations, &options)
        .await
        .into_iter();

    let mut failures = 0;
    for (index, slot) in slots.into_iter().enumerate() {
        let outcome = match slot {
            Ok(_) => results
                .next()
                .context("Provider returned fewer results than conversations")?,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => println!("{} {}", format!("[{}] ✓", index).green(), text),
            Err(e) => {
                failures += 1;
                println!("{} {}", format!("[{}] ✗", index).red(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of the batch request(s) failed", failures);
    }

    Ok(())
}
