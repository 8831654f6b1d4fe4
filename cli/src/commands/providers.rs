// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provider listing

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use super::factory;

pub async fn list(config_override: Option<PathBuf>) -> Result<()> {
    let factory = factory(config_override);
    let status = factory
        .list_providers()
        .await
        .context("Failed to list providers")?;

    let config = factory
        .config()
        .context("Configuration was not loaded")?;

    println!("{}", "Providers:".bold());
    for (name, available) in &status {
        let mark = if *available {
            "✓ available".green()
        } else if config.providers.get(name).is_some_and(|p| !p.enabled) {
            "- disabled".dimmed()
        } else {
            "✗ unavailable".red()
        };

        let mut role = String::new();
        if *name == config.default_provider {
            role.push_str(" (default)");
        }
        if config.fallback_provider.as_deref() == Some(name.as_str()) {
            role.push_str(" (fallback)");
        }

        println!("  {:<16} {}{}", name, mark, role.dimmed());
    }

    Ok(())
}
