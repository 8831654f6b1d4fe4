// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for llmgate CLI

pub mod config;
pub mod generate;
pub mod models;
pub mod providers;

pub use self::config::ConfigCommand;
pub use self::generate::{BatchArgs, GenerateArgs};
pub use self::models::ModelsCommand;

use llmgate_core::{ConfigSource, ProviderFactory};
use std::path::PathBuf;

/// Factory reading from `--config` when given, otherwise from discovery
pub fn factory(config_override: Option<PathBuf>) -> ProviderFactory {
    ProviderFactory::new(config_source(config_override))
}

pub fn config_source(config_override: Option<PathBuf>) -> ConfigSource {
    config_override
        .map(ConfigSource::Path)
        .unwrap_or_default()
}
