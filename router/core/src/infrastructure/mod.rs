// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config_loader;
pub mod llm;

pub use config_loader::{load_config, ConfigSource};
pub use llm::{ProviderFactory, ResolvedProvider};
