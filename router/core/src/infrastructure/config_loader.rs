// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Configuration Loader
//
// Reads the YAML configuration, substitutes ${VAR} / ${VAR:default}
// placeholders from the process environment and validates the result.
// Every failure here is a ConfigurationError: nothing malformed may reach
// provider resolution.

use crate::domain::llm::LLMError;
use crate::domain::llm_config::{LlmConfig, LlmConfigDocument};
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "LLMGATE_CONFIG_PATH";

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").expect("placeholder pattern is a valid regex")
});

/// Where the factory reads its configuration from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Search the standard locations (see [`discover_config`])
    Discover,

    /// Explicit file; missing or unreadable is an error
    Path(PathBuf),

    /// Inline YAML document
    Yaml(String),
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::Discover
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Discover configuration file using precedence order
/// 1. LLMGATE_CONFIG_PATH environment variable
/// 2. ./config/llm_config.yaml
/// 3. ./llm_config.yaml
/// 4. ~/.llmgate/llm_config.yaml
pub fn discover_config() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates = [
        PathBuf::from("./config/llm_config.yaml"),
        PathBuf::from("./llm_config.yaml"),
    ];
    if let Some(found) = candidates.into_iter().find(|p| p.exists()) {
        return Some(found);
    }

    if let Some(home) = dirs::home_dir() {
        let user_config = home.join(".llmgate").join("llm_config.yaml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    None
}

/// Load, substitute and validate a configuration
pub fn load_config(source: &ConfigSource) -> Result<LlmConfig, LLMError> {
    let yaml = match source {
        ConfigSource::Yaml(yaml) => yaml.clone(),
        ConfigSource::Path(path) => read_config_file(path)?,
        ConfigSource::Discover => {
            let path = discover_config().ok_or_else(|| {
                LLMError::Configuration(format!(
                    "No configuration file found (set {} or create ./config/llm_config.yaml)",
                    CONFIG_PATH_ENV
                ))
            })?;
            read_config_file(&path)?
        }
    };

    parse_config(&yaml)
}

/// Parse an in-memory YAML document
pub fn parse_config(yaml: &str) -> Result<LlmConfig, LLMError> {
    let raw: Value = serde_yaml::from_str(yaml)
        .map_err(|e| LLMError::Configuration(format!("Failed to parse YAML: {}", e)))?;

    let resolved = substitute_env_vars(raw);

    let document: LlmConfigDocument = serde_yaml::from_value(resolved)
        .map_err(|e| LLMError::Configuration(format!("Invalid LLM configuration: {}", e)))?;

    document.llm.validate()?;

    debug!(
        providers = document.llm.providers.len(),
        routes = document.llm.task_routing.len(),
        "LLM configuration validated"
    );

    Ok(document.llm)
}

fn read_config_file(path: &Path) -> Result<String, LLMError> {
    info!("Loading LLM configuration from {:?}", path);
    std::fs::read_to_string(path).map_err(|e| {
        LLMError::Configuration(format!("Configuration file {:?} could not be read: {}", path, e))
    })
}

/// Recursively replace `${VAR}` and `${VAR:default}` in every string value.
/// Unset variables without a default become the empty string. Mapping keys
/// are left untouched.
///
/// A value that is exactly one placeholder takes the YAML type of its
/// replacement when that is a boolean or a number, so
/// `max_tokens: ${MAX_TOKENS:2048}` stays numeric.
pub fn substitute_env_vars(value: Value) -> Value {
    match value {
        Value::String(s) => substitute_scalar(&s),
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(substitute_env_vars).collect())
        }
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, substitute_env_vars(v)))
                .collect(),
        ),
        Value::Tagged(mut tagged) => {
            tagged.value = substitute_env_vars(tagged.value);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

fn substitute_scalar(input: &str) -> Value {
    let resolved = substitute_str(input);

    let whole_placeholder = ENV_PLACEHOLDER
        .find(input)
        .is_some_and(|m| m.start() == 0 && m.end() == input.len());

    if whole_placeholder {
        if let Ok(typed @ (Value::Bool(_) | Value::Number(_))) =
            serde_yaml::from_str::<Value>(&resolved)
        {
            return typed;
        }
    }

    Value::String(resolved)
}

fn substitute_str(input: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(input, |caps: &Captures| {
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}
