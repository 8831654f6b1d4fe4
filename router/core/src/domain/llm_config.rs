// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Configuration Types
//
// Defines the configuration schema consumed by the provider factory:
// - Provider blocks (connection target, default model, model aliases, settings)
// - Default and fallback provider selection
// - Task routing table ("provider" or "provider.model_key")
//
// Loading, environment substitution and discovery live in
// infrastructure/config_loader.rs.

use crate::domain::llm::{GenerationSettings, LLMError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration document (content under `llm:`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigDocument {
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used when neither a provider nor a routed task is given
    pub default_provider: String,

    /// Provider substituted when the primary reports unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    #[serde(default)]
    pub enable_fallback: bool,

    pub providers: BTreeMap<String, ProviderConfig>,

    /// Task name -> "provider" or "provider.model_key"
    #[serde(default)]
    pub task_routing: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether this provider may be constructed
    pub enabled: bool,

    /// Backend kind ("ollama", "anthropic"); defaults to the provider name
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,

    /// Daemon host or API base URL
    #[serde(default, alias = "endpoint", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model identifier (takes precedence over `models.default`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Model aliases: logical key (e.g. "code_generation") -> model identifier
    #[serde(default)]
    pub models: BTreeMap<String, String>,

    #[serde(default)]
    pub settings: GenerationSettings,
}

impl ProviderConfig {
    /// Backend kind used to pick a constructor
    pub fn kind<'a>(&'a self, name: &'a str) -> &'a str {
        self.provider_type.as_deref().unwrap_or(name)
    }

    pub fn default_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .or_else(|| self.models.get("default").map(String::as_str))
            .filter(|m| !m.is_empty())
    }

    /// Translate a model override: alias keys map to their model identifier,
    /// anything else is taken literally.
    pub fn resolve_model<'a>(&'a self, requested: &'a str) -> &'a str {
        self.models
            .get(requested)
            .map(String::as_str)
            .unwrap_or(requested)
    }
}

/// Parsed form of a task routing string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingTarget {
    /// Use the provider's default model
    Provider(String),

    /// Use one of the provider's named model aliases
    Alias { provider: String, model_key: String },
}

impl RoutingTarget {
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('.') {
            Some((provider, model_key)) => Self::Alias {
                provider: provider.to_string(),
                model_key: model_key.to_string(),
            },
            None => Self::Provider(entry.to_string()),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Provider(provider) => provider,
            Self::Alias { provider, .. } => provider,
        }
    }
}

impl LlmConfig {
    /// Look up a provider block that may be constructed
    pub fn provider(&self, name: &str) -> Result<&ProviderConfig, LLMError> {
        let config = self.providers.get(name).ok_or_else(|| {
            LLMError::Configuration(format!("Provider '{}' not found in configuration", name))
        })?;

        if !config.enabled {
            return Err(LLMError::Configuration(format!(
                "Provider '{}' is disabled",
                name
            )));
        }

        Ok(config)
    }

    /// Routing target for a task; unmapped tasks go to the default provider
    pub fn route(&self, task_name: &str) -> RoutingTarget {
        match self.task_routing.get(task_name) {
            Some(entry) => RoutingTarget::parse(entry),
            None => RoutingTarget::Provider(self.default_provider.clone()),
        }
    }

    /// Model selected by a routing target, if the configuration names one.
    /// `None` means "whatever the provider uses by default".
    pub fn routed_model(&self, target: &RoutingTarget) -> Option<String> {
        let config = self.providers.get(target.provider())?;
        match target {
            RoutingTarget::Provider(_) => config.default_model().map(str::to_string),
            RoutingTarget::Alias { model_key, .. } => config.models.get(model_key).cloned(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), LLMError> {
        if self.default_provider.is_empty() {
            return Err(LLMError::Configuration(
                "default_provider cannot be empty".to_string(),
            ));
        }

        if !self.providers.contains_key(&self.default_provider) {
            return Err(LLMError::Configuration(format!(
                "Default provider '{}' not found in providers",
                self.default_provider
            )));
        }

        if let Some(fallback) = &self.fallback_provider {
            if !self.providers.contains_key(fallback) {
                return Err(LLMError::Configuration(format!(
                    "Fallback provider '{}' not found in providers",
                    fallback
                )));
            }
        }

        for (name, provider) in &self.providers {
            if name.is_empty() {
                return Err(LLMError::Configuration(
                    "Provider name cannot be empty".to_string(),
                ));
            }

            for (key, model) in &provider.models {
                if model.is_empty() {
                    return Err(LLMError::Configuration(format!(
                        "Model alias '{}' of provider '{}' has an empty model identifier",
                        key, name
                    )));
                }
            }
        }

        for (task, entry) in &self.task_routing {
            let target = RoutingTarget::parse(entry);
            let provider = self.providers.get(target.provider()).ok_or_else(|| {
                LLMError::Configuration(format!(
                    "Task '{}' routes to unknown provider '{}'",
                    task,
                    target.provider()
                ))
            })?;

            if let RoutingTarget::Alias { model_key, .. } = &target {
                if !provider.models.contains_key(model_key) {
                    return Err(LLMError::Configuration(format!(
                        "Task '{}' routes to unknown model alias '{}' of provider '{}'",
                        task,
                        model_key,
                        target.provider()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
llm:
  default_provider: ollama
  fallback_provider: anthropic
  enable_fallback: true
  providers:
    ollama:
      enabled: true
      host: http://localhost:11434
      models:
        default: codellama:13b
        code_generation: deepseek-coder:6.7b
      settings:
        temperature: 0.2
        num_ctx: 8192
    anthropic:
      enabled: false
      api_key: sk-test
      model: claude-sonnet-4-5
  task_routing:
    code_generation: ollama.code_generation
    architecture_review: anthropic
"#;

    fn sample() -> LlmConfig {
        serde_yaml::from_str::<LlmConfigDocument>(SAMPLE).unwrap().llm
    }

    #[test]
    fn test_parse_sample() {
        let config = sample();
        assert_eq!(config.default_provider, "ollama");
        assert!(config.enable_fallback);
        assert_eq!(config.providers.len(), 2);

        let ollama = &config.providers["ollama"];
        assert_eq!(ollama.kind("ollama"), "ollama");
        assert_eq!(ollama.default_model(), Some("codellama:13b"));
        assert_eq!(ollama.settings.temperature, Some(0.2));
        assert_eq!(ollama.settings.num_ctx, Some(8192));

        let anthropic = &config.providers["anthropic"];
        assert_eq!(anthropic.default_model(), Some("claude-sonnet-4-5"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_is_required() {
        let yaml = r#"
llm:
  default_provider: ollama
  providers:
    ollama:
      host: http://localhost:11434
"#;
        assert!(serde_yaml::from_str::<LlmConfigDocument>(yaml).is_err());
    }

    #[test]
    fn test_routing() {
        let config = sample();

        let target = config.route("code_generation");
        assert_eq!(
            target,
            RoutingTarget::Alias {
                provider: "ollama".to_string(),
                model_key: "code_generation".to_string()
            }
        );
        assert_eq!(config.routed_model(&target).as_deref(), Some("deepseek-coder:6.7b"));

        let target = config.route("architecture_review");
        assert_eq!(target, RoutingTarget::Provider("anthropic".to_string()));
        assert_eq!(config.routed_model(&target).as_deref(), Some("claude-sonnet-4-5"));

        let target = config.route("unmapped_task");
        assert_eq!(target, RoutingTarget::Provider("ollama".to_string()));
        assert_eq!(config.routed_model(&target).as_deref(), Some("codellama:13b"));
    }

    #[test]
    fn test_provider_lookup() {
        let config = sample();
        assert!(config.provider("ollama").is_ok());
        assert!(matches!(config.provider("anthropic"), Err(LLMError::Configuration(_))));
        assert!(matches!(config.provider("openai"), Err(LLMError::Configuration(_))));
    }

    #[test]
    fn test_resolve_model_alias() {
        let config = sample();
        let ollama = &config.providers["ollama"];
        assert_eq!(ollama.resolve_model("code_generation"), "deepseek-coder:6.7b");
        assert_eq!(ollama.resolve_model("llama3.2"), "llama3.2");
    }

    #[test]
    fn test_validation() {
        let mut config = sample();

        config.default_provider = "missing".to_string();
        assert!(config.validate().is_err());
        config.default_provider = "ollama".to_string();

        config.fallback_provider = Some("missing".to_string());
        assert!(config.validate().is_err());
        config.fallback_provider = Some("anthropic".to_string());

        config
            .task_routing
            .insert("summarize".to_string(), "openai".to_string());
        assert!(config.validate().is_err());

        config
            .task_routing
            .insert("summarize".to_string(), "ollama.no_such_alias".to_string());
        assert!(config.validate().is_err());

        config
            .task_routing
            .insert("summarize".to_string(), "ollama".to_string());
        assert!(config.validate().is_ok());
    }
}
