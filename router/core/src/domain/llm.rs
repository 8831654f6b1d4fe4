// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Provider contract shared by every language model backend.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Defines the provider contract, message invariants and errors

// LLM Provider Domain Interface (Anti-Corruption Layer)
//
// Callers only ever see this trait. Whether the model runs on a local daemon
// or behind a cloud API is decided by configuration, not by the caller.
//
// Implementations in infrastructure/llm/ directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Roles accepted in a message sequence
pub const VALID_ROLES: [&str; 3] = ["system", "user", "assistant"];

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_NUM_CTX: u32 = 4096;

/// Lazy, finite, non-restartable sequence of generated text chunks.
///
/// A backend failure mid-stream is delivered as the last item (`Err`); a
/// stream that ends after only `Ok` items completed normally.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Check the message sequence invariants before anything is sent to a backend.
pub fn validate_messages(messages: &[Message]) -> Result<(), LLMError> {
    if messages.is_empty() {
        return Err(LLMError::InvalidInput(
            "Messages list cannot be empty".to_string(),
        ));
    }

    for (index, message) in messages.iter().enumerate() {
        if !VALID_ROLES.contains(&message.role.as_str()) {
            return Err(LLMError::InvalidInput(format!(
                "Invalid role '{}' at index {}. Must be one of {:?}",
                message.role, index, VALID_ROLES
            )));
        }
    }

    Ok(())
}

/// Parse a JSON array of `{role, content}` objects into a validated message
/// sequence. Missing or null fields are reported as `InvalidInput`.
pub fn parse_messages(json: &str) -> Result<Vec<Message>, LLMError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| LLMError::InvalidInput(format!("Messages are not valid JSON: {}", e)))?;

    let entries = value
        .as_array()
        .ok_or_else(|| LLMError::InvalidInput("Messages must be a JSON array".to_string()))?;

    let mut messages = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let object = entry.as_object().ok_or_else(|| {
            LLMError::InvalidInput(format!("Message at index {} must be an object", index))
        })?;

        let role = object
            .get("role")
            .and_then(|r| r.as_str())
            .ok_or_else(|| {
                LLMError::InvalidInput(format!("Message at index {} must have a 'role' field", index))
            })?;

        let content = object
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                LLMError::InvalidInput(format!(
                    "Message at index {} must have a non-null 'content' field",
                    index
                ))
            })?;

        messages.push(Message::new(role, content));
    }

    validate_messages(&messages)?;
    Ok(messages)
}

/// Per-call overrides. Every `None` falls back to the provider configuration,
/// then to the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier or model alias key
    pub model: Option<String>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter
    pub top_p: Option<f32>,

    /// Context window size in tokens
    pub num_ctx: Option<u32>,
}

impl GenerationOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Generation settings as they appear in a provider's configuration block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

/// Fully resolved settings for a single call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub num_ctx: u32,
}

impl GenerationSettings {
    /// Apply the layered defaults: per-call value, then configured value,
    /// then the built-in constant.
    pub fn resolve(&self, options: &GenerationOptions) -> EffectiveSettings {
        EffectiveSettings {
            temperature: options
                .temperature
                .or(self.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: options
                .max_tokens
                .or(self.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            top_p: options.top_p.or(self.top_p).unwrap_or(DEFAULT_TOP_P),
            num_ctx: options.num_ctx.or(self.num_ctx).unwrap_or(DEFAULT_NUM_CTX),
        }
    }
}

/// Metadata about a provider's default model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,

    /// Size on disk in bytes, when the backend reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    pub available: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModelInfo {
    pub fn unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            available: false,
            modified_at: None,
            details: None,
            message: Some(message.into()),
        }
    }
}

/// Domain interface for LLM providers
/// Anti-Corruption Layer that isolates business logic from vendor APIs
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Configured provider name (e.g., "ollama", "anthropic")
    fn name(&self) -> &str;

    /// Model used when no override is given
    fn default_model(&self) -> &str;

    /// Generate a complete response
    async fn invoke(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LLMError>;

    /// Generate a response as a stream of text chunks
    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, LLMError>;

    /// Run several independent conversations. The output has the same length
    /// and order as the input; one failure does not affect the others.
    async fn batch(
        &self,
        batches: &[Vec<Message>],
        options: &GenerationOptions,
    ) -> Vec<Result<String, LLMError>> {
        let mut results = Vec::with_capacity(batches.len());
        for messages in batches {
            results.push(self.invoke(messages, options).await);
        }
        results
    }

    /// Cheap liveness probe. Never fails; any error reports `false`.
    async fn is_available(&self) -> bool;

    /// Describe the default model without failing when it is missing
    async fn model_info(&self) -> ModelInfo;

    fn validate_messages(&self, messages: &[Message]) -> Result<(), LLMError> {
        validate_messages(messages)
    }
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    #[error("Model fetch failed: {0}")]
    ModelFetch(String),

    #[error("Unknown provider type: {0}")]
    UnknownProviderType(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_sequence() {
        let err = validate_messages(&[]).unwrap_err();
        assert!(matches!(err, LLMError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_role() {
        let messages = vec![Message::user("hi"), Message::new("tool", "result")];
        let err = validate_messages(&messages).unwrap_err();
        match err {
            LLMError::InvalidInput(msg) => assert!(msg.contains("tool")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_all_roles() {
        let messages = vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        assert!(validate_messages(&messages).is_ok());
    }

    #[test]
    fn test_parse_messages_null_content() {
        let err = parse_messages(r#"[{"role": "user", "content": null}]"#).unwrap_err();
        assert!(matches!(err, LLMError::InvalidInput(_)));

        let err = parse_messages(r#"[{"role": "user"}]"#).unwrap_err();
        assert!(matches!(err, LLMError::InvalidInput(_)));
    }

    #[test]
    fn test_parse_messages_shapes() {
        assert!(matches!(
            parse_messages(r#"{"role": "user", "content": "x"}"#),
            Err(LLMError::InvalidInput(_))
        ));
        assert!(matches!(parse_messages("[]"), Err(LLMError::InvalidInput(_))));
        assert!(matches!(
            parse_messages(r#"[{"role": "robot", "content": "x"}]"#),
            Err(LLMError::InvalidInput(_))
        ));

        let messages =
            parse_messages(r#"[{"role": "system", "content": "s"}, {"role": "user", "content": "u"}]"#)
                .unwrap();
        assert_eq!(messages, vec![Message::system("s"), Message::user("u")]);
    }

    #[test]
    fn test_settings_layering() {
        let configured = GenerationSettings {
            temperature: Some(0.2),
            max_tokens: None,
            top_p: Some(0.5),
            num_ctx: None,
        };
        let options = GenerationOptions {
            temperature: Some(0.9),
            ..Default::default()
        };

        let effective = configured.resolve(&options);
        assert_eq!(effective.temperature, 0.9);
        assert_eq!(effective.top_p, 0.5);
        assert_eq!(effective.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(effective.num_ctx, DEFAULT_NUM_CTX);
    }
}
