// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Anthropic LLM Provider Adapter
//
// Anti-Corruption Layer for the Anthropic Messages API.
// Remote models are always considered materialized; there is no local
// model lifecycle.

use super::{drain_lines, normalize_endpoint, transport_error, INCOMPLETE_STREAM, PROBE_TIMEOUT};
use crate::domain::llm::{
    ChunkStream, GenerationOptions, LLMError, LLMProvider, Message, ModelInfo,
};
use crate::domain::llm_config::ProviderConfig;
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const API_VERSION: &str = "2023-06-01";

/// Requests in flight per batch call
const MAX_CONCURRENT_REQUESTS: usize = 4;

pub struct AnthropicProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, LLMError> {
        let base_url =
            normalize_endpoint(name, config.host.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let default_model = config.default_model().unwrap_or(DEFAULT_MODEL).to_string();
        let api_key = config.api_key.clone().unwrap_or_default();

        if api_key.is_empty() {
            warn!("Provider '{}' has no API key; it will report unavailable", name);
        }

        info!("Initialized Anthropic provider '{}' with model {}", name, default_model);

        Ok(Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            base_url,
            api_key,
            default_model,
            config: config.clone(),
        })
    }

    fn target_model(&self, options: &GenerationOptions) -> String {
        match options.model.as_deref() {
            Some(requested) => self.config.resolve_model(requested).to_string(),
            None => self.default_model.clone(),
        }
    }

    /// System turns travel in the top-level `system` field
    fn build_request<'a>(
        &self,
        messages: &'a [Message],
        model: &'a str,
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<AnthropicRequest<'a>, LLMError> {
        let settings = self.config.settings.resolve(options);

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();

        let turns: Vec<AnthropicMessage<'a>> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| AnthropicMessage {
                role: &m.role,
                content: &m.content,
            })
            .collect();

        if turns.is_empty() {
            return Err(LLMError::InvalidInput(
                "At least one user or assistant message is required".to_string(),
            ));
        }

        Ok(AnthropicRequest {
            model,
            messages: turns,
            max_tokens: settings.max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: settings.temperature,
            // Only sent when asked for; newer models reject temperature + top_p
            top_p: options.top_p.or(self.config.settings.top_p),
            stream,
        })
    }

    async fn send_messages(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        self.validate_messages(messages)?;

        let model = self.target_model(options);
        let request = self.build_request(messages, &model, options, stream)?;

        debug!("Invoking Anthropic with model {} (stream: {})", model, stream);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text, &model));
        }

        Ok(response)
    }
}

fn status_error(status: reqwest::StatusCode, body: &str, model: &str) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::BackendUnavailable(format!("Authentication rejected: {}", body)),
        429 => LLMError::BackendUnavailable("Rate limit exceeded".to_string()),
        404 => LLMError::BackendProtocol(format!("Model '{}' not found: {}", model, body)),
        code if code >= 500 => LLMError::BackendUnavailable(format!("HTTP {}: {}", status, body)),
        _ => LLMError::BackendProtocol(format!("HTTP {}: {}", status, body)),
    }
}

/// Decode one server-sent event block. Returns the text delta (if any) and
/// whether the message is complete.
fn parse_event(block: &str) -> Result<(Option<String>, bool), LLMError> {
    let Some(data) = block
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
    else {
        return Ok((None, false));
    };

    let event: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| LLMError::BackendProtocol(format!("Malformed stream event: {}", e)))?;

    match event["type"].as_str() {
        Some("content_block_delta") => Ok((
            event["delta"]["text"].as_str().map(str::to_string),
            false,
        )),
        Some("message_stop") => Ok((None, true)),
        Some("error") => Err(LLMError::BackendProtocol(
            event["error"]["message"]
                .as_str()
                .unwrap_or("unknown stream error")
                .to_string(),
        )),
        _ => Ok((None, false)),
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LLMError> {
        let response = self.send_messages(messages, options, false).await?;

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LLMError::BackendProtocol(format!("Failed to parse response: {}", e)))?;

        let text: String = anthropic_response
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text)
            .collect();

        Ok(text)
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, LLMError> {
        let response = self.send_messages(messages, options, true).await?;
        let mut body = response.bytes_stream();

        let chunks = stream! {
            let mut buffer = Vec::new();
            let mut block = String::new();
            while let Some(bytes) = body.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Anthropic streaming failed: {}", e);
                        yield Err(transport_error(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                // drain_lines drops blank separators, so each `data:` line
                // closes an event block
                for line in drain_lines(&mut buffer) {
                    block.push_str(&line);
                    block.push('\n');
                    if !line.starts_with("data:") {
                        continue;
                    }

                    let event = std::mem::take(&mut block);
                    match parse_event(&event) {
                        Ok((text, done)) => {
                            if let Some(text) = text {
                                yield Ok(text);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Anthropic streaming failed: {}", e);
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            warn!("Anthropic stream ended without message_stop");
            yield Err(LLMError::BackendProtocol(INCOMPLETE_STREAM.to_string()));
        };

        Ok(Box::pin(chunks))
    }

    async fn batch(
        &self,
        batches: &[Vec<Message>],
        options: &GenerationOptions,
    ) -> Vec<Result<String, LLMError>> {
        let calls: Vec<_> = batches
            .iter()
            .map(|messages| self.invoke(messages, options))
            .collect();

        futures::stream::iter(calls)
            .buffered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }

        let result = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .query(&[("limit", "1")])
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Anthropic not available: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Anthropic not available: {}", e);
                false
            }
        }
    }

    async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.default_model.clone(),
            size: None,
            available: true,
            modified_at: None,
            details: Some(serde_json::json!({ "provider": "anthropic", "remote": true })),
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn provider() -> AnthropicProvider {
        let config = ProviderConfig {
            enabled: true,
            provider_type: None,
            host: None,
            api_key: Some("sk-test".to_string()),
            model: Some("claude-sonnet-4-5".to_string()),
            models: BTreeMap::from([("fast".to_string(), "claude-haiku-4-5".to_string())]),
            settings: Default::default(),
        };
        AnthropicProvider::from_config("anthropic", &config).unwrap()
    }

    #[test]
    fn test_system_messages_are_lifted() {
        let provider = provider();
        let messages = vec![
            Message::system("be terse"),
            Message::system("answer in English"),
            Message::user("hi"),
        ];

        let request = provider
            .build_request(&messages, "claude-sonnet-4-5", &GenerationOptions::default(), false)
            .unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "be terse\n\nanswer in English");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["max_tokens"], 2048);
        assert!(json.get("top_p").is_none());
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_only_system_messages_rejected() {
        let provider = provider();
        let messages = vec![Message::system("be terse")];
        assert!(matches!(
            provider.build_request(&messages, "m", &GenerationOptions::default(), false),
            Err(LLMError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_model_alias_override() {
        let provider = provider();
        let options = GenerationOptions::default().with_model("fast");
        assert_eq!(provider.target_model(&options), "claude-haiku-4-5");
        assert_eq!(provider.target_model(&GenerationOptions::default()), "claude-sonnet-4-5");
    }

    #[test]
    fn test_parse_event() {
        let delta = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n";
        assert_eq!(parse_event(delta).unwrap(), (Some("Hel".to_string()), false));

        let stop = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n";
        assert_eq!(parse_event(stop).unwrap(), (None, true));

        let ping = "event: ping\ndata: {\"type\":\"ping\"}\n";
        assert_eq!(parse_event(ping).unwrap(), (None, false));

        let error = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n";
        assert!(matches!(
            parse_event(error),
            Err(LLMError::BackendProtocol(msg)) if msg == "Overloaded"
        ));
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "", "m"),
            LLMError::BackendUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "", "m"),
            LLMError::BackendProtocol(_)
        ));
        assert!(matches!(
            status_error(StatusCode::from_u16(529).unwrap(), "", "m"),
            LLMError::BackendUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let config = ProviderConfig {
            enabled: true,
            provider_type: None,
            host: Some("http://127.0.0.1:9".to_string()),
            api_key: Some(String::new()),
            model: None,
            models: BTreeMap::new(),
            settings: Default::default(),
        };
        let provider = AnthropicProvider::from_config("anthropic", &config).unwrap();
        assert!(!provider.is_available().await);
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
    }
}
