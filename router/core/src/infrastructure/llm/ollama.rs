// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama LLM Provider Adapter
//
// Anti-Corruption Layer for a local Ollama daemon.
// Models are pulled on demand: a chat request is never sent for a model that
// is not present locally.

use super::{drain_lines, normalize_endpoint, transport_error, INCOMPLETE_STREAM, PROBE_TIMEOUT};
use crate::domain::llm::{
    ChunkStream, GenerationOptions, LLMError, LLMProvider, Message, ModelInfo,
};
use crate::domain::llm_config::ProviderConfig;
use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "codellama:13b";

pub struct OllamaProvider {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    default_model: String,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelEntry>,
}

#[derive(Deserialize)]
struct OllamaModelEntry {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct OllamaModelRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OllamaStatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaProvider {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, LLMError> {
        let endpoint = normalize_endpoint(name, config.host.as_deref().unwrap_or(DEFAULT_HOST))?;
        let default_model = config.default_model().unwrap_or(DEFAULT_MODEL).to_string();

        info!("Initialized Ollama provider '{}' at {}", name, endpoint);
        info!("Default model: {}", default_model);

        Ok(Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            endpoint,
            default_model,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn target_model(&self, options: &GenerationOptions) -> String {
        match options.model.as_deref() {
            Some(requested) => self.config.resolve_model(requested).to_string(),
            None => self.default_model.clone(),
        }
    }

    fn chat_request<'a>(
        &self,
        messages: &'a [Message],
        model: &'a str,
        options: &GenerationOptions,
        stream: bool,
    ) -> OllamaChatRequest<'a> {
        let settings = self.config.settings.resolve(options);
        OllamaChatRequest {
            model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: settings.temperature,
                num_predict: settings.max_tokens,
                top_p: settings.top_p,
                num_ctx: settings.num_ctx,
            },
        }
    }

    async fn local_models(&self) -> Result<Vec<OllamaModelEntry>, LLMError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(LLMError::BackendProtocol(format!(
                "HTTP {} listing models",
                response.status()
            )));
        }

        let tags: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| LLMError::BackendProtocol(format!("Failed to parse model list: {}", e)))?;

        Ok(tags.models)
    }

    /// Names of every model present on the daemon
    pub async fn list_available_models(&self) -> Result<Vec<String>, LLMError> {
        Ok(self
            .local_models()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    /// Pull a model from the Ollama registry. Pulling a model that is already
    /// present is a no-op on the daemon side.
    pub async fn pull_model(&self, model: &str) -> Result<(), LLMError> {
        info!("Pulling model {}...", model);

        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&OllamaModelRequest {
                model,
                stream: Some(false),
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        let parsed = serde_json::from_str::<OllamaStatusResponse>(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| format!("HTTP {}: {}", status, body));
            error!("Failed to pull model {}: {}", model, detail);
            return Err(LLMError::ModelFetch(format!("{}: {}", model, detail)));
        }

        if let Some(detail) = parsed.as_ref().and_then(|p| p.error.clone()) {
            error!("Failed to pull model {}: {}", model, detail);
            return Err(LLMError::ModelFetch(format!("{}: {}", model, detail)));
        }

        debug!(
            "Pull finished with status {:?}",
            parsed.and_then(|p| p.status)
        );
        info!("Successfully pulled model {}", model);
        Ok(())
    }

    /// Remove a model from local storage
    pub async fn delete_model(&self, model: &str) -> Result<(), LLMError> {
        info!("Deleting model {}...", model);

        let response = self
            .client
            .delete(self.url("/api/delete"))
            .json(&OllamaModelRequest {
                model,
                stream: None,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::BackendProtocol(format!(
                "Failed to delete {}: HTTP {}: {}",
                model, status, error_text
            )));
        }

        info!("Successfully deleted {}", model);
        Ok(())
    }

    /// Make sure `model` is present locally, pulling it if needed
    async fn ensure_model_available(&self, model: &str) -> Result<(), LLMError> {
        let local = self.local_models().await?;
        if local.iter().any(|m| same_model(&m.name, model)) {
            return Ok(());
        }

        info!("Model {} not found locally. Pulling...", model);
        self.pull_model(model).await
    }

    async fn send_chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        self.validate_messages(messages)?;

        let model = self.target_model(options);
        self.ensure_model_available(&model).await?;

        debug!("Invoking Ollama with model {} (stream: {})", model, stream);

        let request = self.chat_request(messages, &model, options, stream);
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama request failed: HTTP {}: {}", status, error_text);

            return Err(if status == 404 {
                LLMError::ModelFetch(model)
            } else {
                LLMError::BackendProtocol(format!("HTTP {}: {}", status, error_text))
            });
        }

        Ok(response)
    }
}

/// Ollama stores untagged models as `name:latest`
fn same_model(local: &str, requested: &str) -> bool {
    local == requested
        || (!requested.contains(':')
            && local
                .strip_suffix(":latest")
                .is_some_and(|base| base == requested))
}

/// Decode one NDJSON line of a streaming chat response.
/// Returns the text fragment (if any) and whether the response is complete.
fn parse_chat_line(line: &str) -> Result<(Option<String>, bool), LLMError> {
    let chunk: OllamaChatResponse = serde_json::from_str(line)
        .map_err(|e| LLMError::BackendProtocol(format!("Malformed stream chunk: {}", e)))?;

    if let Some(detail) = chunk.error {
        return Err(LLMError::BackendProtocol(detail));
    }

    let text = chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty());

    Ok((text, chunk.done))
}

#[async_trait]
impl LLMProvider for OllamaProvider {
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
        let response = self.send_chat(messages, options, false).await?;

        let chat: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::BackendProtocol(format!("Failed to parse response: {}", e)))?;

        if let Some(detail) = chat.error {
            return Err(LLMError::BackendProtocol(detail));
        }

        chat.message
            .map(|m| m.content)
            .ok_or_else(|| LLMError::BackendProtocol("Response has no message".to_string()))
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream, LLMError> {
        let response = self.send_chat(messages, options, true).await?;
        let mut body = response.bytes_stream();

        let chunks = stream! {
            let mut buffer = Vec::new();
            while let Some(bytes) = body.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Ollama streaming failed: {}", e);
                        yield Err(transport_error(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                for line in drain_lines(&mut buffer) {
                    match parse_chat_line(&line) {
                        Ok((text, done)) => {
                            if let Some(text) = text {
                                yield Ok(text);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Ollama streaming failed: {}", e);
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            // Trailing line without a newline terminator
            let tail = String::from_utf8_lossy(&buffer).trim().to_string();
            if !tail.is_empty() {
                match parse_chat_line(&tail) {
                    Ok((text, done)) => {
                        if let Some(text) = text {
                            yield Ok(text);
                        }
                        if done {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            warn!("Ollama stream ended without done");
            yield Err(LLMError::BackendProtocol(INCOMPLETE_STREAM.to_string()));
        };

        Ok(Box::pin(chunks))
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(self.url("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Ollama not available: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Ollama not available: {}", e);
                false
            }
        }
    }

    async fn model_info(&self) -> ModelInfo {
        let models = match self.local_models().await {
            Ok(models) => models,
            Err(e) => {
                error!("Failed to get model info: {}", e);
                return ModelInfo::unavailable(&self.default_model, e.to_string());
            }
        };

        match models
            .into_iter()
            .find(|m| same_model(&m.name, &self.default_model))
        {
            Some(entry) => ModelInfo {
                name: entry.name,
                size: entry.size,
                available: true,
                modified_at: entry
                    .modified_at
                    .as_deref()
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|ts| ts.with_timezone(&Utc)),
                details: entry.details,
                message: None,
            },
            None => ModelInfo::unavailable(&self.default_model, "Model not pulled yet"),
        }
    }
}
