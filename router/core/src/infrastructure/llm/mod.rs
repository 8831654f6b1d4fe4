// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each provider adapter translates between the domain contract and one
// backend's HTTP API. The factory turns configuration into cached adapters.

pub mod ollama;
pub mod anthropic;
pub mod factory;

pub use anthropic::AnthropicProvider;
pub use factory::{ProviderConstructor, ProviderFactory, ResolvedProvider};
pub use ollama::OllamaProvider;

use crate::domain::llm::LLMError;
use std::time::Duration;

/// Upper bound for liveness probes
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reported when a response body ends before the backend's terminal event
pub(crate) const INCOMPLETE_STREAM: &str = "stream ended before completion";

/// Classify a transport error: anything that never produced a response is an
/// availability problem, everything else is a protocol problem.
pub(crate) fn transport_error(error: reqwest::Error) -> LLMError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        LLMError::BackendUnavailable(error.to_string())
    } else {
        LLMError::BackendProtocol(error.to_string())
    }
}

/// Normalize a configured host into a base URL without a trailing slash
pub(crate) fn normalize_endpoint(provider: &str, host: &str) -> Result<String, LLMError> {
    let host = host.trim();
    if !(host.starts_with("http://") || host.starts_with("https://")) {
        return Err(LLMError::Configuration(format!(
            "Provider '{}' host must be an http(s) URL, got '{}'",
            provider, host
        )));
    }
    Ok(host.trim_end_matches('/').to_string())
}

/// Pop every complete `\n`-terminated line out of `buffer`
pub(crate) fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}
