// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Calls language models without caring whether they run on a local daemon
//! or behind a cloud API. Configuration decides which provider and model
//! serve a request; [`ProviderFactory`] resolves and caches them.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Implements lib

pub mod domain;
pub mod infrastructure;

pub use domain::llm::{
    ChunkStream, GenerationOptions, LLMError, LLMProvider, Message, ModelInfo,
};
pub use infrastructure::{ConfigSource, ProviderFactory, ResolvedProvider};
