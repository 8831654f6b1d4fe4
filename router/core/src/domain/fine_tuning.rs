// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fine-Tuning Collaborator Boundary
//
// Dataset generation, training and evaluation run outside this crate. These
// types describe the only surface a fine-tuning engine relies on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One instruction-tuning example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub instruction: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    pub output: String,
}

/// Produces training examples from a source tree, in a stable order
#[async_trait]
pub trait TrainingDataSource: Send + Sync {
    async fn generate_from_codebase(&self, path: &Path) -> anyhow::Result<Vec<TrainingExample>>;
}

/// Scores a trained model; metric name -> value
#[async_trait]
pub trait ModelEvaluator: Send + Sync {
    async fn evaluate(&self) -> anyhow::Result<BTreeMap<String, f64>>;
}
