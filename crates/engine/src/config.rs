// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Engine configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! memory_budget = "512M"
//! scaling = "always"
//! scaling_threshold = 1e-100
//! num_threads = 4
//! enable_metrics = true
//! ```

use crate::EngineError;
use buffer_store::MemoryBudget;
use likelihood_kernels::{ScalingPolicy, DEFAULT_SCALING_THRESHOLD};
use std::path::Path;

/// Settings shared by every instance of an [`InstanceTable`](crate::InstanceTable).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-instance allocation ceiling (human-readable, e.g. `"512M"`).
    pub memory_budget: Option<String>,
    /// Rescaling mode: `"always"` or `"threshold"`.
    pub scaling: String,
    /// Underflow threshold for `"threshold"` mode.
    pub scaling_threshold: f64,
    /// Worker threads of the threaded backend (defaults to the resource's
    /// thread count).
    pub num_threads: Option<usize>,
    /// Whether instances collect [`EngineMetrics`](crate::EngineMetrics).
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_budget: None,
            scaling: "always".to_string(),
            scaling_threshold: DEFAULT_SCALING_THRESHOLD,
            num_threads: None,
            enable_metrics: true,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| EngineError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks every field that can be checked without allocating.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.parse_budget()?;
        self.scaling_policy()?;
        if self.num_threads == Some(0) {
            return Err(EngineError::Config("num_threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Parses the memory budget, if one is set.
    pub fn parse_budget(&self) -> Result<Option<MemoryBudget>, EngineError> {
        self.memory_budget
            .as_deref()
            .map(MemoryBudget::parse)
            .transpose()
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Resolves the rescaling policy.
    pub fn scaling_policy(&self) -> Result<ScalingPolicy, EngineError> {
        match self.scaling.to_lowercase().as_str() {
            "always" => Ok(ScalingPolicy::Always),
            "threshold" => {
                let t = self.scaling_threshold;
                if t > 0.0 && t.is_finite() {
                    Ok(ScalingPolicy::BelowThreshold(t))
                } else {
                    Err(EngineError::Config(format!(
                        "scaling_threshold must be positive and finite, got {t}"
                    )))
                }
            }
            other => Err(EngineError::Config(format!(
                "unknown scaling mode '{other}'; expected 'always' or 'threshold'"
            ))),
        }
    }

    /// Resolves the worker count for a resource advertising `resource_threads`.
    pub fn resolve_threads(&self, resource_threads: u32) -> usize {
        self.num_threads
            .unwrap_or(resource_threads as usize)
            .max(1)
    }
}
