//! Experiment configuration.
//!
//! A single JSON document; every field has a default so partial files are
//! fine:
//!
//! ```json
//! {
//!   "search": {"initial_depth": 2, "beam_size": 4},
//!   "learner": {"max_episodes": 500, "bootstrap": {"n_bootstrap_problems": 50}},
//!   "abstractions": {"path": "abs.json", "mode": "tree_idx"}
//! }
//! ```

use crate::scoring::ScorerKind;
use eqsearch_env::AbstractionMode;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub initial_depth: u32,
    pub depth_step: u32,
    pub max_depth: u32,
    pub beam_size: usize,
    /// Probability of filling a beam slot with a random candidate.
    pub epsilon: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_depth: 4,
            depth_step: 2,
            max_depth: 8,
            beam_size: 8,
            epsilon: 0.0,
        }
    }
}

impl SearchConfig {
    /// Depth budgets of successive attempts.
    pub fn depth_schedule(&self) -> Vec<u32> {
        let mut out = vec![self.initial_depth.min(self.max_depth)];
        let mut depth = out[0];
        while depth < self.max_depth && self.depth_step > 0 {
            depth = depth.saturating_add(self.depth_step).min(self.max_depth);
            out.push(depth);
        }
        out
    }

    pub fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        if self.beam_size == 0 {
            return Err(invalid(section, "beam_size must be at least 1"));
        }
        if self.initial_depth == 0 {
            return Err(invalid(section, "initial_depth must be at least 1"));
        }
        if self.initial_depth > self.max_depth {
            return Err(invalid(
                section,
                format!(
                    "initial_depth ({}) exceeds max_depth ({})",
                    self.initial_depth, self.max_depth
                ),
            ));
        }
        if self.depth_step == 0 && self.initial_depth < self.max_depth {
            return Err(invalid(section, "depth_step must be positive below max_depth"));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(invalid(
                section,
                format!("epsilon must lie in [0, 1], got {}", self.epsilon),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    #[default]
    InverseLength,
    Random,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub policy: BootstrapPolicy,
    pub n_bootstrap_problems: usize,
    /// JSONL solution log; when set, heuristic bootstrapping is skipped.
    pub example_solutions: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub buffer_capacity: usize,
    pub optimize_every: usize,
    pub n_gradient_steps: usize,
    pub batch_size: usize,
    pub n_negatives: usize,
    pub step_every: usize,
    pub max_episodes: usize,
    pub seed: u64,
    pub bootstrap: BootstrapConfig,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100_000,
            optimize_every: 16,
            n_gradient_steps: 32,
            batch_size: 64,
            n_negatives: 8,
            step_every: 200,
            max_episodes: 2_000,
            seed: 0,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl LearnerConfig {
    /// Generator seeds consumed by bootstrap and training episodes.
    pub fn seed_range(&self) -> Range<u64> {
        let span = (self.bootstrap.n_bootstrap_problems + self.max_episodes) as u64;
        self.seed..self.seed.saturating_add(span)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub n_problems: usize,
    pub seed: u64,
    pub search: SearchConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            n_problems: 100,
            seed: 1_000_000,
            search: SearchConfig::default(),
        }
    }
}

impl EvalConfig {
    pub fn seed_range(&self) -> Range<u64> {
        self.seed..self.seed.saturating_add(self.n_problems as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractionsConfig {
    pub path: Option<PathBuf>,
    pub mode: AbstractionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub kind: ScorerKind,
    pub feature_dim: usize,
    pub learning_rate: f32,
    pub load_pretrained: Option<PathBuf>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            kind: ScorerKind::Linear,
            feature_dim: 4096,
            learning_rate: 0.05,
            load_pretrained: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Restrict the axiom registry to these names (all axioms when absent).
    pub axioms: Option<Vec<String>>,
    pub search: SearchConfig,
    pub learner: LearnerConfig,
    pub eval: EvalConfig,
    pub abstractions: AbstractionsConfig,
    pub scorer: ScorerConfig,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate("search")?;
        self.eval.search.validate("eval.search")?;

        let learner = &self.learner;
        for (field, value) in [
            ("learner.buffer_capacity", learner.buffer_capacity),
            ("learner.optimize_every", learner.optimize_every),
            ("learner.batch_size", learner.batch_size),
            ("learner.step_every", learner.step_every),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1"));
            }
        }

        let train = learner.seed_range();
        let held_out = self.eval.seed_range();
        if train.start < held_out.end && held_out.start < train.end {
            return Err(invalid(
                "eval.seed",
                format!(
                    "held-out seeds {held_out:?} overlap training seeds {train:?}"
                ),
            ));
        }

        if self.abstractions.mode == AbstractionMode::DfsIdx {
            return Err(invalid(
                "abstractions.mode",
                "`dfs_idx` is no longer supported; use `tree_idx`",
            ));
        }

        if self.scorer.kind == ScorerKind::Linear {
            if self.scorer.feature_dim < 16 {
                return Err(invalid("scorer.feature_dim", "must be at least 16"));
            }
            if !(self.scorer.learning_rate.is_finite() && self.scorer.learning_rate > 0.0) {
                return Err(invalid("scorer.learning_rate", "must be positive"));
            }
        }
        Ok(())
    }
}
