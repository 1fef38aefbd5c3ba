//! Scoring functions: (state, candidate transition) -> scalar.
//!
//! The search only needs batched inference; the learner additionally calls
//! `update` with contrastive examples. Backends:
//!
//! - [`LinearScorer`]: hashed sparse features, trained with InfoNCE by SGD
//! - [`InverseLength`]: prefers shorter resulting expressions
//! - [`Uniform`]: constant score (a random policy under full exploration)

use crate::config::ScorerConfig;
use crate::snapshot::{self, SnapshotError};
use eqsearch_env::{State, Transition};
use eqsearch_expr::digest::fnv1a64;
use eqsearch_expr::Expr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("feature dimension mismatch: scorer has {expected}, snapshot has {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("non-finite loss ({0}) during update")]
    NonFiniteLoss(f32),
    #[error("scorer produced {got} scores for {expected} candidates")]
    BatchSize { expected: usize, got: usize },
    #[error("invalid scorer configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One observed transition and alternatives from the same parent.
#[derive(Debug, Clone)]
pub struct ContrastiveExample {
    pub state: State,
    pub positive: Transition,
    pub negatives: Vec<Transition>,
}

pub trait ScoringFunction: Send + Sync {
    /// Backend identifier, also written into snapshots.
    fn backend(&self) -> &'static str;

    /// One score per candidate, same order.
    fn score_batch(&self, state: &State, candidates: &[Transition])
        -> Result<Vec<f32>, ScoringError>;

    /// One noise-contrastive step; returns the mean loss of the batch.
    fn update(&mut self, batch: &[ContrastiveExample]) -> Result<f32, ScoringError>;

    fn save_snapshot(&self, path: &Path) -> Result<(), ScoringError>;

    /// Replace the current parameters with a saved snapshot.
    fn load_pretrained(&mut self, path: &Path) -> Result<(), ScoringError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    Linear,
    InverseLength,
    Uniform,
}

impl std::fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScorerKind::Linear => "linear",
            ScorerKind::InverseLength => "inverse_length",
            ScorerKind::Uniform => "uniform",
        })
    }
}

/// Fresh scorer for `config`, then `load_pretrained` if a snapshot is named.
pub fn build_scorer(config: &ScorerConfig) -> Result<Box<dyn ScoringFunction>, ScoringError> {
    let mut scorer: Box<dyn ScoringFunction> = match config.kind {
        ScorerKind::Linear => Box::new(LinearScorer::new(config.feature_dim, config.learning_rate)?),
        ScorerKind::InverseLength => Box::new(InverseLength),
        ScorerKind::Uniform => Box::new(Uniform),
    };
    if let Some(path) = &config.load_pretrained {
        scorer.load_pretrained(path)?;
        tracing::info!(path = %path.display(), backend = scorer.backend(), "loaded pretrained scorer");
    }
    Ok(scorer)
}

// ============================================================================
// Linear scorer
// ============================================================================

/// Slots reserved for dense features ahead of the hashed ones.
const DENSE_SLOTS: usize = 2;
const SLOT_SIZE_DELTA: usize = 0;
const SLOT_SOLVED: usize = 1;

type Features = Vec<(usize, f32)>;

#[derive(Debug, Clone)]
pub struct LinearScorer {
    weights: Vec<f32>,
    learning_rate: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinearSnapshot {
    learning_rate: f32,
    weights: Vec<f32>,
}

impl LinearScorer {
    pub const BACKEND: &'static str = "linear";

    pub fn new(feature_dim: usize, learning_rate: f32) -> Result<Self, ScoringError> {
        if feature_dim <= DENSE_SLOTS {
            return Err(ScoringError::Config(format!(
                "feature_dim must exceed {DENSE_SLOTS}, got {feature_dim}"
            )));
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(ScoringError::Config(format!(
                "learning_rate must be positive, got {learning_rate}"
            )));
        }
        Ok(Self {
            weights: vec![0.0; feature_dim],
            learning_rate,
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn slot(&self, key: &str) -> usize {
        let hashed = self.weights.len() - DENSE_SLOTS;
        DENSE_SLOTS + (fnv1a64(key.as_bytes()) % hashed as u64) as usize
    }

    fn features(&self, state: &State, t: &Transition) -> Features {
        let before = state.expr();
        let after = t.next.expr();
        let name = t.action.name();
        let site = t.action.position();

        let mut out: Features = vec![
            (
                SLOT_SIZE_DELTA,
                (after.size() as f32 - before.size() as f32) / 8.0,
            ),
            (SLOT_SOLVED, if t.next.is_solved() { 1.0 } else { 0.0 }),
        ];
        let mut push = |key: String, value: f32| out.push((self.slot(&key), value));

        push(format!("a={name}"), 1.0);
        push(format!("a={name}|depth={}", site.depth()), 1.0);
        push(format!("a={name}|at={}", before.at(&site).map_or("?", Expr::kind)), 1.0);
        for (side, idx) in [("lhs", 0), ("rhs", 1)] {
            if let Some(node) = after.child(idx) {
                push(format!("next.{side}={}", node.kind()), 1.0);
                push(format!("next.{side}.size={}", node.size().min(12)), 1.0);
            }
        }
        let nodes = after.size() as f32;
        for kind in node_kinds(after) {
            push(format!("next.node={kind}"), 1.0 / nodes);
        }
        out
    }

    fn dot(&self, features: &Features) -> f32 {
        features.iter().map(|(i, v)| self.weights[*i] * v).sum()
    }
}

fn node_kinds(expr: &Expr) -> Vec<&'static str> {
    let mut out = vec![expr.kind()];
    for child in expr.children() {
        out.extend(node_kinds(child));
    }
    out
}

impl ScoringFunction for LinearScorer {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn score_batch(
        &self,
        state: &State,
        candidates: &[Transition],
    ) -> Result<Vec<f32>, ScoringError> {
        Ok(candidates
            .iter()
            .map(|t| self.dot(&self.features(state, t)))
            .collect())
    }

    fn update(&mut self, batch: &[ContrastiveExample]) -> Result<f32, ScoringError> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let mut grad = vec![0.0f32; self.weights.len()];
        let mut total_loss = 0.0f32;

        for example in batch {
            let feats: Vec<Features> = std::iter::once(&example.positive)
                .chain(example.negatives.iter())
                .map(|t| self.features(&example.state, t))
                .collect();
            let logits: Vec<f32> = feats.iter().map(|f| self.dot(f)).collect();
            let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
            let z: f32 = exps.iter().sum();

            // InfoNCE: the positive is class 0.
            total_loss += -(exps[0] / z).ln();
            for (k, f) in feats.iter().enumerate() {
                let target = if k == 0 { 1.0 } else { 0.0 };
                let coeff = exps[k] / z - target;
                for (i, v) in f {
                    grad[*i] += coeff * v;
                }
            }
        }

        let loss = total_loss / batch.len() as f32;
        if !loss.is_finite() {
            return Err(ScoringError::NonFiniteLoss(loss));
        }
        let step = self.learning_rate / batch.len() as f32;
        for (w, g) in self.weights.iter_mut().zip(&grad) {
            *w -= step * g;
        }
        Ok(loss)
    }

    fn save_snapshot(&self, path: &Path) -> Result<(), ScoringError> {
        let body = LinearSnapshot {
            learning_rate: self.learning_rate,
            weights: self.weights.clone(),
        };
        snapshot::write_file(path, Self::BACKEND, &body)?;
        Ok(())
    }

    /// Restores the weights and the learning rate they were trained with.
    fn load_pretrained(&mut self, path: &Path) -> Result<(), ScoringError> {
        let body: LinearSnapshot = snapshot::read_file(path, Self::BACKEND)?;
        if body.weights.len() != self.weights.len() {
            return Err(ScoringError::DimensionMismatch {
                expected: self.weights.len(),
                found: body.weights.len(),
            });
        }
        if !(body.learning_rate.is_finite() && body.learning_rate > 0.0) {
            return Err(ScoringError::Config(format!(
                "snapshot learning_rate must be positive, got {}",
                body.learning_rate
            )));
        }
        if body.learning_rate != self.learning_rate {
            tracing::debug!(
                path = %path.display(),
                configured = self.learning_rate,
                restored = body.learning_rate,
                "learning rate restored from snapshot"
            );
        }
        self.weights = body.weights;
        self.learning_rate = body.learning_rate;
        Ok(())
    }
}

// ============================================================================
// Heuristic backends
// ============================================================================

/// Score = 1 / size of the resulting expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseLength;

impl InverseLength {
    pub const BACKEND: &'static str = "inverse_length";
}

impl ScoringFunction for InverseLength {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn score_batch(
        &self,
        _state: &State,
        candidates: &[Transition],
    ) -> Result<Vec<f32>, ScoringError> {
        Ok(candidates
            .iter()
            .map(|t| 1.0 / t.next.expr().size() as f32)
            .collect())
    }

    fn update(&mut self, _batch: &[ContrastiveExample]) -> Result<f32, ScoringError> {
        Ok(0.0)
    }

    fn save_snapshot(&self, path: &Path) -> Result<(), ScoringError> {
        snapshot::write_file(path, Self::BACKEND, &())?;
        Ok(())
    }

    fn load_pretrained(&mut self, path: &Path) -> Result<(), ScoringError> {
        snapshot::read_file::<()>(path, Self::BACKEND)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Uniform {
    pub const BACKEND: &'static str = "uniform";
}

impl ScoringFunction for Uniform {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn score_batch(
        &self,
        _state: &State,
        candidates: &[Transition],
    ) -> Result<Vec<f32>, ScoringError> {
        Ok(vec![0.0; candidates.len()])
    }

    fn update(&mut self, _batch: &[ContrastiveExample]) -> Result<f32, ScoringError> {
        Ok(0.0)
    }

    fn save_snapshot(&self, path: &Path) -> Result<(), ScoringError> {
        snapshot::write_file(path, Self::BACKEND, &())?;
        Ok(())
    }

    fn load_pretrained(&mut self, path: &Path) -> Result<(), ScoringError> {
        snapshot::read_file::<()>(path, Self::BACKEND)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqsearch_env::Environment;
    use eqsearch_expr::parse_expr;

    fn expanded(text: &str) -> (State, Vec<Transition>) {
        let state = State::new(parse_expr(text).expect("parse"));
        let transitions = Environment::default().expand(&state);
        (state, transitions)
    }

    #[test]
    fn inverse_length_prefers_shorter_results() {
        let (state, ts) = expanded("2x + 3 = 7");
        let scores = InverseLength.score_batch(&state, &ts).expect("scores");
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("non-empty");
        assert_eq!(ts[best].next.canonical(), "2x = 4");
    }

    #[test]
    fn update_raises_positive_margin() {
        let (state, ts) = expanded("2x + 3 = 7");
        let pos = ts
            .iter()
            .position(|t| t.action.name() == "sub_const")
            .expect("sub_const applies");
        let neg = ts
            .iter()
            .position(|t| t.action.name() == "eq_symm")
            .expect("eq_symm applies");
        let example = ContrastiveExample {
            state: state.clone(),
            positive: ts[pos].clone(),
            negatives: vec![ts[neg].clone()],
        };

        let mut scorer = LinearScorer::new(1 << 12, 0.5).expect("valid config");
        let margin = |s: &LinearScorer| {
            let scores = s.score_batch(&state, &ts).expect("scores");
            scores[pos] - scores[neg]
        };
        let before = margin(&scorer);
        let first = scorer.update(std::slice::from_ref(&example)).expect("update");
        assert!(margin(&scorer) > before);
        let second = scorer.update(std::slice::from_ref(&example)).expect("update");
        assert!(second < first, "loss {second} !< {first}");
    }

    #[test]
    fn zero_learning_rate_is_rejected() {
        assert!(matches!(
            LinearScorer::new(64, 0.0),
            Err(ScoringError::Config(_))
        ));
        assert!(LinearScorer::new(1, 0.1).is_err());
    }
}
