//! Search and learning for equation rewriting.
//!
//! The [`Learner`] drives episodes: each one runs a [`BeamSearch`] over the
//! transition graph of an [`eqsearch_env::Environment`], ranked by a
//! [`ScoringFunction`]. Trajectories go into the [`ReplayBuffer`], which
//! periodically feeds contrastive updates back into the scorer.

pub mod config;
pub mod evaluation;
pub mod export;
pub mod learner;
pub mod replay;
pub mod scoring;
pub mod search;
pub mod snapshot;
pub mod trajectory;

pub use config::{
    AbstractionsConfig, BootstrapConfig, BootstrapPolicy, ConfigError, EvalConfig,
    ExperimentConfig, LearnerConfig, ScorerConfig, SearchConfig,
};
pub use evaluation::{EvaluationReport, SuccessRateEvaluator};
pub use export::{read_solutions, ExportError, SolutionLog, SolutionRecord, SolutionStep};
pub use learner::{
    LearnError, Learner, NoopObserver, TrainingObserver, TrainingState, TrainingSummary,
};
pub use replay::{ReplayBuffer, ReplayEntry};
pub use scoring::{
    build_scorer, ContrastiveExample, InverseLength, LinearScorer, ScorerKind, ScoringError,
    ScoringFunction, Uniform,
};
pub use search::{BeamSearch, SearchResult, SearchStats};
pub use snapshot::SnapshotError;
pub use trajectory::{Trajectory, TrajectoryStep};
