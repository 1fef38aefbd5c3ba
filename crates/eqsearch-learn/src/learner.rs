//! The training loop: search episodes feed the replay buffer, which feeds
//! contrastive scorer updates; the scorer is evaluated periodically on
//! held-out problems.

use crate::config::{
    BootstrapPolicy, ConfigError, ExperimentConfig, LearnerConfig, SearchConfig,
};
use crate::evaluation::{EvaluationReport, SuccessRateEvaluator};
use crate::export::{read_solutions, ExportError};
use crate::replay::ReplayBuffer;
use crate::scoring::{InverseLength, ScoringError, ScoringFunction, Uniform};
use crate::search::BeamSearch;
use crate::trajectory::Trajectory;
use eqsearch_env::{generate, Environment};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("failed to access training state {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed training state {path}: {source}")]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("training observer failed: {0}")]
    Observer(String),
}

/// Counters that survive a restart. Saved next to the scorer at every
/// checkpoint so an interrupted run continues where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingState {
    /// Training episodes run so far; also the offset of the next episode seed.
    pub episodes: usize,
    pub solved_episodes: usize,
    /// Bootstrap and training problems whose trajectories entered the buffer.
    pub problems_seen: usize,
    /// Evaluations run so far; the index of the next one.
    pub checkpoints: usize,
    pub gradient_steps: usize,
}

impl TrainingState {
    pub fn load(path: &Path) -> Result<Self, LearnError> {
        let text = std::fs::read_to_string(path).map_err(|source| LearnError::StateIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| LearnError::StateFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), LearnError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| LearnError::StateFormat {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| LearnError::StateIo {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Hooks for solution export and checkpointing.
pub trait TrainingObserver {
    fn on_trajectory(&mut self, _episode: usize, _trajectory: &Trajectory) -> Result<(), LearnError> {
        Ok(())
    }

    fn on_evaluation(
        &mut self,
        _report: &EvaluationReport,
        _scorer: &dyn ScoringFunction,
    ) -> Result<(), LearnError> {
        Ok(())
    }

    /// Called after every evaluation with the counters a resumed run needs.
    fn on_checkpoint(
        &mut self,
        _state: &TrainingState,
        _scorer: &dyn ScoringFunction,
    ) -> Result<(), LearnError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

/// What one call to [`Learner::train`] did; `gradient_steps` is cumulative
/// across resumes.
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    pub episodes: usize,
    pub solved_episodes: usize,
    pub bootstrap_entries: usize,
    pub gradient_steps: usize,
    pub last_loss: Option<f32>,
    pub reports: Vec<EvaluationReport>,
}

pub struct Learner {
    env: Environment,
    config: LearnerConfig,
    search_config: SearchConfig,
    search: BeamSearch,
    evaluator: SuccessRateEvaluator,
    buffer: ReplayBuffer,
    rng: StdRng,
    state: TrainingState,
    resumed: bool,
    last_loss: Option<f32>,
}

impl Learner {
    pub fn new(env: Environment, config: &ExperimentConfig) -> Result<Self, LearnError> {
        config.validate()?;
        let learner = config.learner.clone();
        Ok(Self {
            search: BeamSearch::new(env.clone(), config.search.clone(), learner.seed),
            evaluator: SuccessRateEvaluator::new(env.clone(), config.eval.clone()),
            buffer: ReplayBuffer::new(learner.buffer_capacity),
            rng: StdRng::seed_from_u64(learner.seed),
            search_config: config.search.clone(),
            config: learner,
            env,
            state: TrainingState::default(),
            resumed: false,
            last_loss: None,
        })
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn evaluator(&self) -> &SuccessRateEvaluator {
        &self.evaluator
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Continue from a saved state. The replay buffer is not persisted, so
    /// it is refilled by the bootstrap without counting those problems again.
    pub fn resume(&mut self, state: TrainingState) {
        let seed = self.config.seed.wrapping_add(state.episodes as u64);
        self.rng = StdRng::seed_from_u64(seed);
        self.search = BeamSearch::new(self.env.clone(), self.search_config.clone(), seed);
        tracing::info!(
            episodes = state.episodes,
            checkpoints = state.checkpoints,
            problems_seen = state.problems_seen,
            "resuming training"
        );
        self.state = state;
        self.resumed = true;
    }

    /// Fill the buffer before training. Example solutions, when configured,
    /// are the only source; otherwise `n_bootstrap_problems` are searched
    /// with the heuristic policy.
    pub fn bootstrap(&mut self) -> Result<usize, LearnError> {
        if let Some(path) = self.config.bootstrap.example_solutions.clone() {
            let mut added = 0;
            let mut replayed = 0;
            for (line, record) in read_solutions(&path)?.iter().enumerate() {
                match record.replay(&self.env) {
                    Some(trajectory) => {
                        replayed += 1;
                        added += self.buffer.add_trajectory(
                            &trajectory,
                            &self.env,
                            self.config.n_negatives,
                            &mut self.rng,
                        )
                    }
                    None => tracing::warn!(
                        path = %path.display(),
                        line = line + 1,
                        problem = %record.problem,
                        "skipping example solution that does not replay"
                    ),
                }
            }
            if !self.resumed {
                self.state.problems_seen += replayed;
            }
            tracing::info!(path = %path.display(), entries = added, "bootstrapped from example solutions");
            return Ok(added);
        }

        let n = self.config.bootstrap.n_bootstrap_problems;
        if n == 0 {
            return Ok(0);
        }
        let (policy, search_config): (Box<dyn ScoringFunction>, SearchConfig) =
            match self.config.bootstrap.policy {
                BootstrapPolicy::InverseLength => (Box::new(InverseLength), self.search_config.clone()),
                BootstrapPolicy::Random => (
                    Box::new(Uniform),
                    SearchConfig {
                        epsilon: 1.0,
                        ..self.search_config.clone()
                    },
                ),
            };
        let mut search = BeamSearch::new(self.env.clone(), search_config, self.config.seed);
        let mut added = 0;
        let mut solved = 0;
        for seed in self.config.seed..self.config.seed + n as u64 {
            let result = search.search(&generate(seed), policy.as_ref())?;
            solved += usize::from(result.solved());
            added += self.buffer.add_trajectory(
                &result.trajectory,
                &self.env,
                self.config.n_negatives,
                &mut self.rng,
            );
        }
        if !self.resumed {
            self.state.problems_seen += n;
        }
        tracing::info!(problems = n, solved, entries = added, policy = ?self.config.bootstrap.policy, "bootstrapped replay buffer");
        Ok(added)
    }

    /// `n_gradient_steps` updates on random mini-batches. `None` when the
    /// buffer holds nothing trainable yet.
    pub fn optimize(&mut self, scorer: &mut dyn ScoringFunction) -> Result<Option<f32>, LearnError> {
        if self.buffer.trainable() == 0 {
            return Ok(None);
        }
        let mut loss = 0.0;
        for _ in 0..self.config.n_gradient_steps {
            let batch = self.buffer.sample(self.config.batch_size, &mut self.rng);
            loss = scorer.update(&batch)?;
            self.state.gradient_steps += 1;
        }
        self.last_loss = Some(loss);
        tracing::debug!(steps = self.config.n_gradient_steps, loss, "optimized scorer");
        Ok(Some(loss))
    }

    pub fn evaluate(&mut self, scorer: &dyn ScoringFunction) -> Result<EvaluationReport, LearnError> {
        let mut report = self.evaluator.evaluate(scorer, self.state.checkpoints)?;
        report.n_steps = self.state.episodes;
        report.problems_seen = self.state.problems_seen;
        self.state.checkpoints += 1;
        Ok(report)
    }

    fn checkpoint(
        &mut self,
        scorer: &dyn ScoringFunction,
        observer: &mut dyn TrainingObserver,
    ) -> Result<EvaluationReport, LearnError> {
        let report = self.evaluate(scorer)?;
        observer.on_evaluation(&report, scorer)?;
        observer.on_checkpoint(&self.state, scorer)?;
        Ok(report)
    }

    /// Run episodes until `max_episodes` have been played in total. A fresh
    /// run evaluates the untrained scorer first; every run ends with an
    /// optimization pass and a final evaluation.
    pub fn train(
        &mut self,
        scorer: &mut dyn ScoringFunction,
        observer: &mut dyn TrainingObserver,
    ) -> Result<TrainingSummary, LearnError> {
        let mut summary = TrainingSummary::default();
        if self.state.checkpoints == 0 {
            let baseline = self.checkpoint(&*scorer, observer)?;
            summary.reports.push(baseline);
        }
        summary.bootstrap_entries = self.bootstrap()?;
        let first_seed = self.config.seed + self.config.bootstrap.n_bootstrap_problems as u64;

        while self.state.episodes < self.config.max_episodes {
            let episode = self.state.episodes;
            let problem = generate(first_seed + episode as u64);
            let result = self.search.search(&problem, &*scorer)?;
            self.buffer.add_trajectory(
                &result.trajectory,
                &self.env,
                self.config.n_negatives,
                &mut self.rng,
            );
            self.state.episodes += 1;
            self.state.problems_seen += 1;
            self.state.solved_episodes += usize::from(result.solved());
            summary.episodes += 1;
            summary.solved_episodes += usize::from(result.solved());
            observer.on_trajectory(episode, &result.trajectory)?;
            tracing::info!(
                episode,
                problem = %problem,
                solved = result.solved(),
                length = result.trajectory.len(),
                attempts = result.stats.attempts,
                buffer = self.buffer.len(),
                "episode finished"
            );

            if self.state.episodes % self.config.optimize_every == 0 {
                self.optimize(scorer)?;
            }
            if self.state.episodes % self.config.step_every == 0 {
                let report = self.checkpoint(&*scorer, observer)?;
                summary.reports.push(report);
            }
        }

        self.optimize(scorer)?;
        let report = self.checkpoint(&*scorer, observer)?;
        summary.reports.push(report);

        summary.gradient_steps = self.state.gradient_steps;
        summary.last_loss = self.last_loss;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::export::{SolutionLog, SolutionRecord};
    use crate::scoring::LinearScorer;
    use eqsearch_expr::parse_expr;

    fn small_config() -> ExperimentConfig {
        let search = SearchConfig {
            initial_depth: 3,
            depth_step: 1,
            max_depth: 3,
            beam_size: 4,
            epsilon: 0.0,
        };
        let mut config = ExperimentConfig {
            search: search.clone(),
            eval: EvalConfig {
                n_problems: 4,
                seed: 10_000,
                search,
            },
            ..ExperimentConfig::default()
        };
        config.learner.max_episodes = 6;
        config.learner.optimize_every = 2;
        config.learner.n_gradient_steps = 2;
        config.learner.batch_size = 4;
        config.learner.step_every = 3;
        config.learner.n_negatives = 3;
        config
    }

    #[derive(Default)]
    struct Recorder {
        trajectories: usize,
        checkpoints: Vec<usize>,
        states: Vec<TrainingState>,
    }

    impl TrainingObserver for Recorder {
        fn on_trajectory(&mut self, _episode: usize, _t: &Trajectory) -> Result<(), LearnError> {
            self.trajectories += 1;
            Ok(())
        }

        fn on_evaluation(
            &mut self,
            report: &EvaluationReport,
            _scorer: &dyn ScoringFunction,
        ) -> Result<(), LearnError> {
            self.checkpoints.push(report.checkpoint);
            Ok(())
        }

        fn on_checkpoint(
            &mut self,
            state: &TrainingState,
            _scorer: &dyn ScoringFunction,
        ) -> Result<(), LearnError> {
            self.states.push(state.clone());
            Ok(())
        }
    }

    #[test]
    fn training_respects_episode_budget_and_schedule() {
        let config = small_config();
        config.validate().expect("valid");
        let mut learner = Learner::new(Environment::default(), &config).expect("learner");
        let mut scorer = LinearScorer::new(1024, 0.1).expect("scorer");
        let mut recorder = Recorder::default();

        let summary = learner.train(&mut scorer, &mut recorder).expect("train");
        assert_eq!(summary.episodes, 6);
        assert_eq!(recorder.trajectories, 6);
        // Baseline, after episodes 3 and 6, and the final one.
        assert_eq!(recorder.checkpoints, vec![0, 1, 2, 3]);
        assert_eq!(summary.reports.len(), 4);
        let steps: Vec<usize> = summary.reports.iter().map(|r| r.n_steps).collect();
        assert_eq!(steps, vec![0, 3, 6, 6]);
        assert_eq!(summary.reports[0].problems_seen, 0);
        assert_eq!(summary.reports[3].problems_seen, 6);
        assert_eq!(recorder.states.len(), 4);
        assert_eq!(recorder.states[3].checkpoints, 4);
    }

    #[test]
    fn invalid_schedule_is_rejected_before_training() {
        let mut config = small_config();
        config.learner.optimize_every = 0;
        config.learner.max_episodes = 1;
        let err = Learner::new(Environment::default(), &config)
            .err()
            .expect("zero optimize_every must be rejected");
        assert!(
            matches!(&err, LearnError::Config(ConfigError::Invalid { field, .. }) if *field == "learner.optimize_every"),
            "{err}"
        );

        let mut config = small_config();
        config.learner.step_every = 0;
        assert!(matches!(
            Learner::new(Environment::default(), &config),
            Err(LearnError::Config(_))
        ));
    }

    #[test]
    fn resumed_training_continues_the_schedule() {
        let mut config = small_config();
        config.learner.max_episodes = 4;
        config.learner.bootstrap.n_bootstrap_problems = 2;
        let mut scorer = LinearScorer::new(1024, 0.1).expect("scorer");
        let mut first = Learner::new(Environment::default(), &config).expect("learner");
        first.train(&mut scorer, &mut NoopObserver).expect("train");
        // Baseline, after episode 3, and the final one.
        assert_eq!(first.state().checkpoints, 3);
        assert_eq!(first.state().episodes, 4);
        assert_eq!(first.state().problems_seen, 6);

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("training-state.json");
        first.state().save(&path).expect("save state");
        let saved = TrainingState::load(&path).expect("load state");
        assert_eq!(&saved, first.state());

        config.learner.max_episodes = 6;
        let mut second = Learner::new(Environment::default(), &config).expect("learner");
        second.resume(saved);
        let mut recorder = Recorder::default();
        let summary = second.train(&mut scorer, &mut recorder).expect("train");

        assert_eq!(summary.episodes, 2);
        // No second baseline: evaluation after episode 6, then the final one.
        assert_eq!(recorder.checkpoints, vec![3, 4]);
        assert_eq!(second.state().episodes, 6);
        // Bootstrap problems are not counted twice.
        assert_eq!(second.state().problems_seen, 8);
        assert!(summary.bootstrap_entries > 0);
        assert_eq!(summary.reports[0].n_steps, 6);
    }

    #[test]
    fn malformed_training_state_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("training-state.json");
        std::fs::write(&path, "{\"episodes\": \"many\"}").expect("write");
        assert!(matches!(
            TrainingState::load(&path),
            Err(LearnError::StateFormat { .. })
        ));
        assert!(matches!(
            TrainingState::load(&dir.path().join("missing.json")),
            Err(LearnError::StateIo { .. })
        ));
    }

    #[test]
    fn random_bootstrap_is_seeded() {
        let mut config = small_config();
        config.learner.bootstrap.policy = BootstrapPolicy::Random;
        config.learner.bootstrap.n_bootstrap_problems = 3;

        let run = || {
            let mut learner = Learner::new(Environment::default(), &config).expect("learner");
            let added = learner.bootstrap().expect("bootstrap");
            let moves: Vec<String> = learner
                .buffer()
                .iter()
                .map(|e| e.transition.action.formal())
                .collect();
            (added, moves, learner.state().problems_seen)
        };
        let (added, moves, seen) = run();
        assert!(added > 0);
        assert_eq!(moves.len(), added);
        assert_eq!(seen, 3);
        assert_eq!(run().1, moves);
    }

    #[test]
    fn evaluation_leaves_the_buffer_alone() {
        let mut config = small_config();
        config.learner.bootstrap.n_bootstrap_problems = 3;
        let mut learner = Learner::new(Environment::default(), &config).expect("learner");
        learner.bootstrap().expect("bootstrap");
        let before = learner.buffer().len();
        assert!(before > 0);
        learner.evaluate(&InverseLength).expect("evaluate");
        assert_eq!(learner.buffer().len(), before);
    }

    #[test]
    fn example_solutions_replace_heuristic_bootstrap() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("examples.jsonl");
        let env = Environment::default();
        let record = {
            let mut search = BeamSearch::new(env.clone(), small_config().search, 0);
            let result = search
                .search(&parse_expr("2x + 3 = 7").expect("parse"), &InverseLength)
                .expect("search");
            SolutionRecord::from_trajectory(&result.trajectory)
        };
        let mut log = SolutionLog::create(&path).expect("create");
        log.append(&record).expect("append");
        let mut broken = record.clone();
        broken.steps[0].result = parse_expr("2x = 9").expect("parse");
        log.append(&broken).expect("append");
        log.flush().expect("flush");

        let mut config = small_config();
        config.learner.bootstrap.n_bootstrap_problems = 50;
        config.learner.bootstrap.example_solutions = Some(path);
        let mut learner = Learner::new(env, &config).expect("learner");
        let added = learner.bootstrap().expect("bootstrap");
        assert_eq!(added, record.steps.len());
        assert_eq!(learner.buffer().len(), record.steps.len());
    }
}
