//! Success-rate evaluation on a held-out problem set.

use crate::config::EvalConfig;
use crate::scoring::{ScoringError, ScoringFunction};
use crate::search::BeamSearch;
use eqsearch_env::{generate, Environment};
use eqsearch_expr::Expr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub checkpoint: usize,
    /// Training episodes run before this evaluation.
    #[serde(default)]
    pub n_steps: usize,
    #[serde(default)]
    pub problems_seen: usize,
    pub success_rate: f64,
    /// One entry per problem; `-1` for failures.
    pub solution_lengths: Vec<i64>,
    /// `-1` when nothing was solved.
    pub max_solution_length: i64,
    /// Over solved problems only; `0.0` when nothing was solved.
    pub mean_solution_length: f64,
    pub successes: Vec<(usize, Expr)>,
    pub failures: Vec<(usize, Expr)>,
}

impl EvaluationReport {
    /// Problems solved here but not in `previous`; every success when
    /// there is nothing to compare against.
    pub fn new_successes<'a>(&'a self, previous: Option<&EvaluationReport>) -> Vec<&'a (usize, Expr)> {
        self.successes
            .iter()
            .filter(|(i, _)| previous.is_none_or(|p| !p.solved(*i)))
            .collect()
    }

    /// Problems `previous` solved that fail here; every failure when there
    /// is nothing to compare against.
    pub fn new_failures<'a>(&'a self, previous: Option<&EvaluationReport>) -> Vec<&'a (usize, Expr)> {
        self.failures
            .iter()
            .filter(|(i, _)| previous.is_none_or(|p| p.solved(*i)))
            .collect()
    }

    fn solved(&self, index: usize) -> bool {
        self.successes.iter().any(|(j, _)| *j == index)
    }
}

/// Solves a fixed problem set with a fresh search per call; it owns no
/// replay buffer and never trains the scorer.
pub struct SuccessRateEvaluator {
    env: Environment,
    config: EvalConfig,
    problems: Vec<Expr>,
}

impl SuccessRateEvaluator {
    pub fn new(env: Environment, config: EvalConfig) -> Self {
        let problems = config.seed_range().map(generate).collect();
        Self::with_problems(env, config, problems)
    }

    pub fn with_problems(env: Environment, config: EvalConfig, problems: Vec<Expr>) -> Self {
        Self {
            env,
            config,
            problems,
        }
    }

    pub fn problems(&self) -> &[Expr] {
        &self.problems
    }

    pub fn evaluate(
        &self,
        scorer: &dyn ScoringFunction,
        checkpoint: usize,
    ) -> Result<EvaluationReport, ScoringError> {
        let mut search = BeamSearch::new(self.env.clone(), self.config.search.clone(), self.config.seed);
        let mut lengths = Vec::with_capacity(self.problems.len());
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for (i, problem) in self.problems.iter().enumerate() {
            let result = search.search(problem, scorer)?;
            if result.solved() {
                lengths.push(result.trajectory.len() as i64);
                successes.push((i, problem.clone()));
            } else {
                lengths.push(-1);
                failures.push((i, problem.clone()));
            }
        }

        let solved: Vec<i64> = lengths.iter().copied().filter(|l| *l >= 0).collect();
        let report = EvaluationReport {
            checkpoint,
            n_steps: 0,
            problems_seen: 0,
            success_rate: if self.problems.is_empty() {
                0.0
            } else {
                successes.len() as f64 / self.problems.len() as f64
            },
            max_solution_length: lengths.iter().copied().max().unwrap_or(-1),
            mean_solution_length: if solved.is_empty() {
                0.0
            } else {
                solved.iter().sum::<i64>() as f64 / solved.len() as f64
            },
            solution_lengths: lengths,
            successes,
            failures,
        };
        tracing::info!(
            checkpoint,
            success_rate = report.success_rate,
            max_length = report.max_solution_length,
            mean_length = report.mean_solution_length,
            "evaluation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::scoring::InverseLength;
    use eqsearch_expr::parse_expr;

    #[test]
    fn report_aggregates_lengths() {
        let config = EvalConfig {
            n_problems: 2,
            seed: 0,
            search: SearchConfig {
                initial_depth: 2,
                depth_step: 1,
                max_depth: 2,
                beam_size: 4,
                epsilon: 0.0,
            },
        };
        let problems = vec![
            parse_expr("2x + 3 = 7").expect("parse"),
            parse_expr("x + 1 = 4").expect("parse"),
            parse_expr("x * y = z + 1").expect("parse"),
        ];
        let evaluator = SuccessRateEvaluator::with_problems(Environment::default(), config, problems);
        let report = evaluator.evaluate(&InverseLength, 3).expect("evaluate");

        assert_eq!(report.checkpoint, 3);
        assert_eq!(report.solution_lengths, vec![2, 1, -1]);
        assert_eq!(report.max_solution_length, 2);
        assert!((report.mean_solution_length - 1.5).abs() < 1e-9);
        assert!((report.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 2);
    }

    #[test]
    fn new_successes_are_reported_once() {
        let e = parse_expr("x = 1").expect("parse");
        let base = EvaluationReport {
            checkpoint: 0,
            n_steps: 0,
            problems_seen: 0,
            success_rate: 0.5,
            solution_lengths: vec![1, -1],
            max_solution_length: 1,
            mean_solution_length: 1.0,
            successes: vec![(0, e.clone())],
            failures: vec![(1, e.clone())],
        };
        let later = EvaluationReport {
            checkpoint: 1,
            successes: vec![(0, e.clone()), (1, e.clone())],
            failures: Vec::new(),
            ..base.clone()
        };
        let fresh = later.new_successes(Some(&base));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].0, 1);
        assert_eq!(base.new_successes(None).len(), 1);
    }

    #[test]
    fn regressions_are_new_failures() {
        let e = parse_expr("x = 1").expect("parse");
        let base = EvaluationReport {
            checkpoint: 0,
            n_steps: 0,
            problems_seen: 0,
            success_rate: 0.5,
            solution_lengths: vec![1, 1, -1],
            max_solution_length: 1,
            mean_solution_length: 1.0,
            successes: vec![(0, e.clone()), (1, e.clone())],
            failures: vec![(2, e.clone())],
        };
        let later = EvaluationReport {
            checkpoint: 1,
            successes: vec![(0, e.clone())],
            failures: vec![(1, e.clone()), (2, e.clone())],
            ..base.clone()
        };
        let lost: Vec<usize> = later.new_failures(Some(&base)).iter().map(|(i, _)| *i).collect();
        assert_eq!(lost, vec![1]);
        assert_eq!(base.new_failures(None).len(), 1);
        assert!(later.new_successes(Some(&base)).is_empty());
    }

    #[test]
    fn reports_without_training_counters_still_parse() {
        let json = r#"{"checkpoint": 2, "success_rate": 0.0, "solution_lengths": [-1],
            "max_solution_length": -1, "mean_solution_length": 0.0,
            "successes": [], "failures": []}"#;
        let report: EvaluationReport = serde_json::from_str(json).expect("parse");
        assert_eq!(report.n_steps, 0);
        assert_eq!(report.problems_seen, 0);
    }
}
