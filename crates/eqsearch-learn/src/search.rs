//! Iterative-deepening beam search.
//!
//! Each attempt starts from the problem with a fresh beam and runs at most
//! `depth` layers. A layer expands every beam state (fanned out with rayon),
//! returns immediately if any candidate is solved, otherwise scores the
//! candidates, drops those that revisit a state on their own path, and keeps
//! the best `beam_size` (stable, so ties keep discovery order). On failure
//! the next attempt uses a larger depth budget.

use crate::config::SearchConfig;
use crate::scoring::{ScoringError, ScoringFunction};
use crate::trajectory::{Trajectory, TrajectoryStep};
use eqsearch_env::{Environment, State, Transition};
use eqsearch_expr::Expr;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub attempts: u32,
    pub expansions: usize,
    pub scored: usize,
    /// Layers completed in the last attempt.
    pub depth_reached: u32,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The solution if one was found, else the path to the best open state
    /// of the last attempt.
    pub trajectory: Trajectory,
    pub stats: SearchStats,
}

impl SearchResult {
    pub fn solved(&self) -> bool {
        self.trajectory.solved
    }
}

/// A search tree node. The root has no parent edge.
struct Node {
    state: State,
    parent: Option<usize>,
    /// Candidates of the parent expansion and the index taken.
    edge: Option<(Arc<Vec<Transition>>, usize)>,
}

struct Candidate {
    parent: usize,
    transitions: Arc<Vec<Transition>>,
    index: usize,
    score: f32,
}

pub struct BeamSearch {
    env: Environment,
    config: SearchConfig,
    rng: StdRng,
}

impl BeamSearch {
    pub fn new(env: Environment, config: SearchConfig, seed: u64) -> Self {
        Self {
            env,
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn search(
        &mut self,
        problem: &Expr,
        scorer: &dyn ScoringFunction,
    ) -> Result<SearchResult, ScoringError> {
        let root = State::new(problem.clone());
        let mut stats = SearchStats::default();
        if root.is_solved() {
            return Ok(SearchResult {
                trajectory: Trajectory::empty(root),
                stats,
            });
        }

        let mut best_partial = Trajectory::empty(root.clone());
        for depth in self.config.depth_schedule() {
            stats.attempts += 1;
            let (trajectory, layers) = self.attempt(&root, depth, scorer, &mut stats)?;
            stats.depth_reached = layers;
            tracing::debug!(
                problem = %root,
                depth_budget = depth,
                layers,
                solved = trajectory.solved,
                expansions = stats.expansions,
                "search attempt finished"
            );
            if trajectory.solved {
                return Ok(SearchResult { trajectory, stats });
            }
            best_partial = trajectory;
        }
        Ok(SearchResult {
            trajectory: best_partial,
            stats,
        })
    }

    /// One bounded beam search. Returns the trajectory (solved or the best
    /// open path) and the number of layers expanded.
    fn attempt(
        &mut self,
        root: &State,
        depth: u32,
        scorer: &dyn ScoringFunction,
        stats: &mut SearchStats,
    ) -> Result<(Trajectory, u32), ScoringError> {
        let mut nodes = vec![Node {
            state: root.clone(),
            parent: None,
            edge: None,
        }];
        let mut beam = vec![0usize];
        let mut best = 0usize;

        for layer in 0..depth {
            let env = &self.env;
            let expansions: Vec<(usize, Arc<Vec<Transition>>)> = beam
                .par_iter()
                .map(|&idx| (idx, Arc::new(env.expand(&nodes[idx].state))))
                .collect();
            stats.expansions += expansions.len();

            for (parent, transitions) in &expansions {
                if let Some(index) = transitions.iter().position(|t| t.next.is_solved()) {
                    nodes.push(Node {
                        state: transitions[index].next.clone(),
                        parent: Some(*parent),
                        edge: Some((Arc::clone(transitions), index)),
                    });
                    let trajectory = build_trajectory(&nodes, nodes.len() - 1, true);
                    return Ok((trajectory, layer + 1));
                }
            }

            let mut candidates = Vec::new();
            for (parent, transitions) in expansions {
                let scores = scorer.score_batch(&nodes[parent].state, &transitions)?;
                if scores.len() != transitions.len() {
                    return Err(ScoringError::BatchSize {
                        expected: transitions.len(),
                        got: scores.len(),
                    });
                }
                stats.scored += scores.len();
                for (index, score) in scores.into_iter().enumerate() {
                    if on_path(&nodes, parent, &transitions[index].next) {
                        continue;
                    }
                    candidates.push(Candidate {
                        parent,
                        transitions: Arc::clone(&transitions),
                        index,
                        score,
                    });
                }
            }
            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

            beam = self
                .fill_beam(candidates)
                .into_iter()
                .map(|c| {
                    nodes.push(Node {
                        state: c.transitions[c.index].next.clone(),
                        parent: Some(c.parent),
                        edge: Some((c.transitions, c.index)),
                    });
                    nodes.len() - 1
                })
                .collect();

            match beam.first() {
                Some(&top) => best = top,
                None => return Ok((build_trajectory(&nodes, best, false), layer + 1)),
            }
        }
        Ok((build_trajectory(&nodes, best, false), depth))
    }

    /// Take the best candidates, except that each slot is given to a
    /// uniformly random remaining candidate with probability `epsilon`.
    fn fill_beam(&mut self, mut ranked: Vec<Candidate>) -> Vec<Candidate> {
        let mut out = Vec::with_capacity(self.config.beam_size.min(ranked.len()));
        while out.len() < self.config.beam_size && !ranked.is_empty() {
            let pick = if self.config.epsilon > 0.0 && self.rng.random::<f64>() < self.config.epsilon
            {
                self.rng.random_range(0..ranked.len())
            } else {
                0
            };
            out.push(ranked.remove(pick));
        }
        out
    }
}

fn on_path(nodes: &[Node], mut idx: usize, state: &State) -> bool {
    loop {
        if &nodes[idx].state == state {
            return true;
        }
        match nodes[idx].parent {
            Some(parent) => idx = parent,
            None => return false,
        }
    }
}

fn build_trajectory(nodes: &[Node], leaf: usize, solved: bool) -> Trajectory {
    let mut steps = Vec::new();
    let mut idx = leaf;
    while let (Some(parent), Some((transitions, index))) = (nodes[idx].parent, &nodes[idx].edge) {
        let siblings = transitions
            .iter()
            .enumerate()
            .filter(|(k, _)| k != index)
            .map(|(_, t)| t.clone())
            .collect();
        steps.push(TrajectoryStep {
            state: nodes[parent].state.clone(),
            transition: transitions[*index].clone(),
            siblings,
        });
        idx = parent;
    }
    steps.reverse();
    Trajectory {
        problem: nodes[0].state.clone(),
        steps,
        solved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{InverseLength, Uniform};
    use eqsearch_expr::parse_expr;

    fn config(initial_depth: u32, max_depth: u32, beam_size: usize) -> SearchConfig {
        SearchConfig {
            initial_depth,
            depth_step: 1,
            max_depth,
            beam_size,
            epsilon: 0.0,
        }
    }

    #[test]
    fn solves_two_step_problem() {
        let mut search = BeamSearch::new(Environment::default(), config(2, 2, 4), 0);
        let result = search
            .search(&parse_expr("2x + 3 = 7").expect("parse"), &InverseLength)
            .expect("search");
        assert!(result.solved());
        assert_eq!(result.trajectory.len(), 2);
        assert_eq!(result.trajectory.final_state().canonical(), "x = 2");
        assert_eq!(result.stats.attempts, 1);
    }

    #[test]
    fn already_solved_problem_has_empty_trajectory() {
        let mut search = BeamSearch::new(Environment::default(), config(1, 3, 2), 0);
        let result = search
            .search(&parse_expr("x = 5").expect("parse"), &Uniform)
            .expect("search");
        assert!(result.solved());
        assert!(result.trajectory.is_empty());
        assert_eq!(result.stats.expansions, 0);
    }

    #[test]
    fn shallow_budget_escalates_then_reports_best_partial_path() {
        let mut search = BeamSearch::new(Environment::default(), config(1, 2, 1), 0);
        let problem = parse_expr("3 + 2x = 9").expect("parse");
        let result = search.search(&problem, &Uniform).expect("search");
        assert_eq!(result.stats.attempts, 2);
        assert!(!result.solved());
        assert!(!result.trajectory.is_empty());
        // The first step records its siblings for negative sampling.
        let first = &result.trajectory.steps[0];
        assert_eq!(first.state.canonical(), "3 + 2x = 9");
        assert!(!first.siblings.is_empty());
    }

    #[test]
    fn trajectory_steps_chain() {
        let mut search = BeamSearch::new(Environment::default(), config(3, 3, 4), 0);
        let result = search
            .search(&parse_expr("3 + 2x = 9").expect("parse"), &InverseLength)
            .expect("search");
        assert!(result.solved());
        let mut current = result.trajectory.problem.clone();
        for step in &result.trajectory.steps {
            assert_eq!(step.state, current);
            current = step.transition.next.clone();
        }
        assert_eq!(current.canonical(), "x = 3");
    }

    fn first_move(epsilon: f64, seed: u64) -> String {
        let config = SearchConfig {
            epsilon,
            ..config(1, 1, 1)
        };
        let mut search = BeamSearch::new(Environment::default(), config, seed);
        let result = search
            .search(&parse_expr("2x + 3 = 7").expect("parse"), &InverseLength)
            .expect("search");
        result.trajectory.final_state().canonical().to_string()
    }

    #[test]
    fn exploration_leaves_the_greedy_choice() {
        let greedy = first_move(0.0, 0);
        assert!((0..20).all(|seed| first_move(0.0, seed) == greedy));
        assert!((0..20).any(|seed| first_move(1.0, seed) != greedy));
    }

    #[test]
    fn partial_exploration_is_reproducible_per_seed() {
        let run = |seed: u64| {
            let config = SearchConfig {
                epsilon: 0.5,
                ..config(2, 4, 3)
            };
            let mut search = BeamSearch::new(Environment::default(), config, seed);
            ["3 + 2x = 9", "4x - 1 = 7", "x / 2 = 3"]
                .iter()
                .map(|p| {
                    let result = search
                        .search(&parse_expr(p).expect("parse"), &InverseLength)
                        .expect("search");
                    result.trajectory.describe()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
