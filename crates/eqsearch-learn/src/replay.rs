//! Bounded FIFO experience replay.

use crate::scoring::ContrastiveExample;
use crate::trajectory::Trajectory;
use eqsearch_env::{Environment, State, Transition};
use rand::prelude::IndexedRandom;
use rand::Rng;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub state: State,
    pub transition: Transition,
    /// The resulting state is solved, or is a dead end with no moves.
    pub terminal: bool,
    pub negatives: Vec<Transition>,
    pub from_solution: bool,
}

impl ReplayEntry {
    fn to_example(&self) -> ContrastiveExample {
        ContrastiveExample {
            state: self.state.clone(),
            positive: self.transition.clone(),
            negatives: self.negatives.clone(),
        }
    }
}

/// Oldest entries are evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    entries: VecDeque<ReplayEntry>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplayEntry> {
        self.entries.iter()
    }

    pub fn push(&mut self, entry: ReplayEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Append every step of `trajectory`, sampling up to `n_negatives`
    /// alternatives per step from the same parent. Returns the entry count.
    ///
    /// Intermediate states were expanded by the search, so only the last one
    /// can be a dead end; `env` decides that.
    pub fn add_trajectory<R: Rng + ?Sized>(
        &mut self,
        trajectory: &Trajectory,
        env: &Environment,
        n_negatives: usize,
        rng: &mut R,
    ) -> usize {
        let last = trajectory.steps.len().saturating_sub(1);
        for (i, step) in trajectory.steps.iter().enumerate() {
            let pool: Vec<&Transition> = step
                .siblings
                .iter()
                .filter(|t| t.next != step.transition.next)
                .collect();
            let negatives = pool
                .choose_multiple(rng, n_negatives)
                .map(|t| (*t).clone())
                .collect();
            self.push(ReplayEntry {
                state: step.state.clone(),
                transition: step.transition.clone(),
                terminal: if i == last {
                    env.is_terminal(&step.transition.next)
                } else {
                    step.transition.next.is_solved()
                },
                negatives,
                from_solution: trajectory.solved,
            });
        }
        trajectory.steps.len()
    }

    /// Entries usable as positives: from solved trajectories, with negatives.
    pub fn trainable(&self) -> usize {
        self.entries.iter().filter(|e| is_trainable(e)).count()
    }

    /// Up to `batch_size` distinct trainable entries, uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<ContrastiveExample> {
        let pool: Vec<&ReplayEntry> = self.entries.iter().filter(|e| is_trainable(e)).collect();
        pool.choose_multiple(rng, batch_size)
            .map(|e| e.to_example())
            .collect()
    }
}

fn is_trainable(entry: &ReplayEntry) -> bool {
    entry.from_solution && !entry.negatives.is_empty()
}
