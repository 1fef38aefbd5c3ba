//! Search results as replayable step lists.

use eqsearch_env::{State, Transition};

#[derive(Debug, Clone)]
pub struct TrajectoryStep {
    pub state: State,
    pub transition: Transition,
    /// The other candidates expanded from `state`, in enumeration order.
    pub siblings: Vec<Transition>,
}

#[derive(Debug, Clone)]
pub struct Trajectory {
    pub problem: State,
    pub steps: Vec<TrajectoryStep>,
    pub solved: bool,
}

impl Trajectory {
    pub fn empty(problem: State) -> Self {
        let solved = problem.is_solved();
        Self {
            problem,
            steps: Vec::new(),
            solved,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn final_state(&self) -> &State {
        self.steps
            .last()
            .map(|s| &s.transition.next)
            .unwrap_or(&self.problem)
    }

    /// `(state, formal, human)` triples, one per move.
    pub fn describe(&self) -> Vec<(String, String, String)> {
        self.steps
            .iter()
            .map(|s| {
                (
                    s.transition.next.canonical().to_string(),
                    s.transition.action.formal(),
                    s.transition.description.clone(),
                )
            })
            .collect()
    }
}
