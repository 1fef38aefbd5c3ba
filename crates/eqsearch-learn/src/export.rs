//! Solution logs (JSON lines).
//!
//! One record per line:
//!
//! ```json
//! {"problem":"2x + 3 = 7","solved":true,"steps":[
//!   {"action":{"kind":"axiom","name":"sub_const","position":[]},"result":"2x = 4",
//!    "description":"Subtract 3 from both sides"}, ...]}
//! ```
//!
//! The same format is read back as example solutions for bootstrapping.

use crate::trajectory::{Trajectory, TrajectoryStep};
use eqsearch_env::{Action, Environment, State};
use eqsearch_expr::Expr;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed solution record: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionStep {
    pub action: Action,
    pub result: Expr,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub problem: Expr,
    #[serde(default = "default_solved")]
    pub solved: bool,
    pub steps: Vec<SolutionStep>,
}

fn default_solved() -> bool {
    true
}

impl SolutionRecord {
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        Self {
            problem: trajectory.problem.expr().clone(),
            solved: trajectory.solved,
            steps: trajectory
                .steps
                .iter()
                .map(|s| SolutionStep {
                    action: s.transition.action.clone(),
                    result: s.transition.next.expr().clone(),
                    description: s.transition.description.clone(),
                })
                .collect(),
        }
    }

    /// Re-run the recorded actions. `None` if a step is not a legal move or
    /// lands on a different expression than recorded.
    pub fn replay(&self, env: &Environment) -> Option<Trajectory> {
        let problem = State::new(self.problem.clone());
        let mut current = problem.clone();
        let mut steps = Vec::with_capacity(self.steps.len());
        for recorded in &self.steps {
            let mut candidates = env.expand(&current);
            let index = candidates
                .iter()
                .position(|t| t.action == recorded.action && t.next.expr() == &recorded.result)?;
            let transition = candidates.remove(index);
            let next = transition.next.clone();
            steps.push(TrajectoryStep {
                state: current,
                transition,
                siblings: candidates,
            });
            current = next;
        }
        Some(Trajectory {
            problem,
            solved: current.is_solved(),
            steps,
        })
    }
}

pub struct SolutionLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SolutionLog {
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = File::create(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Open for appending, creating the file if needed.
    pub fn open_append(path: &Path) -> Result<Self, ExportError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, record: &SolutionRecord) -> Result<(), ExportError> {
        let io_err = |source: std::io::Error| ExportError::Io {
            path: self.path.clone(),
            source,
        };
        let line = serde_json::to_string(record).map_err(|e| io_err(e.into()))?;
        writeln!(self.writer, "{line}").map_err(io_err)
    }

    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush().map_err(|source| ExportError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn read_solutions(path: &Path) -> Result<Vec<SolutionRecord>, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ExportError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::scoring::InverseLength;
    use crate::search::BeamSearch;
    use eqsearch_expr::parse_expr;

    fn solved_record() -> (Environment, SolutionRecord) {
        let env = Environment::default();
        let config = SearchConfig {
            initial_depth: 2,
            depth_step: 1,
            max_depth: 2,
            beam_size: 4,
            epsilon: 0.0,
        };
        let result = BeamSearch::new(env.clone(), config, 0)
            .search(&parse_expr("2x + 3 = 7").expect("parse"), &InverseLength)
            .expect("search");
        (env, SolutionRecord::from_trajectory(&result.trajectory))
    }

    #[test]
    fn log_roundtrips_through_jsonl() {
        let (_, record) = solved_record();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("solutions.jsonl");
        let mut log = SolutionLog::create(&path).expect("create");
        log.append(&record).expect("append");
        log.append(&record).expect("append");
        log.flush().expect("flush");

        let back = read_solutions(&path).expect("read");
        assert_eq!(back, vec![record.clone(), record]);
    }

    #[test]
    fn reopened_log_keeps_earlier_records() {
        let (_, record) = solved_record();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("solutions.jsonl");
        let mut log = SolutionLog::open_append(&path).expect("open");
        log.append(&record).expect("append");
        log.flush().expect("flush");
        drop(log);

        let mut log = SolutionLog::open_append(&path).expect("reopen");
        log.append(&record).expect("append");
        log.flush().expect("flush");
        assert_eq!(read_solutions(&path).expect("read").len(), 2);
    }

    #[test]
    fn replay_rebuilds_the_trajectory() {
        let (env, record) = solved_record();
        let trajectory = record.replay(&env).expect("legal moves");
        assert!(trajectory.solved);
        assert_eq!(trajectory.final_state().canonical(), "x = 2");
        assert!(!trajectory.steps[0].siblings.is_empty());

        let mut tampered = record;
        tampered.steps[0].result = parse_expr("2x = 5").expect("parse");
        assert!(tampered.replay(&env).is_none());
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "\n{\"problem\": \"x = 1\", \"steps\": []}\nnot json\n").expect("write");
        let err = read_solutions(&path).expect_err("malformed");
        assert!(matches!(err, ExportError::Malformed { line: 3, .. }), "{err}");
    }
}
