//! Tree positions.
//!
//! A `Position` is a path from the root of an expression:
//! - `0` = left operand (or the operand of a negation)
//! - `1` = right operand
//!
//! Abstractions store the *relative* position of each step with respect to the
//! previous step's application site (`RelPos`): go up `up` levels, then follow
//! `down`. Relative offsets are computed on positions alone, so the same
//! offset can be replayed against a tree whose shape changed in between.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(Vec<u32>);

impl Position {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(path: Vec<u32>) -> Self {
        Self(path)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, index: u32) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    /// Offset that leads from `from` to `self`.
    pub fn relative_to(&self, from: &Position) -> RelPos {
        let common = self
            .0
            .iter()
            .zip(from.0.iter())
            .take_while(|(a, b)| a == b)
            .count();
        RelPos {
            up: (from.0.len() - common) as u32,
            down: self.0[common..].to_vec(),
        }
    }

    /// Apply a relative offset. Fails when the offset climbs above the root.
    pub fn offset(&self, rel: &RelPos) -> Option<Position> {
        let up = rel.up as usize;
        if up > self.0.len() {
            return None;
        }
        let mut path = self.0[..self.0.len() - up].to_vec();
        path.extend_from_slice(&rel.down);
        Some(Self(path))
    }
}

impl From<Vec<u32>> for Position {
    fn from(path: Vec<u32>) -> Self {
        Self(path)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for idx in &self.0 {
            write!(f, "/{idx}")?;
        }
        Ok(())
    }
}

/// Relative tree offset between two application sites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelPos {
    pub up: u32,
    #[serde(default)]
    pub down: Vec<u32>,
}

impl RelPos {
    pub fn new(up: u32, down: Vec<u32>) -> Self {
        Self { up, down }
    }
}

impl fmt::Display for RelPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", self.up)?;
        for idx in &self.down {
            write!(f, "/{idx}")?;
        }
        Ok(())
    }
}
