//! The transition engine: legal moves out of a state.

use crate::abstraction::AbstractionLibrary;
use crate::axioms::AxiomSet;
use eqsearch_expr::{Expr, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An expression plus the search depth at which it was reached.
///
/// Equality and hashing only look at the canonical form.
#[derive(Debug, Clone)]
pub struct State {
    expr: Arc<Expr>,
    canonical: Arc<str>,
    depth: u32,
}

impl State {
    pub fn new(expr: Expr) -> Self {
        Self::at_depth(expr, 0)
    }

    fn at_depth(expr: Expr, depth: u32) -> Self {
        let canonical: Arc<str> = expr.canonical().into();
        Self {
            expr: Arc::new(expr),
            canonical,
            depth,
        }
    }

    /// The successor state one level deeper.
    pub fn child(&self, expr: Expr) -> Self {
        Self::at_depth(expr, self.depth + 1)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_solved(&self) -> bool {
        self.expr.is_solved()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Axiom {
        name: String,
        position: Position,
    },
    Abstraction {
        name: String,
        positions: Vec<Position>,
    },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Axiom { name, .. } | Action::Abstraction { name, .. } => name,
        }
    }

    /// Site of the (first) rewrite.
    pub fn position(&self) -> Position {
        match self {
            Action::Axiom { position, .. } => position.clone(),
            Action::Abstraction { positions, .. } => {
                positions.first().cloned().unwrap_or_default()
            }
        }
    }

    pub fn is_abstraction(&self) -> bool {
        matches!(self, Action::Abstraction { .. })
    }

    /// Formal description: `name@/0/1`, abstractions list every site.
    pub fn formal(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Axiom { name, position } => write!(f, "{name}@{position}"),
            Action::Abstraction { name, positions } => {
                write!(f, "{name}@[")?;
                for (i, p) in positions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub action: Action,
    pub next: State,
    /// Human-readable description ("Subtract 3 from both sides").
    pub description: String,
}

/// Enumerates transitions using a shared axiom registry and abstraction
/// library. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Environment {
    axioms: Arc<AxiomSet>,
    library: Arc<AbstractionLibrary>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(
            Arc::new(AxiomSet::standard()),
            Arc::new(AbstractionLibrary::empty()),
        )
    }
}

impl Environment {
    pub fn new(axioms: Arc<AxiomSet>, library: Arc<AbstractionLibrary>) -> Self {
        Self { axioms, library }
    }

    pub fn axioms(&self) -> &Arc<AxiomSet> {
        &self.axioms
    }

    pub fn library(&self) -> &Arc<AbstractionLibrary> {
        &self.library
    }

    /// All legal transitions: axioms in registry order with sites in
    /// pre-order, then abstractions in library order. Duplicate resulting
    /// states are kept.
    pub fn expand(&self, state: &State) -> Vec<Transition> {
        let expr = state.expr();
        let mut out: Vec<Transition> = self
            .axioms
            .all_applications(expr)
            .into_iter()
            .map(|rw| Transition {
                action: Action::Axiom {
                    name: self.axioms.get(rw.axiom).name().to_string(),
                    position: rw.position,
                },
                next: state.child(rw.result),
                description: rw.description,
            })
            .collect();

        for abstraction in self.library.iter() {
            for app in abstraction.applications(expr, &self.axioms) {
                out.push(Transition {
                    action: Action::Abstraction {
                        name: abstraction.name().to_string(),
                        positions: app.positions,
                    },
                    next: state.child(app.result),
                    description: app.descriptions.join("; "),
                });
            }
        }
        out
    }

    /// Solved, or no outgoing moves.
    pub fn is_terminal(&self, state: &State) -> bool {
        state.is_solved() || self.expand(state).is_empty()
    }

    /// Re-apply a recorded action, e.g. when replaying an exported solution.
    pub fn step(&self, state: &State, action: &Action) -> Option<Transition> {
        self.expand(state).into_iter().find(|t| &t.action == action)
    }
}
