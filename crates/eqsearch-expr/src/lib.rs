//! Equation expression model.
//!
//! This crate defines the immutable expression tree every other layer works
//! on, together with:
//!
//! - a `nom` parser for the equation surface syntax (`2x + 3 = 7`),
//! - a canonical printer (`Display`) whose output re-parses to the same tree,
//! - tree positions (root paths), pre-order indices, and relative offsets,
//! - a small FNV-1a digest used for stable keys and hashed features.
//!
//! Canonical strings are the identity of a state: visited-state
//! deduplication, replay entries and solution logs all key on them.

pub mod digest;
pub mod expr;
pub mod parser;
pub mod position;

pub use expr::{Expr, Op};
pub use parser::{parse_expr, ParseError};
pub use position::{Position, RelPos};

/// Exact numeric literal type used throughout the workspace.
pub type Number = num_rational::Rational64;
