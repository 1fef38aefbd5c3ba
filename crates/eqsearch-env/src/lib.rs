//! Rewrite environment for linear equations.
//!
//! - `axioms`: the fixed rewrite-rule registry
//! - `abstraction`: macro-actions loaded from JSON and compiled against it
//! - `engine`: states, actions and `Environment::expand`
//! - `generator`: seeded training/evaluation problems

pub mod abstraction;
pub mod axioms;
pub mod engine;
pub mod generator;
pub mod pattern;

pub use abstraction::{
    Abstraction, AbstractionApplication, AbstractionError, AbstractionLibrary, AbstractionMode,
    AbstractionRecord,
};
pub use axioms::{Axiom, AxiomError, AxiomId, AxiomSet, Rewrite};
pub use engine::{Action, Environment, State, Transition};
pub use generator::{generate, generate_batch};
