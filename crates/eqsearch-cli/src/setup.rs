//! Shared wiring: config loading and environment construction.

use anyhow::{Context, Result};
use eqsearch_env::{AbstractionLibrary, AxiomSet, Environment};
use eqsearch_learn::{ExperimentConfig, ScorerKind};
use std::path::Path;
use std::sync::Arc;

pub fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

pub fn environment(config: &ExperimentConfig) -> Result<Environment> {
    let standard = AxiomSet::standard();
    let axioms = match &config.axioms {
        Some(names) => standard
            .subset(names)
            .context("restricting the axiom set")?,
        None => standard,
    };
    let library = match &config.abstractions.path {
        Some(path) => AbstractionLibrary::load(path, config.abstractions.mode, &axioms)
            .with_context(|| format!("loading abstractions from {}", path.display()))?,
        None => AbstractionLibrary::empty(),
    };
    Ok(Environment::new(Arc::new(axioms), Arc::new(library)))
}

/// clap value parser for scorer kinds (`linear`, `inverse_length`, `uniform`).
pub fn parse_scorer_kind(text: &str) -> Result<ScorerKind, String> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|_| format!("unknown scorer `{text}` (expected linear, inverse_length or uniform)"))
}
