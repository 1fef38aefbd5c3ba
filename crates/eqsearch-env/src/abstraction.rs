//! Abstractions: compiled multi-step macro-actions.
//!
//! Abstraction files are JSON arrays of records tagged by `kind`:
//!
//! ```json
//! [
//!   {"kind": "ax_seq", "axioms": ["sub_const", "div_coeff"]},
//!   {"kind": "tree_rel_pos", "name": "isolate", "axioms": ["add_comm", "sub_const"],
//!    "rel_pos": [{"up": 1, "down": []}]}
//! ]
//! ```
//!
//! The library mode decides how records are read:
//! - `ax_seq`: every record is a plain axiom sequence; each step may fire at
//!   any site where it matches (tree offsets, if present, are ignored).
//! - `tree_idx`: records must carry `tree_rel_pos` offsets; step `i` fires at
//!   the previous step's site moved by `rel_pos[i - 1]`.
//!
//! The pre-order index variant (`dfs_idx_rel_pos`, mode `dfs_idx`) is parsed
//! so that it can be reported, but it never compiles.

use crate::axioms::{AxiomId, AxiomSet, Rewrite};
use eqsearch_expr::{Expr, Position, RelPos};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on chains produced by one abstraction on one state.
pub const MAX_SEQUENCE_CHAINS: usize = 256;

/// Upper bound on partial-chain extensions explored by one abstraction on
/// one state, counting chains that later fail to match.
pub const MAX_CHAIN_EXTENSIONS: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbstractionRecord {
    AxSeq {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        axioms: Vec<String>,
    },
    TreeRelPos {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        axioms: Vec<String>,
        rel_pos: Vec<RelPos>,
    },
    /// Offsets as differences of flattened pre-order indices.
    DfsIdxRelPos {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        axioms: Vec<String>,
        rel_idx: Vec<i64>,
    },
}

impl AbstractionRecord {
    pub fn axioms(&self) -> &[String] {
        match self {
            AbstractionRecord::AxSeq { axioms, .. }
            | AbstractionRecord::TreeRelPos { axioms, .. }
            | AbstractionRecord::DfsIdxRelPos { axioms, .. } => axioms,
        }
    }

    /// Explicit name, or the axiom names joined with `~`.
    pub fn name(&self) -> String {
        let explicit = match self {
            AbstractionRecord::AxSeq { name, .. }
            | AbstractionRecord::TreeRelPos { name, .. }
            | AbstractionRecord::DfsIdxRelPos { name, .. } => name,
        };
        explicit.clone().unwrap_or_else(|| self.axioms().join("~"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionMode {
    #[default]
    AxSeq,
    TreeIdx,
    DfsIdx,
}

impl fmt::Display for AbstractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AbstractionMode::AxSeq => "ax_seq",
            AbstractionMode::TreeIdx => "tree_idx",
            AbstractionMode::DfsIdx => "dfs_idx",
        })
    }
}

impl FromStr for AbstractionMode {
    type Err = AbstractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ax_seq" => Ok(AbstractionMode::AxSeq),
            "tree_idx" => Ok(AbstractionMode::TreeIdx),
            "dfs_idx" => Ok(AbstractionMode::DfsIdx),
            other => Err(AbstractionError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AbstractionError {
    #[error("failed to read abstraction file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed abstraction file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown abstraction mode `{0}` (expected `ax_seq` or `tree_idx`)")]
    UnknownMode(String),
    #[error("abstraction mode `dfs_idx` is no longer supported; re-export the library with `tree_rel_pos` offsets and use mode `tree_idx`")]
    LegacyMode,
    #[error("abstraction #{index} `{name}` uses deprecated `dfs_idx_rel_pos` offsets; re-export it as `tree_rel_pos`")]
    LegacyRecord { index: usize, name: String },
    #[error("abstraction #{index} `{name}` has no axioms")]
    Empty { index: usize, name: String },
    #[error("abstraction #{index} `{name}` references unknown axiom `{axiom}`")]
    UnknownAxiom {
        index: usize,
        name: String,
        axiom: String,
    },
    #[error("abstraction #{index} `{name}` has {offsets} relative positions for {steps} steps (expected {})", .steps.saturating_sub(1))]
    OffsetCount {
        index: usize,
        name: String,
        steps: usize,
        offsets: usize,
    },
    #[error("abstraction #{index} `{name}` is a plain `ax_seq` record but the library mode is `tree_idx`")]
    ModeMismatch { index: usize, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractionStep {
    pub axiom: AxiomId,
    /// Offset from the previous step's site; `None` lets the step fire anywhere.
    pub offset: Option<RelPos>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abstraction {
    name: String,
    steps: Vec<AbstractionStep>,
}

/// One successful chain: the site of every step and the final expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractionApplication {
    pub positions: Vec<Position>,
    pub descriptions: Vec<String>,
    pub result: Expr,
}

impl AbstractionApplication {
    fn start(rewrite: Rewrite) -> Self {
        Self {
            positions: vec![rewrite.position],
            descriptions: vec![rewrite.description],
            result: rewrite.result,
        }
    }

    fn then(mut self, rewrite: Rewrite) -> Self {
        self.positions.push(rewrite.position);
        self.descriptions.push(rewrite.description);
        self.result = rewrite.result;
        self
    }
}

impl Abstraction {
    pub fn new(name: impl Into<String>, steps: Vec<AbstractionStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[AbstractionStep] {
        &self.steps
    }

    /// Whether every step after the first is tied to a tree offset.
    pub fn is_positional(&self) -> bool {
        self.steps.iter().skip(1).all(|s| s.offset.is_some())
    }

    /// Every chain on `expr`, start sites in pre-order.
    pub fn applications(&self, expr: &Expr, axioms: &AxiomSet) -> Vec<AbstractionApplication> {
        let Some(first) = self.steps.first() else {
            return Vec::new();
        };
        let mut chains = Chains::default();
        for rewrite in axioms.applications(first.axiom, expr) {
            if chains.exhausted() {
                chains.truncated = true;
                break;
            }
            self.extend(axioms, AbstractionApplication::start(rewrite), 1, &mut chains);
        }
        if chains.truncated {
            tracing::warn!(
                abstraction = %self.name,
                expr = %expr,
                chains = chains.out.len(),
                extensions = chains.extensions,
                "abstraction expansion budget exhausted; remaining chains dropped"
            );
        }
        chains.out
    }

    /// The chain starting at `start`, if every step matches. For sequence
    /// steps the first chain in pre-order is returned.
    pub fn apply_from(
        &self,
        expr: &Expr,
        start: &Position,
        axioms: &AxiomSet,
    ) -> Option<AbstractionApplication> {
        let first = self.steps.first()?;
        let rewrite = axioms.apply_at(first.axiom, expr, start)?;
        let mut chains = Chains {
            limit: 1,
            ..Chains::default()
        };
        self.extend(axioms, AbstractionApplication::start(rewrite), 1, &mut chains);
        chains.out.into_iter().next()
    }

    fn extend(
        &self,
        axioms: &AxiomSet,
        partial: AbstractionApplication,
        step: usize,
        chains: &mut Chains,
    ) {
        if chains.exhausted() {
            chains.truncated = true;
            return;
        }
        chains.extensions += 1;
        let Some(next) = self.steps.get(step) else {
            chains.out.push(partial);
            return;
        };
        match &next.offset {
            Some(rel) => {
                let Some(site) = partial.positions.last().and_then(|p| p.offset(rel)) else {
                    return;
                };
                if let Some(rewrite) = axioms.apply_at(next.axiom, &partial.result, &site) {
                    self.extend(axioms, partial.then(rewrite), step + 1, chains);
                }
            }
            None => {
                for rewrite in axioms.applications(next.axiom, &partial.result) {
                    if chains.exhausted() {
                        chains.truncated = true;
                        return;
                    }
                    self.extend(axioms, partial.clone().then(rewrite), step + 1, chains);
                }
            }
        }
    }
}

/// Chain accumulator with a work budget.
struct Chains {
    out: Vec<AbstractionApplication>,
    limit: usize,
    extensions: usize,
    truncated: bool,
}

impl Default for Chains {
    fn default() -> Self {
        Self {
            out: Vec::new(),
            limit: MAX_SEQUENCE_CHAINS,
            extensions: 0,
            truncated: false,
        }
    }
}

impl Chains {
    fn exhausted(&self) -> bool {
        self.out.len() >= self.limit || self.extensions >= MAX_CHAIN_EXTENSIONS
    }
}

/// Immutable, ordered set of compiled abstractions.
#[derive(Debug, Clone, Default)]
pub struct AbstractionLibrary {
    mode: AbstractionMode,
    abstractions: Vec<Abstraction>,
}

impl AbstractionLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(
        path: &Path,
        mode: AbstractionMode,
        axioms: &AxiomSet,
    ) -> Result<Self, AbstractionError> {
        let text = std::fs::read_to_string(path).map_err(|source| AbstractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library = Self::from_json_str(&text, mode, axioms)?;
        tracing::info!(
            path = %path.display(),
            mode = %mode,
            abstractions = library.len(),
            "loaded abstraction library"
        );
        Ok(library)
    }

    pub fn from_json_str(
        text: &str,
        mode: AbstractionMode,
        axioms: &AxiomSet,
    ) -> Result<Self, AbstractionError> {
        if mode == AbstractionMode::DfsIdx {
            return Err(AbstractionError::LegacyMode);
        }
        let records: Vec<AbstractionRecord> = serde_json::from_str(text)?;
        Self::compile(&records, mode, axioms)
    }

    pub fn compile(
        records: &[AbstractionRecord],
        mode: AbstractionMode,
        axioms: &AxiomSet,
    ) -> Result<Self, AbstractionError> {
        if mode == AbstractionMode::DfsIdx {
            return Err(AbstractionError::LegacyMode);
        }
        let abstractions = records
            .iter()
            .enumerate()
            .map(|(index, record)| compile_record(index, record, mode, axioms))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { mode, abstractions })
    }

    pub fn mode(&self) -> AbstractionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.abstractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abstractions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Abstraction> {
        self.abstractions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Abstraction> {
        self.abstractions.iter().find(|a| a.name == name)
    }
}

fn compile_record(
    index: usize,
    record: &AbstractionRecord,
    mode: AbstractionMode,
    axioms: &AxiomSet,
) -> Result<Abstraction, AbstractionError> {
    let name = record.name();
    if record.axioms().is_empty() {
        return Err(AbstractionError::Empty { index, name });
    }

    let ids = record
        .axioms()
        .iter()
        .map(|axiom| {
            axioms
                .id(axiom)
                .ok_or_else(|| AbstractionError::UnknownAxiom {
                    index,
                    name: name.clone(),
                    axiom: axiom.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let offsets: Vec<Option<RelPos>> = match (record, mode) {
        (AbstractionRecord::DfsIdxRelPos { .. }, _) => {
            return Err(AbstractionError::LegacyRecord { index, name });
        }
        (AbstractionRecord::TreeRelPos { rel_pos, .. }, _) if rel_pos.len() + 1 != ids.len() => {
            return Err(AbstractionError::OffsetCount {
                index,
                name,
                steps: ids.len(),
                offsets: rel_pos.len(),
            });
        }
        (AbstractionRecord::TreeRelPos { rel_pos, .. }, AbstractionMode::TreeIdx) => {
            std::iter::once(None)
                .chain(rel_pos.iter().cloned().map(Some))
                .collect()
        }
        (AbstractionRecord::AxSeq { .. }, AbstractionMode::TreeIdx) => {
            return Err(AbstractionError::ModeMismatch { index, name });
        }
        _ => vec![None; ids.len()],
    };

    let steps = ids
        .into_iter()
        .zip(offsets)
        .map(|(axiom, offset)| AbstractionStep { axiom, offset })
        .collect();
    Ok(Abstraction::new(name, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqsearch_expr::parse_expr;

    fn compile(text: &str, mode: AbstractionMode) -> Result<AbstractionLibrary, AbstractionError> {
        AbstractionLibrary::from_json_str(text, mode, &AxiomSet::standard())
    }

    #[test]
    fn default_names_join_axioms() {
        let lib = compile(
            r#"[{"kind": "ax_seq", "axioms": ["sub_const", "div_coeff"]}]"#,
            AbstractionMode::AxSeq,
        )
        .expect("compiles");
        assert_eq!(lib.len(), 1);
        assert!(lib.get("sub_const~div_coeff").is_some());
    }

    #[test]
    fn sequence_solves_in_one_move() {
        let lib = compile(
            r#"[{"kind": "ax_seq", "name": "solve", "axioms": ["sub_const", "div_coeff"]}]"#,
            AbstractionMode::AxSeq,
        )
        .expect("compiles");
        let expr = parse_expr("2x + 3 = 7").expect("parse");
        let apps = lib
            .get("solve")
            .expect("present")
            .applications(&expr, &AxiomSet::standard());
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].result.canonical(), "x = 2");
        assert_eq!(apps[0].positions, vec![Position::root(), Position::root()]);
        assert_eq!(
            apps[0].descriptions,
            vec!["Subtract 3 from both sides", "Divide both sides by 2"]
        );
    }

    #[test]
    fn tree_offsets_fix_the_second_site() {
        // add_comm at /0 then sub_const one level up.
        let text = r#"[{"kind": "tree_rel_pos", "name": "flip_sub",
            "axioms": ["add_comm", "sub_const"], "rel_pos": [{"up": 1}]}]"#;
        let lib = compile(text, AbstractionMode::TreeIdx).expect("compiles");
        let abs = lib.get("flip_sub").expect("present");
        assert!(abs.is_positional());
        let expr = parse_expr("3 + 2x = 7").expect("parse");
        let apps = abs.applications(&expr, &AxiomSet::standard());
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].positions, vec![Position::new(vec![0]), Position::root()]);
        assert_eq!(apps[0].result.canonical(), "2x = 4");
    }

    #[test]
    fn tree_records_lose_offsets_in_sequence_mode() {
        let text = r#"[{"kind": "tree_rel_pos", "axioms": ["add_comm", "sub_const"],
            "rel_pos": [{"up": 1}]}]"#;
        let lib = compile(text, AbstractionMode::AxSeq).expect("compiles");
        assert!(!lib.iter().next().expect("one").is_positional());
    }

    #[test]
    fn legacy_and_malformed_records_are_fatal() {
        let dfs = r#"[{"kind": "dfs_idx_rel_pos", "axioms": ["add_comm", "sub_const"], "rel_idx": [-1]}]"#;
        assert!(matches!(
            compile(dfs, AbstractionMode::AxSeq),
            Err(AbstractionError::LegacyRecord { index: 0, .. })
        ));
        assert!(matches!(
            compile("[]", AbstractionMode::DfsIdx),
            Err(AbstractionError::LegacyMode)
        ));
        assert!(matches!(
            compile(
                r#"[{"kind": "ax_seq", "axioms": ["add_comm", "teleport"]}]"#,
                AbstractionMode::AxSeq
            ),
            Err(AbstractionError::UnknownAxiom { axiom, .. }) if axiom == "teleport"
        ));
        assert!(matches!(
            compile(
                r#"[{"kind": "tree_rel_pos", "axioms": ["add_comm", "sub_const"], "rel_pos": []}]"#,
                AbstractionMode::TreeIdx
            ),
            Err(AbstractionError::OffsetCount { steps: 2, offsets: 0, .. })
        ));
        assert!(matches!(
            compile(
                r#"[{"kind": "ax_seq", "axioms": ["add_comm"]}]"#,
                AbstractionMode::TreeIdx
            ),
            Err(AbstractionError::ModeMismatch { .. })
        ));
        assert!(matches!(
            compile(r#"[{"kind": "ax_seq", "axioms": []}]"#, AbstractionMode::AxSeq),
            Err(AbstractionError::Empty { .. })
        ));
        assert!(matches!(
            compile(r#"{"kind": "ax_seq"}"#, AbstractionMode::AxSeq),
            Err(AbstractionError::Malformed(_))
        ));
    }

    #[test]
    fn long_generic_sequences_stay_within_the_work_budget() {
        let mut axioms: Vec<&str> = vec!["add_comm"; 12];
        axioms.push("div_coeff");
        let text = serde_json::json!([{"kind": "ax_seq", "name": "shuffle", "axioms": axioms}]);
        let lib = compile(&text.to_string(), AbstractionMode::AxSeq).expect("compiles");
        let expr = parse_expr("a + b + c + d + e = 1").expect("parse");

        let started = std::time::Instant::now();
        let apps = lib
            .get("shuffle")
            .expect("present")
            .applications(&expr, &AxiomSet::standard());
        assert!(apps.is_empty());
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn chain_count_is_capped() {
        // Four commutable sums, three free steps: 4^3 = 64 chains, all kept.
        let lib = compile(
            r#"[{"kind": "ax_seq", "name": "spin", "axioms": ["add_comm", "add_comm", "add_comm"]}]"#,
            AbstractionMode::AxSeq,
        )
        .expect("compiles");
        let expr = parse_expr("a + b + c + d + e = 1").expect("parse");
        let spin = lib.get("spin").expect("present");
        assert_eq!(spin.applications(&expr, &AxiomSet::standard()).len(), 64);

        let lib = compile(
            r#"[{"kind": "ax_seq", "name": "spin", "axioms": ["add_comm", "add_comm", "add_comm", "add_comm", "add_comm"]}]"#,
            AbstractionMode::AxSeq,
        )
        .expect("compiles");
        let spin = lib.get("spin").expect("present");
        assert_eq!(
            spin.applications(&expr, &AxiomSet::standard()).len(),
            MAX_SEQUENCE_CHAINS
        );
    }

    #[test]
    fn mode_parses_from_config_strings() {
        assert_eq!("tree_idx".parse::<AbstractionMode>().ok(), Some(AbstractionMode::TreeIdx));
        assert!("preorder".parse::<AbstractionMode>().is_err());
        assert_eq!(AbstractionMode::default().to_string(), "ax_seq");
    }
}
