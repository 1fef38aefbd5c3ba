//! `eqsearch eval`: success rate of one or more scorer checkpoints.

use crate::setup;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use eqsearch_learn::{build_scorer, snapshot, EvaluationReport, ScorerKind, SuccessRateEvaluator};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct EvalArgs {
    /// Experiment config (JSON); the `eval` section sets the problems and budget.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Scorer backend; overrides the config.
    #[arg(long, value_parser = setup::parse_scorer_kind)]
    pub scorer: Option<ScorerKind>,
    /// Snapshots to evaluate in order; changes are reported against the
    /// previous one.
    pub snapshots: Vec<PathBuf>,
    /// Evaluate `<dir>/0.eqss`, `<dir>/1.eqss`, ... up to the first missing index.
    #[arg(long, conflicts_with = "snapshots")]
    pub checkpoint_dir: Option<PathBuf>,
    /// Print reports as JSON lines.
    #[arg(long)]
    pub json: bool,
}

/// Numbered checkpoints in `dir`, stopping at the first gap.
fn numbered_checkpoints(dir: &Path) -> Vec<PathBuf> {
    (0usize..)
        .map(|i| dir.join(format!("{i}.eqss")))
        .take_while(|path| path.is_file())
        .collect()
}

pub fn cmd_eval(args: EvalArgs) -> Result<()> {
    let mut config = setup::load_config(args.config.as_deref())?;
    if let Some(kind) = args.scorer {
        config.scorer.kind = kind;
    }
    let env = setup::environment(&config)?;
    let evaluator = SuccessRateEvaluator::new(env, config.eval.clone());

    let runs: Vec<Option<PathBuf>> = if let Some(dir) = &args.checkpoint_dir {
        let found = numbered_checkpoints(dir);
        if found.is_empty() {
            bail!("no checkpoints named 0.eqss, 1.eqss, ... in {}", dir.display());
        }
        found.into_iter().map(Some).collect()
    } else if args.snapshots.is_empty() {
        vec![config.scorer.load_pretrained.clone()]
    } else {
        args.snapshots.into_iter().map(Some).collect()
    };

    let mut previous: Option<EvaluationReport> = None;
    let mut last_checksum: Option<[u8; 32]> = None;
    for (checkpoint, source) in runs.into_iter().enumerate() {
        if let Some(path) = &source {
            let header = snapshot::read_header(path)
                .with_context(|| format!("reading {}", path.display()))?;
            if last_checksum == Some(header.content_checksum) {
                tracing::info!(path = %path.display(), "skipping checkpoint identical to the previous one");
                if !args.json {
                    println!("{} {}: identical to previous", "skip".dimmed(), path.display());
                }
                continue;
            }
            last_checksum = Some(header.content_checksum);
        }

        let mut scorer_config = config.scorer.clone();
        scorer_config.load_pretrained = source.clone();
        let scorer = build_scorer(&scorer_config).context("building scorer")?;
        let report = evaluator.evaluate(scorer.as_ref(), checkpoint)?;

        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            let label = source
                .as_ref()
                .map_or_else(|| scorer_config.kind.to_string(), |p| p.display().to_string());
            println!(
                "{} {}: success rate {:.1}%, max length {}, mean length {:.2}",
                "eval".yellow().bold(),
                label.bold(),
                100.0 * report.success_rate,
                report.max_solution_length,
                report.mean_solution_length
            );
            for (index, problem) in report.new_successes(previous.as_ref()) {
                println!(
                    "  {} #{index} {problem} (length {})",
                    "new success".green(),
                    report.solution_lengths[*index]
                );
            }
            for (index, problem) in report.new_failures(previous.as_ref()) {
                println!("  {} #{index} {problem}", "new failure".red());
            }
        }
        previous = Some(report);
    }
    Ok(())
}
