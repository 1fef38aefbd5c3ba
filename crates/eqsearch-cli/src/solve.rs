//! `eqsearch solve`: run one beam search and print the solution.

use crate::setup;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use eqsearch_env::AbstractionMode;
use eqsearch_expr::parse_expr;
use eqsearch_learn::{build_scorer, BeamSearch, ScorerKind, SolutionRecord};
use std::path::PathBuf;

#[derive(Args)]
pub struct SolveArgs {
    /// Equation to solve, e.g. "2x + 3 = 7".
    pub equation: String,
    /// Experiment config (JSON); its `search`, `scorer` and `abstractions` sections apply.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Scorer backend (default: inverse_length unless a snapshot is given).
    #[arg(long, value_parser = setup::parse_scorer_kind)]
    pub scorer: Option<ScorerKind>,
    /// Scorer snapshot to load.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    #[arg(long)]
    pub beam_size: Option<usize>,
    #[arg(long)]
    pub max_depth: Option<u32>,
    /// Abstraction library (JSON).
    #[arg(long)]
    pub abstractions: Option<PathBuf>,
    /// How to read the abstraction library: `ax_seq` or `tree_idx`.
    #[arg(long)]
    pub mode: Option<AbstractionMode>,
    /// Print the solution as a JSON record instead of a table.
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_solve(args: SolveArgs) -> Result<()> {
    let mut config = setup::load_config(args.config.as_deref())?;
    if let Some(beam_size) = args.beam_size {
        config.search.beam_size = beam_size;
    }
    if let Some(max_depth) = args.max_depth {
        config.search.max_depth = max_depth;
        config.search.initial_depth = config.search.initial_depth.min(max_depth);
    }
    if let Some(path) = args.abstractions {
        config.abstractions.path = Some(path);
    }
    if let Some(mode) = args.mode {
        config.abstractions.mode = mode;
    }
    if let Some(snapshot) = args.snapshot {
        config.scorer.load_pretrained = Some(snapshot);
    }
    config.scorer.kind = match (args.scorer, &config.scorer.load_pretrained, &args.config) {
        (Some(kind), _, _) => kind,
        (None, Some(_), _) | (None, None, Some(_)) => config.scorer.kind,
        (None, None, None) => ScorerKind::InverseLength,
    };
    config.validate()?;

    let problem = parse_expr(&args.equation).context("parsing equation")?;
    let env = setup::environment(&config)?;
    let scorer = build_scorer(&config.scorer).context("building scorer")?;
    let mut search = BeamSearch::new(env, config.search.clone(), config.learner.seed);
    let result = search.search(&problem, scorer.as_ref())?;

    if args.json {
        let record = SolutionRecord::from_trajectory(&result.trajectory);
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("{} {}", "problem".bold(), result.trajectory.problem.to_string().bold());
    for (i, (state, formal, human)) in result.trajectory.describe().into_iter().enumerate() {
        println!(
            "{:>3}. {:<28} {}  {}",
            i + 1,
            formal.cyan(),
            state,
            format!("({human})").dimmed()
        );
    }
    let stats = result.stats;
    if result.solved() {
        println!(
            "{} in {} steps ({} attempts, {} expansions)",
            "solved".green().bold(),
            result.trajectory.len(),
            stats.attempts,
            stats.expansions
        );
    } else {
        println!(
            "{} within depth {} ({} attempts, {} expansions); best partial path shown",
            "unsolved".red().bold(),
            config.search.max_depth,
            stats.attempts,
            stats.expansions
        );
    }
    Ok(())
}
