//! eqsearch CLI
//!
//! - `solve`: beam-search one equation and print the steps
//! - `generate`: print seeded training problems
//! - `check-abstractions`: compile an abstraction library and list it
//! - `train`: run the learning loop, writing snapshots and logs
//! - `eval`: success rate of scorer checkpoints on held-out problems

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eqsearch_env::{generate_batch, AbstractionLibrary, AbstractionMode, AxiomSet};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod eval;
mod setup;
mod solve;
mod train;

#[derive(Parser)]
#[command(name = "eqsearch")]
#[command(author, version, about = "Learned search over equation rewrites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one equation with beam search.
    Solve(solve::SolveArgs),

    /// Print generated problems (one per line: seed, equation).
    Generate {
        /// First seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Number of problems.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Compile an abstraction library against the axiom set and list it.
    CheckAbstractions {
        /// Abstraction library (JSON array of records).
        path: PathBuf,
        /// `ax_seq` (default) or `tree_idx`.
        #[arg(long, default_value_t = AbstractionMode::AxSeq)]
        mode: AbstractionMode,
    },

    /// Train a scorer.
    Train(train::TrainArgs),

    /// Evaluate scorer checkpoints.
    Eval(eval::EvalArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Solve(args) => solve::cmd_solve(args),
        Commands::Generate { seed, count } => {
            for (seed, problem) in generate_batch(seed, count) {
                println!("{seed}\t{problem}");
            }
            Ok(())
        }
        Commands::CheckAbstractions { path, mode } => cmd_check_abstractions(&path, mode),
        Commands::Train(args) => train::cmd_train(args),
        Commands::Eval(args) => eval::cmd_eval(args),
    }
}

fn cmd_check_abstractions(path: &Path, mode: AbstractionMode) -> Result<()> {
    let axioms = AxiomSet::standard();
    let library = AbstractionLibrary::load(path, mode, &axioms)
        .with_context(|| format!("checking {}", path.display()))?;
    for abstraction in library.iter() {
        let steps: Vec<String> = abstraction
            .steps()
            .iter()
            .map(|step| {
                let name = axioms.get(step.axiom).name();
                match &step.offset {
                    Some(rel) => format!("{name}@{rel}"),
                    None => name.to_string(),
                }
            })
            .collect();
        println!("{} {}", abstraction.name().bold(), steps.join(" -> "));
    }
    println!(
        "{} {} abstractions ({mode})",
        "ok".green().bold(),
        library.len()
    );
    Ok(())
}
