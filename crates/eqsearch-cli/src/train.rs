//! `eqsearch train`: the full learning loop with on-disk outputs.
//!
//! Output directory layout:
//! - `solutions.jsonl`: every episode trajectory
//! - `evaluations.jsonl`: one report per evaluation
//! - `checkpoints/<n>.eqss`: scorer snapshot at evaluation `n`
//! - `training-state.json` and `training-state.eqss`: counters and scorer
//!   of the last checkpoint; a later run on the same directory resumes
//!   from them
//! - `scorer.eqss`: final scorer

use crate::setup;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use eqsearch_learn::{
    build_scorer, EvaluationReport, LearnError, Learner, ScoringFunction, SolutionLog,
    SolutionRecord, TrainingObserver, TrainingState, Trajectory,
};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "training-state.json";
const STATE_SCORER_FILE: &str = "training-state.eqss";

#[derive(Args)]
pub struct TrainArgs {
    /// Experiment config (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output directory.
    #[arg(short, long)]
    pub out: PathBuf,
    /// Ignore a saved training state in the output directory and start over.
    #[arg(long)]
    pub restart: bool,
}

struct DiskObserver {
    out: PathBuf,
    solutions: SolutionLog,
    evaluations: BufWriter<File>,
    checkpoint_dir: PathBuf,
}

impl TrainingObserver for DiskObserver {
    fn on_trajectory(&mut self, _episode: usize, trajectory: &Trajectory) -> Result<(), LearnError> {
        self.solutions
            .append(&SolutionRecord::from_trajectory(trajectory))?;
        Ok(())
    }

    fn on_evaluation(
        &mut self,
        report: &EvaluationReport,
        scorer: &dyn ScoringFunction,
    ) -> Result<(), LearnError> {
        let path = self
            .checkpoint_dir
            .join(format!("{}.eqss", report.checkpoint));
        scorer.save_snapshot(&path)?;
        let line = serde_json::to_string(report).map_err(|e| LearnError::Observer(e.to_string()))?;
        writeln!(self.evaluations, "{line}")
            .and_then(|_| self.evaluations.flush())
            .map_err(|e| LearnError::Observer(e.to_string()))?;
        self.solutions.flush()?;
        eprintln!(
            "{} checkpoint {}: success rate {:.1}%, max length {}, mean length {:.2}",
            "eval".yellow().bold(),
            report.checkpoint,
            100.0 * report.success_rate,
            report.max_solution_length,
            report.mean_solution_length
        );
        Ok(())
    }

    /// Scorer first, so a state file never points past the saved weights.
    fn on_checkpoint(
        &mut self,
        state: &TrainingState,
        scorer: &dyn ScoringFunction,
    ) -> Result<(), LearnError> {
        scorer.save_snapshot(&self.out.join(STATE_SCORER_FILE))?;
        state.save(&self.out.join(STATE_FILE))
    }
}

fn open_evaluations(path: &Path, append: bool) -> Result<BufWriter<File>> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    };
    let file = file.with_context(|| format!("opening {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = setup::load_config(args.config.as_deref())?;
    let env = setup::environment(&config)?;
    let mut scorer = build_scorer(&config.scorer).context("building scorer")?;

    let checkpoint_dir = args.out.join("checkpoints");
    fs::create_dir_all(&checkpoint_dir)
        .with_context(|| format!("creating {}", checkpoint_dir.display()))?;
    fs::write(
        args.out.join("config.json"),
        serde_json::to_string_pretty(&config)?,
    )
    .context("writing resolved config")?;

    let state_path = args.out.join(STATE_FILE);
    let saved = if !args.restart && state_path.exists() {
        let state = TrainingState::load(&state_path)?;
        let scorer_path = args.out.join(STATE_SCORER_FILE);
        scorer
            .load_pretrained(&scorer_path)
            .with_context(|| format!("restoring scorer from {}", scorer_path.display()))?;
        Some(state)
    } else {
        None
    };
    let resuming = saved.is_some();

    let solutions_path = args.out.join("solutions.jsonl");
    let mut observer = DiskObserver {
        solutions: if resuming {
            SolutionLog::open_append(&solutions_path)?
        } else {
            SolutionLog::create(&solutions_path)?
        },
        evaluations: open_evaluations(&args.out.join("evaluations.jsonl"), resuming)?,
        out: args.out.clone(),
        checkpoint_dir,
    };

    tracing::info!(
        out = %args.out.display(),
        episodes = config.learner.max_episodes,
        scorer = %config.scorer.kind,
        resuming,
        "starting training"
    );
    let mut learner = Learner::new(env, &config)?;
    if let Some(state) = saved {
        eprintln!(
            "{} from episode {} (checkpoint {})",
            "resuming".cyan().bold(),
            state.episodes,
            state.checkpoints
        );
        learner.resume(state);
    }
    let summary = learner.train(scorer.as_mut(), &mut observer)?;
    observer.solutions.flush()?;

    let final_path = args.out.join("scorer.eqss");
    scorer.save_snapshot(&final_path)?;

    let last_rate = summary.reports.last().map_or(0.0, |r| r.success_rate);
    eprintln!(
        "{} {} episodes ({} solved), {} gradient steps, final success rate {:.1}%",
        "trained".green().bold(),
        summary.episodes,
        summary.solved_episodes,
        summary.gradient_steps,
        100.0 * last_rate
    );
    eprintln!("{} {}", "wrote".green().bold(), final_path.display().to_string().bold());
    Ok(())
}
