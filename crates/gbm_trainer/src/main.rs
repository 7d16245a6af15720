//! GBDT trainer CLI
//!
//! Loads a labeled CSV, splits it 80/20, trains a binary classifier and
//! saves the model as text.

use anyhow::{Context, Result};
use clap::Parser;
use gbm_trainer::{Trainer, TrainerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gbm-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train a binary GBDT classifier from a CSV file", long_about = None)]
struct Args {
    /// Input CSV (first line is a header, column 0 is the label)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output model path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Share of rows used for training
    #[arg(long)]
    train_ratio: Option<f64>,

    /// Write a JSON training report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("GBDT trainer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TrainerConfig::load_from_file(path).context("Failed to load config")?,
        None => TrainerConfig::default(),
    };
    if let Some(input) = args.input {
        config.data.input = input;
    }
    if let Some(output) = args.output {
        config.data.output = output;
    }
    if let Some(ratio) = args.train_ratio {
        config.data.train_ratio = ratio;
    }
    config.validate().context("Invalid configuration")?;

    let trainer = Trainer::new(config);
    let outcome = trainer.run().context("Training failed")?;

    info!(
        "Finished after {} rounds: {} trees, best iteration {}",
        outcome.history.len(),
        outcome.num_trees,
        outcome.best_iteration
    );

    if let Some(report) = &args.report {
        outcome
            .write_report(report)
            .context("Failed to write report")?;
    }

    Ok(())
}
