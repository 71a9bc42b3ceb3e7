use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use emlp_seq::applications::symmetric_projection;
use emlp_seq::utils::{build_subscriber, load_json, parse_log_level};
use emlp_seq::ExperimentConfig;

/// Dimension-extendable equivariant MLP experiments
#[derive(Parser, Debug)]
#[command(name = "emlp-seq", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train compatible and free families on the symmetric projection and
    /// evaluate them across dimensions
    SymmetricProjection(ProjectionArgs),
    /// Print the default experiment configuration as JSON
    Defaults,
}

#[derive(Args, Debug)]
struct ProjectionArgs {
    /// JSON file overriding the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Epoch budget
    #[arg(long)]
    epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log verbosity (critical, error, warn, info, debug)
    #[arg(long)]
    log_level: Option<String>,

    /// Directory for the result bundle
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

impl ProjectionArgs {
    fn config(&self) -> Result<ExperimentConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_json(path).with_context(|| format!("reading config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            cfg.num_epochs = epochs;
        }
        if let Some(lr) = self.lr {
            cfg.learning_rate = lr;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run_projection(args: ProjectionArgs) -> Result<()> {
    let cfg = args.config()?;
    let level = parse_log_level(&cfg.log_level)?;

    tracing::subscriber::with_default(build_subscriber(level), || -> Result<()> {
        let results = symmetric_projection::run(&cfg, &args.out_dir)?;
        tracing::info!(
            "Wrote {}",
            args.out_dir.join(symmetric_projection::STATE_FILE).display()
        );
        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::SymmetricProjection(args) => run_projection(args),
        Command::Defaults => {
            println!("{}", serde_json::to_string_pretty(&ExperimentConfig::default())?);
            Ok(())
        }
    }
}
