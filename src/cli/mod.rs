pub mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cac_batch")]
#[command(about = "Resource-aware batch runner for coronary calcium scoring", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults apply when absent)
    #[arg(long, global = true, default_value = "cac_config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected GPU, CPU and RAM
    Detect {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the execution profile selected for this machine
    Profile {
        /// Also print every tier's defaults
        #[arg(long)]
        all: bool,
    },
    /// Summarize the resume ledger
    Status,
    /// Score every study under the data directory
    Run(RunArgs),
    /// Delete the resume ledger
    ClearCheckpoint,
}

#[derive(Args)]
pub struct RunArgs {
    /// Scorer executable, invoked as `<scorer> [args...] <study_dir>`
    #[arg(long)]
    pub scorer: PathBuf,
    /// Extra argument passed to the scorer (repeatable)
    #[arg(long = "scorer-arg", allow_hyphen_values = true)]
    pub scorer_args: Vec<String>,
    /// Override the data directory
    #[arg(long)]
    pub data_dir: Option<String>,
    /// Override the output directory
    #[arg(long)]
    pub output_dir: Option<String>,
    /// Process at most N studies (pilot mode)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Ignore the ledger and process every study
    #[arg(long)]
    pub no_resume: bool,
    /// Delete the ledger before starting
    #[arg(long)]
    pub clear_checkpoint: bool,
    /// Sample resources before every Nth study
    #[arg(long)]
    pub safety_check_interval: Option<usize>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Detect { json } => commands::detect(json),
        Commands::Profile { all } => commands::profile(&cli.config, all),
        Commands::Status => commands::status(&cli.config),
        Commands::Run(args) => commands::run(&cli.config, args),
        Commands::ClearCheckpoint => commands::clear_checkpoint(&cli.config),
    }
}
