//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Podar: scheduled weight pruning
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "podar")]
#[command(version)]
#[command(about = "Inspect and dry-run weight pruning recipes")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load and validate a pruning recipe
    Validate(ValidateArgs),

    /// Print when each modifier of a recipe fires
    Schedule(ScheduleArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to the YAML recipe
    #[arg(value_name = "RECIPE")]
    pub recipe: PathBuf,
}

/// Arguments for the schedule command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ScheduleArgs {
    /// Path to the YAML recipe
    #[arg(value_name = "RECIPE")]
    pub recipe: PathBuf,

    /// Epochs to simulate (defaults to the recipe's last epoch)
    #[arg(short, long)]
    pub epochs: Option<f64>,

    /// Steps per epoch; 0 walks whole epochs
    #[arg(short, long, default_value_t = 0)]
    pub steps_per_epoch: usize,
}

/// Parse arguments from an iterator (used by tests and `main`)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}
