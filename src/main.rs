//! Podar CLI
//!
//! Inspect pruning recipes without a model.
//!
//! # Usage
//!
//! ```bash
//! # Validate a recipe
//! podar validate recipe.yaml
//!
//! # Print when each modifier fires and at what sparsity
//! podar schedule recipe.yaml --epochs 20 --steps-per-epoch 100
//!
//! # Library logs
//! RUST_LOG=debug podar schedule recipe.yaml
//! ```

use clap::Parser;
use podar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
