//! CLI module for podar
//!
//! Argument parsing and the command handlers behind the `podar` binary.
//!
//! # Usage
//!
//! ```bash
//! podar validate recipe.yaml
//! podar schedule recipe.yaml --epochs 20 --steps-per-epoch 100
//! ```

mod args;
mod commands;
mod logging;

pub use args::{parse_args, Cli, Command, ScheduleArgs, ValidateArgs};
pub use commands::run_command;
pub use logging::LogLevel;
