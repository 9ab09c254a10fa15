//! CLI command implementations

mod schedule;
mod validate;


use crate::cli::{Cli, Command, LogLevel};

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<(), String> {
    let log_level = LogLevel::from_flags(cli.quiet, cli.verbose);

    match cli.command {
        Command::Validate(args) => validate::run_validate(args, log_level),
        Command::Schedule(args) => schedule::run_schedule(args, log_level),
    }
}
