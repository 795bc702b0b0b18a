//! CLI argument parsing and command dispatch.

pub mod args;
pub mod config;
pub mod providers;
pub mod send;

pub use args::{Cli, Commands, OutputFormat};

use clap::CommandFactory;

/// Write a completion script for `shell` to stdout.
pub fn print_completions(shell: clap_complete::Shell) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "relay", &mut std::io::stdout());
}
