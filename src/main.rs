//! relay - prompt relay for coding agent CLIs
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use relay::cli::{Cli, Commands};
use relay::core::logging;
use relay::storage::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .or_else(|| config_log_level(&cli))
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    let log_file = logging::parse_log_file_from_env();
    logging::init(log_level, log_format, log_file, cli.verbose);

    let format = cli.effective_format();
    let no_color = !relay::util::env::should_use_color(cli.no_color);
    let pretty = cli.pretty;
    if no_color {
        colored::control::set_override(false);
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let error_output = relay::render::error::render_error(&e, format, no_color, pretty);
            eprintln!("{error_output}");
            ExitCode::from(u8::try_from(i32::from(e.exit_code())).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli) -> relay::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;

    match &cli.command {
        None => {
            print_quickstart();
            Ok(())
        }

        Some(Commands::Send(args)) => relay::cli::send::execute(cli, args, pretty).await,

        Some(Commands::Providers) => relay::cli::providers::execute(cli, format, pretty).await,

        Some(Commands::Config(args)) => relay::cli::config::execute(cli, args, format, pretty),

        Some(Commands::Completions { shell }) => {
            relay::cli::print_completions(*shell);
            Ok(())
        }
    }
}

/// `general.log_level` from the config file, if it loads.
fn config_log_level(cli: &Cli) -> Option<logging::LogLevel> {
    Config::load_from(&Config::config_path_for(cli.config.as_deref()))
        .ok()
        .and_then(|config| config.general.log_level)
        .and_then(|level| logging::LogLevel::from_arg(&level))
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r#"relay - prompt relay for coding agent CLIs

Sends a prompt to Claude Code, Codex, Cursor or Gemini and fails over to the
next provider when one is rate limited, down or unhealthy.

USAGE:
    relay [OPTIONS] <COMMAND>

COMMANDS:
    send         Send a prompt
    providers    List providers and whether their CLIs are installed
    config       Show the effective configuration
    completions  Generate shell completions

QUICK START:
    relay send "explain this stack trace"      # Default provider, with failover
    relay send -p codex "write a test"          # Try codex first
    git diff | relay send                       # Prompt from stdin
    relay providers                             # What is installed and ready

ROBOT MODE (for AI agents):
    relay send --json "..."                     # JSON envelope on stdout
    relay send --events "..."                   # Orchestration events on stderr

For more help: relay --help
"#
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
