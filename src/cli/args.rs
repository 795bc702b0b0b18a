//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::error::{RelayError, Result};

/// Prompt relay - send prompts to coding agent CLIs with automatic failover.
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt, failing over between providers as needed
    Send(SendArgs),

    /// List configured providers and whether their CLIs are installed
    Providers,

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the `send` command.
#[derive(Parser, Debug, Default)]
pub struct SendArgs {
    /// Prompt text (read from stdin when omitted)
    #[arg(value_name = "PROMPT", conflicts_with = "file")]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long, short, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Provider to try first (name or alias)
    #[arg(long, short, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Model for the first provider
    #[arg(long, short, value_name = "MODEL")]
    pub model: Option<String>,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Let the agent skip permission prompts
    #[arg(long)]
    pub dangerous: bool,

    /// Resume an existing agent session
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Maximum attempts across all providers
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<usize>,

    /// Stream orchestration events as JSON lines on stderr
    #[arg(long)]
    pub events: bool,
}

impl SendArgs {
    /// Validate argument values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero timeout or attempt budget.
    pub fn validate(&self) -> Result<()> {
        if self.timeout == Some(0) {
            return Err(RelayError::ConfigInvalid {
                key: "--timeout".to_string(),
                message: "must be greater than 0 seconds".to_string(),
            });
        }
        if self.max_attempts == Some(0) {
            return Err(RelayError::ConfigInvalid {
                key: "--max-attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Arguments for the `config` command.
#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Print the config file path only
    #[arg(long, conflicts_with = "default")]
    pub path: bool,

    /// Print the built-in defaults instead of the effective config
    #[arg(long)]
    pub default: bool,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}
