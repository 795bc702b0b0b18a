//! `relay config`: show where configuration lives and what is in effect.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::args::{Cli, ConfigArgs, OutputFormat};
use crate::error::Result;
use crate::render::robot;
use crate::storage::{Config, ResolvedConfig};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport {
    path: PathBuf,
    exists: bool,
    config: Config,
}

/// Execute the config command.
///
/// # Errors
///
/// Returns an error if the config file is malformed or invalid.
pub fn execute(cli: &Cli, args: &ConfigArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    println!("{}", render(cli, args, format, pretty)?);
    Ok(())
}

fn render(cli: &Cli, args: &ConfigArgs, format: OutputFormat, pretty: bool) -> Result<String> {
    let path = Config::config_path_for(cli.config.as_deref());

    if args.path {
        return match format {
            OutputFormat::Human => Ok(path.display().to_string()),
            OutputFormat::Json => robot::render_json(
                "config",
                &serde_json::json!({ "path": path, "exists": path.exists() }),
                pretty,
            ),
        };
    }

    let config = if args.default {
        Config::default()
    } else {
        ResolvedConfig::resolve(cli, None)?.config
    };

    match format {
        OutputFormat::Human => {
            let header = if args.default {
                "# Built-in defaults".to_string()
            } else if path.exists() {
                format!("# Effective config from {}", path.display())
            } else {
                format!("# No file at {}; showing defaults", path.display())
            };
            Ok(format!("{header}\n{}", config.to_toml()?))
        }
        OutputFormat::Json => robot::render_json(
            "config",
            &ConfigReport {
                exists: path.exists(),
                path,
                config,
            },
            pretty,
        ),
    }
}
