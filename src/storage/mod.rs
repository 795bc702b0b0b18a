//! Configuration storage and platform paths.

pub mod config;
pub mod paths;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_CONFIG, ENV_FORMAT, ENV_MAX_ATTEMPTS, ENV_PROVIDER,
    ENV_TIMEOUT, ProviderConfig, ResolvedConfig,
};
pub use paths::AppPaths;
