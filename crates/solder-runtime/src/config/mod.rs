//! Configuration for Solder applications.
//!
//! Settings are merged by figment from defaults, `solder.toml` style files
//! and `SOLDER_*` environment variables, then validated.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ServerConfig, SolderConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
