//! Solder Runtime - configuration, logging and serving for Solder
//! applications.
//!
//! This crate provides:
//! - figment-based configuration loading (`SolderConfig`, `ConfigLoader`)
//! - `tracing-subscriber` logging setup (`LoggingBuilder`)
//! - Route registration and serving (`SolderRuntime`)
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log format
//! - `http-server`: serve routes with axum via [`SolderRuntime::run`]
//!
//! ```ignore
//! use solder_runtime::SolderRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), solder_runtime::RuntimeError> {
//!     let mut runtime = SolderRuntime::new();
//!     let encoding = runtime.encoding();
//!     runtime.route("/health", [encoding.build::<Health>(), endpoint(health)])?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, ServerConfig, SolderConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, SolderRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
