//! Runtime error types.

use solder_core::ResolveError;
use solder_http::BindError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up or serving an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A route chain failed to resolve.
    #[error("Route resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bind(#[from] BindError),

    /// Listening or serving failed.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
