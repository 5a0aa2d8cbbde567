//! # Solder
//!
//! Type-driven handler chains for HTTP services.
//!
//! A route is an ordered list of small async handlers. Each handler declares
//! the types it consumes and produces, and Solder wires them together at
//! registration time: a missing producer, an ambiguous one, or a return value
//! nobody reads is reported before the first request arrives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────────────┐
//! │   Runtime    │────▶│    Router    │────▶│ Chain "/users/{id}"              │
//! │ (config/log) │     │ (per path)   │     │  seeds → decode → encode → endpoint
//! └──────────────┘     └──────────────┘     └──────────────────────────────────┘
//! ```
//!
//! - **Core** ([`core`]): chains, handler constructors, resolution and invocation
//! - **HTTP** ([`http`]): request seeds, `#[derive(Decode)]`, response encoding, binders
//! - **Runtime** ([`runtime`]): configuration, logging and serving
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solder::prelude::*;
//!
//! #[derive(Clone, Default, Decode)]
//! #[solder(crate = "solder::http")]
//! struct ShowUser {
//!     #[solder("path")]
//!     id: u64,
//! }
//!
//! #[derive(serde::Serialize)]
//! struct User {
//!     id: u64,
//! }
//!
//! async fn show_user(req: ShowUser) -> Result<User, BoxError> {
//!     Ok(User { id: req.id })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RuntimeError> {
//!     let mut runtime = SolderRuntime::new();
//!     let encoding = runtime.encoding();
//!     runtime.route("/users/{id}", [encoding.build::<User>(), endpoint(show_user)])?;
//!     runtime.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `axum`: `AxumBinder` for mounting routes into an existing axum router
//! - `http-server`: `SolderRuntime::run` serving over axum

pub use solder_core as core;
pub use solder_http as http;
pub use solder_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use solder::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use solder_runtime::{RuntimeError, SolderConfig, SolderRuntime};

    // Handler constructors
    pub use solder_core::{
        BoxError, Chain, Handler, Next, TerminalError, ValueCollection, endpoint, fallible,
        middleware, provide, provide_all, recover, try_endpoint, try_middleware,
    };

    // HTTP boundary
    pub use solder_http::{
        Decode, DeferredWriter, Encoding, RawBody, RawRequest, Router, StatusError, status_of,
        with_status,
    };

    // Logging macros
    pub use solder_runtime::prelude::*;
}
