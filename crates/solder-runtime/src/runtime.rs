//! Application runtime: configuration, logging, routes and serving.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use solder_runtime::SolderRuntime;
//!
//! // Auto-loads solder.toml from the current directory
//! let mut runtime = SolderRuntime::new();
//! let encoding = runtime.encoding();
//! runtime.route("/users/{id}", [encoding.build::<User>(), endpoint(show_user)])?;
//!
//! // Requires the `http-server` feature
//! runtime.run().await?;
//! ```

use http::HeaderValue;
use solder_core::Handler;
use solder_http::{Binder, Encoding, Router, RouterSettings};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigLoader, ConfigResult, SolderConfig};
use crate::error::RuntimeResult;
use crate::logging;

/// Owns the configuration and the [`Router`] of an application.
pub struct SolderRuntime {
    config: SolderConfig,
    router: Router,
    shutdown: CancellationToken,
}

impl SolderRuntime {
    /// Creates a runtime from `solder.toml` in the current directory and the
    /// environment.
    ///
    /// Falls back to the default configuration if loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SolderConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration and installs logging.
    pub fn from_config(config: &SolderConfig) -> Self {
        logging::init_from_config(&config.logging);

        let settings = RouterSettings {
            max_body_bytes: config.server.max_body_bytes,
            ..RouterSettings::default()
        };

        info!(
            address = %config.server.address,
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            router: Router::with_settings(settings),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SolderConfig {
        &self.config
    }

    /// A JSON encoding answering under `server.default_content_type`.
    pub fn encoding(&self) -> Encoding {
        let content_type = &self.config.server.default_content_type;
        match HeaderValue::from_str(content_type) {
            Ok(value) => Encoding::json_as(value),
            Err(_) => {
                warn!(content_type = %content_type, "Invalid default content type, using application/json");
                Encoding::json()
            }
        }
    }

    /// Resolves and registers the chain for `path`.
    pub fn route(
        &mut self,
        path: impl Into<String>,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> RuntimeResult<&mut Self> {
        self.router.route(path, handlers)?;
        Ok(self)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// A token that stops [`run`](Self::run) and [`run_until`](Self::run_until)
    /// when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Initializes every route and hands it to `binder`.
    ///
    /// # Panics
    ///
    /// If the routes were already started.
    pub async fn start<B: Binder>(&mut self, binder: &mut B) -> RuntimeResult<Vec<B::Handle>> {
        info!("Starting Solder runtime");
        let handles = self.router.start(binder).await?;
        info!(routes = handles.len(), "Runtime started");
        Ok(handles)
    }

    /// Waits for Ctrl+C, SIGTERM or the shutdown token.
    pub async fn wait_for_shutdown(&self) {
        wait_for_shutdown(self.shutdown.clone()).await;
    }
}

impl Default for SolderRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Serving
// =============================================================================

#[cfg(feature = "http-server")]
impl SolderRuntime {
    /// Serves the routes on `server.address` until a shutdown signal.
    pub async fn run(&mut self) -> RuntimeResult<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.server.address).await?;
        let token = self.shutdown.clone();
        self.serve(listener, wait_for_shutdown(token)).await
    }

    /// Serves the routes on `server.address` until `shutdown` completes or
    /// the shutdown token is cancelled.
    pub async fn run_until<F>(&mut self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.config.server.address).await?;
        let token = self.shutdown.clone();
        self.serve(listener, async move {
            tokio::select! {
                _ = shutdown => {}
                _ = token.cancelled() => {}
            }
        })
        .await
    }

    /// Mounts the routes into an axum router and serves it on `listener`.
    pub async fn serve<F>(
        &mut self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut binder =
            solder_http::AxumBinder::new().max_body_bytes(self.config.server.max_body_bytes);
        self.start(&mut binder).await?;

        let addr = listener.local_addr()?;
        info!(addr = %addr, "HTTP server listening");

        axum::serve(listener, binder.into_router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
        _ = token.cancelled() => {
            info!("Shutdown requested, shutting down");
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`SolderRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = SolderRuntime::builder()
///     .config_file("config/solder.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration over every other source.
    pub fn merge(mut self, config: SolderConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<SolderRuntime> {
        let config = self.config_loader.load()?;
        Ok(SolderRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
