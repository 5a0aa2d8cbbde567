//! Route table.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use solder_core::{
    BoxError, Chain, Compiled, Handler, ResolveError, ResolveResult, ValueCollection,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::decode::{BodyDecoder, DecodeGenerator, json_body};
use crate::encode::write_plain;
use crate::request::RawRequest;
use crate::status::status_of;
use crate::writer::DeferredWriter;

/// Default request body limit: 2 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// The per-request entry point handed to a [`Binder`].
///
/// Runs the route's chain and leaves the complete response in the writer.
pub type RouteFn = Arc<dyn Fn(DeferredWriter, RawRequest) -> BoxFuture<'static, ()> + Send + Sync>;

/// Mounts routes on a transport.
pub trait Binder {
    /// Returned for every mounted route.
    type Handle;

    /// Called once per path by [`Router::start`].
    fn bind(&mut self, path: &str, route: RouteFn) -> Result<Self::Handle, BoxError>;
}

/// A binder rejected a route.
#[derive(Debug, Error)]
#[error("failed to bind route '{path}': {source}")]
pub struct BindError {
    pub path: String,
    #[source]
    pub source: BoxError,
}

/// Settings shared by every route of a [`Router`].
#[derive(Clone)]
pub struct RouterSettings {
    pub max_body_bytes: usize,
    pub body_decoder: BodyDecoder,
    /// Extra decode targets, see [`DecodeGenerator::register`].
    pub decode: DecodeGenerator,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            body_decoder: json_body(),
            decode: DecodeGenerator::new(),
        }
    }
}

impl fmt::Debug for RouterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterSettings")
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

struct Route {
    path: String,
    compiled: Compiled,
}

/// Registers one handler chain per path.
///
/// Every route chain starts with the [`RawRequest`] and [`DeferredWriter`]
/// seeds and a [`DecodeGenerator`]; the handlers given to
/// [`route`](Self::route) follow. The body reader is only generated for
/// chains that consume a [`RawBody`](crate::RawBody).
pub struct Router {
    settings: RouterSettings,
    routes: Vec<Route>,
    started: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::with_settings(RouterSettings::default())
    }

    pub fn with_settings(settings: RouterSettings) -> Self {
        Self {
            settings,
            routes: Vec::new(),
            started: false,
        }
    }

    /// The chain a route's handlers are appended to.
    pub fn base_chain(&self, path: &str) -> Chain {
        let generator = self
            .settings
            .decode
            .clone()
            .body_decoder(self.settings.body_decoder.clone())
            .body_limit(self.settings.max_body_bytes);
        Chain::new(path)
            .seed::<RawRequest>()
            .seed::<DeferredWriter>()
            .generator(Arc::new(generator))
    }

    /// Resolves and compiles the chain for `path`.
    pub fn route(
        &mut self,
        path: impl Into<String>,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> ResolveResult<&mut Self> {
        let path = path.into();
        if self.routes.iter().any(|route| route.path == path) {
            return Err(ResolveError::DuplicateRegistration { path });
        }

        let plan = self.base_chain(&path).extend(handlers).resolve()?;
        debug!(path = %path, "Route resolved\n{}", plan.trace());
        self.routes.push(Route {
            path,
            compiled: plan.compile(),
        });
        Ok(self)
    }

    /// Registered paths, in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.path.as_str())
    }

    /// Runs every route's static handlers, then binds each route once.
    ///
    /// # Panics
    ///
    /// If called more than once.
    pub async fn start<B: Binder>(&mut self, binder: &mut B) -> Result<Vec<B::Handle>, BindError> {
        if self.started {
            panic!("router was started twice");
        }
        self.started = true;

        for route in &self.routes {
            route.compiled.init().await;
        }

        let mut handles = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            let handle = binder
                .bind(&route.path, dispatcher(route.compiled.clone()))
                .map_err(|source| BindError {
                    path: route.path.clone(),
                    source,
                })?;
            handles.push(handle);
        }

        info!(routes = self.routes.len(), "Router started");
        Ok(handles)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a compiled route chain as a [`RouteFn`].
pub fn dispatcher(compiled: Compiled) -> RouteFn {
    Arc::new(move |writer: DeferredWriter, request: RawRequest| {
        let compiled = compiled.clone();
        Box::pin(async move {
            let seeds = ValueCollection::new()
                .with(request)
                .with(writer.clone());
            if let Err(err) = compiled.invoke(seeds).await {
                if writer.is_committed() {
                    warn!(route = compiled.name(), error = %err, "Route failed after responding");
                } else {
                    debug!(route = compiled.name(), error = %err, "Route short-circuited");
                    write_plain(&writer, status_of(&err), &err.to_string());
                }
            }
            writer.flush();
        })
    })
}
