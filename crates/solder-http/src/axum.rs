//! Mounting routes into an axum router.

use std::fmt;

use ::axum::Router;
use ::axum::body::{Body, to_bytes};
use ::axum::extract::{RawPathParams, Request};
use ::axum::http::StatusCode;
use ::axum::response::{IntoResponse, Response};
use ::axum::routing::any;
use solder_core::BoxError;
use tracing::debug;

use crate::request::{PathParams, RawRequest};
use crate::router::{Binder, DEFAULT_MAX_BODY_BYTES, RouteFn};
use crate::writer::DeferredWriter;

/// A [`Binder`] adding one axum route per path.
///
/// Paths use axum's syntax, e.g. `/users/{id}`; captured parameters are
/// available to `path` fields of decode targets. Every method is routed to
/// the chain.
pub struct AxumBinder {
    router: Router,
    max_body_bytes: usize,
}

impl AxumBinder {
    pub fn new() -> Self {
        Self::with_router(Router::new())
    }

    /// Adds routes to an existing router.
    pub fn with_router(router: Router) -> Self {
        Self {
            router,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limit applied while buffering request bodies.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

impl Default for AxumBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AxumBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxumBinder")
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Binder for AxumBinder {
    type Handle = ();

    fn bind(&mut self, path: &str, route: RouteFn) -> Result<(), BoxError> {
        if !path.starts_with('/') {
            return Err(format!("path '{path}' must start with '/'").into());
        }

        let limit = self.max_body_bytes;
        let handler = move |params: RawPathParams, request: Request| {
            let route = route.clone();
            async move { serve(route, params, request, limit).await }
        };

        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, any(handler));
        debug!(path = %path, "Mounted axum route");
        Ok(())
    }
}

async fn serve(route: RouteFn, params: RawPathParams, request: Request, limit: usize) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, limit).await {
        Ok(body) => body,
        Err(err) => return (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).into_response(),
    };

    let params: PathParams = params.iter().collect();
    let writer = DeferredWriter::new();
    route(writer.clone(), RawRequest::new(parts, body, params)).await;
    let (parts, body) = writer.into_response().into_parts();
    Response::from_parts(parts, Body::from(body))
}
