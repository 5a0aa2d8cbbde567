//! Tower integration.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use solder_core::BoxError;
use tower::Service;

use crate::request::RawRequest;
use crate::router::{Binder, RouteFn};
use crate::writer::DeferredWriter;

/// A route as a [`tower::Service`] over buffered requests.
///
/// Never fails: every request yields a response, errors included.
#[derive(Clone)]
pub struct RouteService {
    route: RouteFn,
}

impl RouteService {
    pub fn new(route: RouteFn) -> Self {
        Self { route }
    }
}

impl fmt::Debug for RouteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteService").finish_non_exhaustive()
    }
}

impl Service<Request<Bytes>> for RouteService {
    type Response = Response<Bytes>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let route = self.route.clone();
        Box::pin(async move {
            let writer = DeferredWriter::new();
            route(writer.clone(), RawRequest::from_http(request)).await;
            Ok(writer.into_response())
        })
    }
}

/// A [`Binder`] collecting routes as [`RouteService`]s by path.
///
/// Useful for tests and for transports that do their own path matching.
#[derive(Debug, Default)]
pub struct ServiceTable {
    services: HashMap<String, RouteService>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<RouteService> {
        self.services.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Binder for ServiceTable {
    type Handle = ();

    fn bind(&mut self, path: &str, route: RouteFn) -> Result<(), BoxError> {
        if self.services.contains_key(path) {
            return Err(format!("path '{path}' is already bound").into());
        }
        self.services
            .insert(path.to_string(), RouteService::new(route));
        Ok(())
    }
}
