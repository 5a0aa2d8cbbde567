//! Request-side seeds.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::AsHeaderName;
use http::request::Parts;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use solder_core::{Handler, TerminalError, fallible};

use crate::status::StatusError;

// ============================================================================
// Path parameters
// ============================================================================

/// Path parameters captured by the external router, in capture order.
///
/// Insert one into the request extensions before converting the request with
/// [`RawRequest::from_http`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Returns the first value captured under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// RawRequest
// ============================================================================

struct Inner {
    parts: Parts,
    body: Bytes,
    params: PathParams,
}

/// The inbound request, seeded into every route chain.
///
/// Cheap to clone. The body is buffered by the transport before the chain
/// runs.
#[derive(Clone)]
pub struct RawRequest(Arc<Inner>);

impl RawRequest {
    pub fn new(parts: Parts, body: Bytes, params: PathParams) -> Self {
        Self(Arc::new(Inner {
            parts,
            body,
            params,
        }))
    }

    /// Converts a buffered request, taking [`PathParams`] out of its
    /// extensions when present.
    pub fn from_http(request: Request<Bytes>) -> Self {
        let (mut parts, body) = request.into_parts();
        let params = parts.extensions.remove::<PathParams>().unwrap_or_default();
        Self::new(parts, body, params)
    }

    pub fn method(&self) -> &Method {
        &self.0.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.0.parts.uri
    }

    pub fn path(&self) -> &str {
        self.0.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.0.parts.headers
    }

    pub fn path_params(&self) -> &PathParams {
        &self.0.params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.0.params.get(name)
    }

    /// Every value of a header, in arrival order. Values that are not valid
    /// visible ASCII are skipped.
    pub fn header_values(&self, name: impl AsHeaderName) -> Vec<&str> {
        self.0
            .parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Every value of a query parameter, percent-decoded, in order.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        let Some(query) = self.0.parts.uri.query() else {
            return Vec::new();
        };
        form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    /// The buffered body as received.
    pub fn body(&self) -> &Bytes {
        &self.0.body
    }
}

impl fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("params", &self.0.params)
            .field("body_len", &self.0.body.len())
            .finish()
    }
}

// ============================================================================
// RawBody
// ============================================================================

/// The request body, checked against the configured size limit.
#[derive(Debug, Clone, Default)]
pub struct RawBody(pub Bytes);

impl RawBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Body too large for the configured limit.
#[derive(Debug, thiserror::Error)]
#[error("request body of {size} bytes exceeds the limit of {limit} bytes")]
pub struct BodyTooLarge {
    pub size: usize,
    pub limit: usize,
}

/// The injector producing [`RawBody`], short-circuiting with status 413 when
/// the body exceeds `limit` bytes.
///
/// Route chains generate it in front of the first handler that needs the
/// body.
pub fn read_body(limit: usize) -> Handler {
    fallible(move |request: RawRequest| async move {
        let body = request.body();
        if body.len() > limit {
            let err = BodyTooLarge {
                size: body.len(),
                limit,
            };
            return Err(TerminalError::new(StatusError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                err,
            )));
        }
        Ok(RawBody(body.clone()))
    })
    .named("read_body")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> RawRequest {
        let request = Request::builder()
            .uri(uri)
            .header("x-trace", "a")
            .header("x-trace", "b")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        RawRequest::from_http(request)
    }

    #[test]
    fn test_query_values_are_decoded_in_order() {
        let req = request("/items?tag=a%20b&page=2&tag=c");
        assert_eq!(req.query_values("tag"), vec!["a b", "c"]);
        assert_eq!(req.query_values("page"), vec!["2"]);
        assert!(req.query_values("missing").is_empty());
    }

    #[test]
    fn test_header_values_are_case_insensitive() {
        let req = request("/");
        assert_eq!(req.header_values("X-Trace"), vec!["a", "b"]);
    }

    #[test]
    fn test_path_params_from_extensions() {
        let mut request = Request::builder().uri("/users/7").body(Bytes::new()).unwrap();
        request
            .extensions_mut()
            .insert(PathParams::from_iter([("id", "7")]));
        let req = RawRequest::from_http(request);
        assert_eq!(req.path_param("id"), Some("7"));
        assert_eq!(req.path(), "/users/7");
    }
}
