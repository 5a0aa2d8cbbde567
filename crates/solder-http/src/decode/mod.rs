//! Request decoding.
//!
//! A `#[derive(Decode)]` struct lists how each field is read from the
//! request. When a route chain needs such a struct and nothing upstream
//! produces it, the [`DecodeGenerator`] synthesizes a fallible injector that
//! fills it:
//!
//! ```text
//! RawRequest (+ RawBody) ──▶ decode ShowUser ──▶ ShowUser
//!                                  │
//!                                  └──▶ 400 on the first failing field
//! ```
//!
//! Annotations are validated when the chain is resolved, so a typo in a tag
//! fails registration instead of the first request.

mod field;
mod generator;
mod tag;

pub use field::{Decode, Field};
pub use generator::{DECODE_TARGETS, DecodeEntry, DecodeGenerator};
pub use tag::{FieldKind, Tag, TagError};

use std::any::type_name;
use std::sync::Arc;

use http::StatusCode;
use solder_core::{BoxError, ResolveError, ResolveResult, TerminalError};
use thiserror::Error;

use crate::request::{RawBody, RawRequest};
use crate::status::StatusError;
use field::Setter;

/// Converts a request body into a JSON value model fields deserialize from.
pub type BodyDecoder =
    Arc<dyn Fn(&[u8]) -> Result<serde_json::Value, BoxError> + Send + Sync>;

/// The default body decoder: JSON.
pub fn json_body() -> BodyDecoder {
    Arc::new(|bytes: &[u8]| serde_json::from_slice(bytes).map_err(Into::into))
}

// ============================================================================
// Errors
// ============================================================================

/// A field that could not be filled. Reported with status 400.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing {kind} value `{name}`")]
    Missing { kind: FieldKind, name: String },

    #[error("invalid {kind} value `{name}`: {source}")]
    Invalid {
        kind: FieldKind,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid request body: {0}")]
    Body(#[source] BoxError),
}

// ============================================================================
// Fill plan
// ============================================================================

struct Filler<T> {
    kind: FieldKind,
    lookup: String,
    setter: Setter<T>,
}

impl<T> Filler<T> {
    fn apply(
        &self,
        target: &mut T,
        request: &RawRequest,
        body: Option<&serde_json::Value>,
    ) -> Result<(), DecodeError> {
        let invalid = |source: BoxError| DecodeError::Invalid {
            kind: self.kind,
            name: self.lookup.clone(),
            source,
        };

        match &self.setter {
            Setter::Model(set) => match body {
                Some(body) => set(target, body.clone()).map_err(invalid),
                None => Ok(()),
            },
            Setter::Multi(set) => {
                let values = self.texts(request);
                let texts: Vec<&str> = values.iter().map(String::as_str).collect();
                set(target, &texts).map_err(invalid)
            }
            Setter::Scalar { required, set } => match self.texts(request).first() {
                Some(text) => set(target, text).map_err(invalid),
                None if *required => Err(DecodeError::Missing {
                    kind: self.kind,
                    name: self.lookup.clone(),
                }),
                None => Ok(()),
            },
        }
    }

    fn texts(&self, request: &RawRequest) -> Vec<String> {
        match self.kind {
            FieldKind::Path => request
                .path_param(&self.lookup)
                .map(str::to_string)
                .into_iter()
                .collect(),
            FieldKind::Header => request
                .header_values(self.lookup.as_str())
                .into_iter()
                .map(str::to_string)
                .collect(),
            FieldKind::Query => request.query_values(&self.lookup),
            FieldKind::Model => Vec::new(),
        }
    }
}

/// The validated fillers of one decode target.
pub(crate) struct FillPlan<T> {
    fillers: Vec<Filler<T>>,
    body_decoder: BodyDecoder,
}

impl<T: Decode> FillPlan<T> {
    pub(crate) fn build(body_decoder: BodyDecoder) -> ResolveResult<Self> {
        let target = type_name::<T>();
        let mut fillers = Vec::new();

        for field in T::fields() {
            let tag = Tag::parse(field.tag).map_err(|err| ResolveError::UnsupportedTag {
                target,
                field: field.name,
                tag: field.tag.to_string(),
                reason: err.to_string(),
            })?;

            let unsupported = |reason: String| ResolveError::UnsupportedFieldType {
                target,
                field: field.name,
                reason,
            };
            match (tag.kind, &field.setter) {
                (FieldKind::Model, Setter::Model(_)) => {}
                (FieldKind::Model, setter) => {
                    return Err(unsupported(format!(
                        "a {} field cannot be filled from the body",
                        setter.shape()
                    )));
                }
                (kind, Setter::Model(_)) => {
                    return Err(unsupported(format!(
                        "a {kind} value is text and cannot fill a deserialized field"
                    )));
                }
                (FieldKind::Path, Setter::Multi(_)) => {
                    return Err(unsupported(
                        "path parameters are single-valued, `Vec` fields are not supported"
                            .to_string(),
                    ));
                }
                _ => {}
            }

            fillers.push(Filler {
                kind: tag.kind,
                lookup: tag.lookup_name(field.name).to_string(),
                setter: field.setter,
            });
        }

        Ok(Self {
            fillers,
            body_decoder,
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fillers.is_empty()
    }

    pub(crate) fn needs_body(&self) -> bool {
        self.fillers
            .iter()
            .any(|filler| filler.kind == FieldKind::Model)
    }

    /// Runs every filler in declaration order; the first failure is reported.
    ///
    /// A body that fails to decode counts as the failure of the first model
    /// field.
    pub(crate) fn fill(&self, request: &RawRequest, body: Option<&RawBody>) -> Result<T, DecodeError> {
        let mut body_error = None;
        let model = match body {
            Some(body) if self.needs_body() && !body.0.is_empty() => {
                match (self.body_decoder)(body.as_bytes()) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        body_error = Some(DecodeError::Body(err));
                        None
                    }
                }
            }
            _ => None,
        };

        let mut target = T::default();
        let mut first_error = None;
        for filler in &self.fillers {
            let result = match body_error.take() {
                Some(err) if filler.kind == FieldKind::Model => Err(err),
                pending => {
                    body_error = pending;
                    filler.apply(&mut target, request, model.as_ref())
                }
            };
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(target),
        }
    }

    pub(crate) fn decode(&self, request: &RawRequest, body: Option<&RawBody>) -> Result<T, TerminalError> {
        self.fill(request, body)
            .map_err(|err| TerminalError::new(StatusError::new(StatusCode::BAD_REQUEST, err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;

    use crate::request::PathParams;

    #[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
    struct Payload {
        title: String,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Paging {
        page: u32,
        size: Option<u32>,
    }

    impl Decode for Paging {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::scalar("page", "query", |t: &mut Self, v: u32| t.page = v),
                Field::optional("size", "query,name=per_page", |t: &mut Self, v: u32| {
                    t.size = Some(v)
                }),
            ]
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Search {
        id: u64,
        tags: Vec<String>,
        trace: Option<String>,
        paging: Paging,
        payload: Option<Payload>,
    }

    impl Decode for Search {
        fn fields() -> Vec<Field<Self>> {
            let mut fields = vec![
                Field::scalar("id", "path", |t: &mut Self, v: u64| t.id = v),
                Field::multi("tags", "query,name=tag", |t: &mut Self, v: Vec<String>| {
                    t.tags = v
                }),
                Field::optional("trace", "header,name=x-trace", |t: &mut Self, v: String| {
                    t.trace = Some(v)
                }),
                Field::model("payload", "model", |t: &mut Self, v: Payload| {
                    t.payload = Some(v)
                }),
            ];
            fields.extend(Field::flatten(|t: &mut Self| &mut t.paging));
            fields
        }
    }

    fn request(uri: &str, id: &str, body: &'static [u8]) -> (RawRequest, RawBody) {
        let mut request = Request::builder()
            .uri(uri)
            .header("X-Trace", "abc")
            .body(Bytes::from_static(body))
            .unwrap();
        request
            .extensions_mut()
            .insert(PathParams::from_iter([("id", id)]));
        let request = RawRequest::from_http(request);
        let body = RawBody(request.body().clone());
        (request, body)
    }

    #[test]
    fn test_fill_every_kind() {
        let plan = FillPlan::<Search>::build(json_body()).unwrap();
        assert!(plan.needs_body());

        let (req, body) = request(
            "/search/9?tag=a&page=3&tag=b&per_page=20",
            "9",
            br#"{"title":"hello"}"#,
        );
        let search = plan.fill(&req, Some(&body)).unwrap();
        assert_eq!(
            search,
            Search {
                id: 9,
                tags: vec!["a".into(), "b".into()],
                trace: Some("abc".into()),
                paging: Paging {
                    page: 3,
                    size: Some(20)
                },
                payload: Some(Payload {
                    title: "hello".into()
                }),
            }
        );
    }

    #[test]
    fn test_first_error_wins() {
        let plan = FillPlan::<Search>::build(json_body()).unwrap();
        // `id` fails first, `page` is missing afterwards.
        let (req, body) = request("/search/x", "x", b"");
        match plan.fill(&req, Some(&body)) {
            Err(DecodeError::Invalid { kind, name, .. }) => {
                assert_eq!(kind, FieldKind::Path);
                assert_eq!(name, "id");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_body_skips_model_fields() {
        let plan = FillPlan::<Search>::build(json_body()).unwrap();
        let (req, body) = request("/search/1?page=1", "1", b"");
        let search = plan.fill(&req, Some(&body)).unwrap();
        assert_eq!(search.payload, None);
    }

    #[test]
    fn test_malformed_body() {
        let plan = FillPlan::<Search>::build(json_body()).unwrap();
        let (req, body) = request("/search/1?page=1", "1", b"{not json");
        assert!(matches!(
            plan.fill(&req, Some(&body)),
            Err(DecodeError::Body(_))
        ));
    }

    #[test]
    fn test_path_error_before_malformed_body() {
        let plan = FillPlan::<Search>::build(json_body()).unwrap();
        let (req, body) = request("/search/x?page=1", "x", b"{bad");
        match plan.fill(&req, Some(&body)) {
            Err(DecodeError::Invalid { kind, name, .. }) => {
                assert_eq!(kind, FieldKind::Path);
                assert_eq!(name, "id");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[derive(Debug, Clone, Default)]
    struct BodyFirst {
        payload: Option<Payload>,
        page: u32,
    }

    impl Decode for BodyFirst {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::model("payload", "model", |t: &mut Self, v: Payload| {
                    t.payload = Some(v)
                }),
                Field::scalar("page", "query", |t: &mut Self, v: u32| t.page = v),
            ]
        }
    }

    #[test]
    fn test_malformed_body_before_missing_query() {
        let plan = FillPlan::<BodyFirst>::build(json_body()).unwrap();
        let (req, body) = request("/", "", b"{bad");
        assert!(matches!(
            plan.fill(&req, Some(&body)),
            Err(DecodeError::Body(_))
        ));
    }

    #[test]
    fn test_decode_failure_is_bad_request() {
        let plan = FillPlan::<Paging>::build(json_body()).unwrap();
        let (req, _) = request("/", "", b"");
        let err = plan.decode(&req, None).unwrap_err();
        assert_eq!(crate::status_of(&err), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "missing query value `page`");
    }

    #[derive(Debug, Clone, Default)]
    struct BadTag {
        n: u32,
    }

    impl Decode for BadTag {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::scalar("n", "cookie", |t: &mut Self, v: u32| t.n = v)]
        }
    }

    #[derive(Debug, Clone, Default)]
    struct PathList {
        ids: Vec<u32>,
    }

    impl Decode for PathList {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::multi("ids", "path", |t: &mut Self, v: Vec<u32>| t.ids = v)]
        }
    }

    #[test]
    fn test_unsupported_annotations() {
        assert!(matches!(
            FillPlan::<BadTag>::build(json_body()),
            Err(ResolveError::UnsupportedTag { field: "n", .. })
        ));
        assert!(matches!(
            FillPlan::<PathList>::build(json_body()),
            Err(ResolveError::UnsupportedFieldType { field: "ids", .. })
        ));
    }
}
