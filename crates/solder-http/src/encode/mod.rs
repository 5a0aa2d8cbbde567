//! Response encoding.
//!
//! An [`Encoding`] lists the encoders a route can answer with and builds the
//! response terminator: a middleware placed first in the route that waits
//! for the endpoint's `Result<M, BoxError>`, then writes status, headers and
//! body into the [`DeferredWriter`] and flushes it.
//!
//! ```rust,ignore
//! let encoding = Encoding::json()
//!     .encoder("application/xml", to_xml)
//!     .error_transform(|err| Some(json!({ "error": err.to_string() })));
//!
//! router.route("/users/{id}", [encoding.build::<User>(), endpoint(show_user)])?;
//! ```

mod negotiate;

use std::any::type_name;
use std::sync::Arc;

use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use solder_core::{BoxError, Handler, Next, middleware};
use thiserror::Error;
use tracing::{debug, warn};

use crate::request::RawRequest;
use crate::status::status_of;
use crate::writer::DeferredWriter;

/// Serializes a model, already converted to JSON, into response bytes.
pub type EncodeFn = Arc<dyn Fn(&serde_json::Value) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// Maps an error to a replacement model; `None` keeps the plain-text body.
pub type ErrorTransform = Arc<dyn Fn(&BoxError) -> Option<serde_json::Value> + Send + Sync>;

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// A response that could not be encoded. Reported with status 500.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize response model: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("encoder for `{content_type}` failed: {source}")]
    Encoder {
        content_type: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Clone)]
struct Encoder {
    content_type: HeaderValue,
    essence: String,
    encode: EncodeFn,
    on_error: Option<ErrorTransform>,
}

impl Encoder {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, EncodeError> {
        (self.encode)(value).map_err(|source| EncodeError::Encoder {
            content_type: self.essence.clone(),
            source,
        })
    }
}

fn json_encode(value: &serde_json::Value) -> Result<Vec<u8>, BoxError> {
    serde_json::to_vec(value).map_err(Into::into)
}

/// Encoder list and error hooks of a response terminator.
#[derive(Clone, Default)]
pub struct Encoding {
    encoders: Vec<Encoder>,
    offers: Vec<String>,
    on_error: Option<ErrorTransform>,
}

impl Encoding {
    /// An encoding without encoders. [`build`](Self::build) falls back to
    /// JSON if none is added.
    pub fn new() -> Self {
        Self::default()
    }

    /// An encoding answering `application/json`.
    pub fn json() -> Self {
        Self::new().encoder("application/json", json_encode)
    }

    /// A JSON encoding answering under `content_type`, e.g.
    /// `application/vnd.api+json`.
    pub fn json_as(content_type: HeaderValue) -> Self {
        Self::new().encoder_for(content_type, json_encode)
    }

    /// Adds an encoder. The first encoder added is the default when the
    /// caller states no usable preference.
    ///
    /// # Panics
    ///
    /// If `content_type` is not a valid header value.
    pub fn encoder(
        self,
        content_type: &'static str,
        encode: impl Fn(&serde_json::Value) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.encoder_for(HeaderValue::from_static(content_type), encode)
    }

    /// Adds an encoder for a content type known only at runtime.
    pub fn encoder_for(
        mut self,
        content_type: HeaderValue,
        encode: impl Fn(&serde_json::Value) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    ) -> Self {
        let essence = negotiate::essence(content_type.to_str().unwrap_or_default());
        self.encoders.push(Encoder {
            content_type,
            essence: essence.clone(),
            encode: Arc::new(encode),
            on_error: None,
        });
        self.offers.push(essence);
        self
    }

    /// Sets the error transform of the encoder added last. It takes
    /// precedence over the global one.
    pub fn encoder_error_transform(
        mut self,
        transform: impl Fn(&BoxError) -> Option<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        if let Some(encoder) = self.encoders.last_mut() {
            encoder.on_error = Some(Arc::new(transform));
        }
        self
    }

    /// Sets the error transform used by encoders without their own.
    pub fn error_transform(
        mut self,
        transform: impl Fn(&BoxError) -> Option<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(transform));
        self
    }

    /// Builds the response terminator for routes whose endpoint returns
    /// `Result<M, BoxError>`.
    pub fn build<M>(&self) -> Handler
    where
        M: Serialize + Send + 'static,
    {
        let encoding = if self.encoders.is_empty() {
            Encoding {
                on_error: self.on_error.clone(),
                ..Encoding::json()
            }
        } else {
            self.clone()
        };
        let encoding = Arc::new(encoding);

        middleware(
            move |next: Next<(), (Result<M, BoxError>,)>,
                  request: RawRequest,
                  writer: DeferredWriter| {
                let encoding = encoding.clone();
                async move {
                    let outcome = match next.call(()).await {
                        Ok((result,)) => result,
                        Err(terminal) => Err(BoxError::from(terminal)),
                    };
                    if writer.is_committed() {
                        debug!("Response already committed, skipping encode");
                        return;
                    }
                    encoding.respond(&request, &writer, outcome);
                    writer.flush();
                }
            },
        )
        .named(format!("encode {}", type_name::<M>()))
    }

    fn respond<M: Serialize>(
        &self,
        request: &RawRequest,
        writer: &DeferredWriter,
        outcome: Result<M, BoxError>,
    ) {
        let accept = request
            .headers()
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok());
        let encoder = &self.encoders[negotiate::negotiate(accept, &self.offers)];

        let encoded = outcome.and_then(|model| {
            let value = serde_json::to_value(&model).map_err(EncodeError::from)?;
            Ok(encoder.encode(&value)?)
        });
        match encoded {
            Ok(bytes) => {
                let status = writer.status().unwrap_or(StatusCode::OK);
                write(writer, status, encoder.content_type.clone(), &bytes);
            }
            Err(err) => self.respond_error(encoder, writer, &err),
        }
    }

    fn respond_error(&self, encoder: &Encoder, writer: &DeferredWriter, err: &BoxError) {
        writer.reset_body();
        let status = status_of(&**err);
        let transform = encoder.on_error.as_ref().or(self.on_error.as_ref());

        if let Some(replacement) = transform.and_then(|transform| transform(err)) {
            match encoder.encode(&replacement) {
                Ok(bytes) => {
                    write(writer, status, encoder.content_type.clone(), &bytes);
                    return;
                }
                Err(encode_err) => {
                    warn!(error = %encode_err, "Failed to encode error replacement, using plain text");
                }
            }
        }

        write(
            writer,
            status,
            HeaderValue::from_static(PLAIN_TEXT),
            err.to_string().as_bytes(),
        );
    }
}

/// Writes a plain-text error response over anything buffered so far.
pub(crate) fn write_plain(writer: &DeferredWriter, status: StatusCode, message: &str) {
    writer.reset_body();
    write(writer, status, HeaderValue::from_static(PLAIN_TEXT), message.as_bytes());
}

fn write(writer: &DeferredWriter, status: StatusCode, content_type: HeaderValue, bytes: &[u8]) {
    writer.set_status(status);
    writer.insert_header(CONTENT_TYPE, content_type);
    writer.write(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use serde_json::json;

    use crate::status::with_status;

    #[derive(Serialize)]
    struct Reply {
        n: u32,
    }

    fn request(accept: Option<&str>) -> RawRequest {
        let mut builder = Request::builder().uri("/");
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        RawRequest::from_http(builder.body(Bytes::new()).unwrap())
    }

    fn text(value: &serde_json::Value) -> Result<Vec<u8>, BoxError> {
        Ok(format!("n={}", value["n"]).into_bytes())
    }

    #[test]
    fn test_success_uses_negotiated_encoder() {
        let encoding = Encoding::json().encoder("text/x-plain", text);

        let writer = DeferredWriter::new();
        encoding.respond(&request(Some("text/x-plain")), &writer, Ok(Reply { n: 7 }));
        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/x-plain");
        assert_eq!(response.body().as_ref(), b"n=7");

        let writer = DeferredWriter::new();
        encoding.respond(&request(None), &writer, Ok(Reply { n: 7 }));
        assert_eq!(writer.into_response().body().as_ref(), br#"{"n":7}"#);
    }

    #[test]
    fn test_error_without_transform_is_plain_text() {
        let encoding = Encoding::json();
        let writer = DeferredWriter::new();
        let err = with_status(StatusCode::NOT_FOUND, "no such user");
        encoding.respond::<Reply>(&request(None), &writer, Err(err));

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], PLAIN_TEXT);
        assert_eq!(response.body().as_ref(), b"no such user");
    }

    #[test]
    fn test_encoder_transform_wins_over_global() {
        let encoding = Encoding::json()
            .encoder_error_transform(|err| Some(json!({ "encoder": err.to_string() })))
            .error_transform(|_| Some(json!({ "global": true })));
        let writer = DeferredWriter::new();
        encoding.respond::<Reply>(&request(None), &writer, Err("boom".into()));

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), br#"{"encoder":"boom"}"#);
    }

    #[test]
    fn test_failed_replacement_falls_back_to_plain_text() {
        let encoding = Encoding::new()
            .encoder("application/x-broken", |_| Err("cannot encode".into()))
            .error_transform(|_| Some(json!({ "error": true })));
        let writer = DeferredWriter::new();
        encoding.respond(&request(None), &writer, Ok(Reply { n: 1 }));

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], PLAIN_TEXT);
        assert_eq!(
            response.body().as_ref(),
            b"encoder for `application/x-broken` failed: cannot encode"
        );
    }

    #[test]
    fn test_error_replaces_buffered_body() {
        let encoding = Encoding::json();
        let writer = DeferredWriter::new();
        writer.write(b"half a page");
        encoding.respond::<Reply>(&request(None), &writer, Err("boom".into()));

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), b"boom");
    }
}
