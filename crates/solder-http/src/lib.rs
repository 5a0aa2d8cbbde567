//! # Solder HTTP
//!
//! The HTTP boundary of the Solder framework.
//!
//! - **Seeds**: every route chain starts with a [`RawRequest`] and a
//!   [`DeferredWriter`]. A [`read_body`] injector is generated in front of
//!   the first handler that needs the request body as a [`RawBody`].
//! - **Decoding**: `#[derive(Decode)]` structs are produced on demand by the
//!   [`DecodeGenerator`] from path parameters, headers, the query string and
//!   the body.
//! - **Encoding**: an [`Encoding`] builds the response terminator middleware
//!   that negotiates a content type, maps errors to statuses and flushes the
//!   writer.
//! - **Routing**: a [`Router`] resolves one chain per path and hands the
//!   compiled routes to a [`Binder`] when started.
//!
//! ## Example
//!
//! ```rust,ignore
//! use solder_core::{BoxError, endpoint};
//! use solder_http::{Decode, Encoding, Router, ServiceTable};
//!
//! #[derive(Clone, Default, Decode)]
//! struct Page {
//!     #[solder("query,name=n")]
//!     n: u32,
//! }
//!
//! #[derive(serde::Serialize)]
//! struct Reply {
//!     n: u32,
//! }
//!
//! let mut router = Router::new();
//! router.route(
//!     "/page",
//!     [
//!         Encoding::json().build::<Reply>(),
//!         endpoint(|page: Page| async move { Ok::<_, BoxError>(Reply { n: page.n }) }),
//!     ],
//! )?;
//!
//! let mut table = ServiceTable::new();
//! router.start(&mut table).await?;
//! ```

extern crate self as solder_http;

pub mod decode;
pub mod encode;
pub mod request;
pub mod router;
pub mod service;
pub mod status;
pub mod writer;

#[cfg(feature = "axum")]
pub mod axum;

pub use decode::{
    BodyDecoder, DECODE_TARGETS, Decode, DecodeEntry, DecodeError, DecodeGenerator, Field,
    FieldKind, Tag, TagError, json_body,
};
pub use encode::{EncodeError, EncodeFn, Encoding, ErrorTransform};
pub use request::{BodyTooLarge, PathParams, RawBody, RawRequest, read_body};
pub use router::{
    BindError, Binder, DEFAULT_MAX_BODY_BYTES, RouteFn, Router, RouterSettings, dispatcher,
};
pub use service::{RouteService, ServiceTable};
pub use status::{StatusError, status_of, with_status};
pub use writer::DeferredWriter;

#[cfg(feature = "axum")]
pub use crate::axum::AxumBinder;

/// Derive macro for [`Decode`].
pub use solder_macros::Decode;

#[doc(hidden)]
pub mod __private {
    pub use linkme;
}
