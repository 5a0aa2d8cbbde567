//! Procedural macros for the Solder framework.
//!
//! This crate provides:
//!
//! - `#[derive(Decode)]` - Describes how a request struct is filled from the
//!   body, path parameters, headers and query string, and registers it with the
//!   decode generator.
//!
//! # Decode Derive Macro
//!
//! ```rust,ignore
//! use solder_http::Decode;
//!
//! #[derive(Clone, Default, Decode)]
//! pub struct ShowUser {
//!     #[solder("path")]
//!     pub id: u64,
//!     #[solder("query,name=v")]
//!     pub verbose: Option<bool>,
//!     #[solder("header,name=x-trace")]
//!     pub traces: Vec<String>,
//! }
//! ```
//!
//! Any handler taking `ShowUser` (or `Arc<ShowUser>`) as an input gets a
//! producer synthesized for it when its chain is resolved.

mod decode;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `solder_http::Decode` for a struct with named fields.
///
/// # Attributes
///
/// - `#[solder("kind[,name=...]")]` on a field - `kind` is one of `model`,
///   `path`, `header` or `query`. `name` overrides the lookup name, which
///   defaults to the field name.
/// - `#[solder(flatten)]` on a field - Decodes the fields of a nested
///   `Decode` struct as if they were declared inline.
/// - `#[solder(crate = "...")]` on the struct - Path of the `solder_http`
///   crate (default: `::solder_http`).
///
/// Fields without an attribute keep their `Default` value.
///
/// # Field Shapes
///
/// | Type | Meaning |
/// |------|---------|
/// | `Vec<T>` | every value of a repeated header or query parameter |
/// | `Option<T>` | an optional value |
/// | `T` | a required value |
///
/// Text values are parsed with `FromStr`; `model` fields are deserialized
/// from the request body with serde.
#[proc_macro_derive(Decode, attributes(solder))]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match decode::derive_decode(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
