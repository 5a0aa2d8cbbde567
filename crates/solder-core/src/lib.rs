//! # Solder Core
//!
//! The binding engine of the Solder framework.
//!
//! Handlers are declared in isolation and wired together purely by the types
//! they consume and produce. A [`Chain`] is an ordered list of handlers; the
//! resolver turns it into a [`Plan`] and the plan compiles into a
//! [`Compiled`] pipeline with a run-once `init` and a per-call `invoke`.
//!
//! ## Handler Variants
//!
//! | Constructor | Variant | Runs |
//! |-------------|---------|------|
//! | [`provide`], [`provide_all`] | (Static)Injector | once per plan or once per call |
//! | [`fallible`] | FallibleInjector | may short-circuit with [`TerminalError`] |
//! | [`middleware`], [`try_middleware`] | Middleware | wraps downstream through [`Next`] |
//! | [`endpoint`], [`try_endpoint`] | Endpoint | last handler of every chain |
//!
//! ## Example
//!
//! ```rust,ignore
//! use solder_core::*;
//!
//! #[derive(Clone)]
//! struct Greeting(&'static str);
//!
//! let compiled = Chain::new("hello")
//!     .seed::<String>()
//!     .with(provide(|| async { Greeting("hello") }))
//!     .with(endpoint(|g: Greeting, who: String| async move { format!("{} {who}", g.0) }))
//!     .returns::<String>()
//!     .resolve()?
//!     .compile();
//!
//! compiled.init().await;
//! let (reply,) = compiled
//!     .invoke_as::<(String,)>(ValueCollection::new().with("world".to_string()))
//!     .await?;
//! ```
//!
//! Resolution errors ([`ResolveError`]) surface while the chain is being
//! registered; invocation never sees them.

pub mod chain;
pub mod collection;
pub mod error;
pub mod handler;
pub mod key;
pub mod recover;
pub mod resolve;
pub mod runtime;
pub mod values;

pub use chain::{Chain, Generator};
pub use collection::{Returns, ValueCollection};
pub use error::{BoxError, InvokeError, ResolveError, ResolveResult, TerminalError};
pub use handler::{
    Handler, HandlerFn, Kind, MiddlewareFn, Next, endpoint, fallible, middleware, provide,
    provide_all, try_endpoint, try_middleware,
};
pub use key::{TypeKey, Value};
pub use recover::{PanicError, recover};
pub use resolve::{Class, Plan, PlanEntry, Summary};
pub use runtime::Compiled;
pub use values::{Provided, Returned};
