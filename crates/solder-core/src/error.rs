//! Error types for the binding engine.
//!
//! [`ResolveError`]s are raised while a chain is bound and are fatal for that
//! chain. [`TerminalError`] is the short-circuit signal that travels through a
//! running invocation.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A boxed, thread-safe error. Compatible with `tower::BoxError`.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors detected while resolving a chain.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No upstream handler, seed or generator provides a required type.
    #[error("chain '{chain}': no producer for `{required}` required by '{consumer}'")]
    MissingProducer {
        chain: String,
        required: &'static str,
        consumer: String,
    },

    /// Several equally near producers could satisfy a required type.
    #[error(
        "chain '{chain}': `{required}` required by '{consumer}' is ambiguous between {candidates:?}"
    )]
    AmbiguousProducer {
        chain: String,
        required: &'static str,
        consumer: String,
        candidates: Vec<String>,
    },

    /// A middleware returns a type no enclosing continuation asks for.
    #[error(
        "chain '{chain}': middleware '{middleware}' returns `{returned}` but no enclosing continuation consumes it"
    )]
    UnconsumedReturn {
        chain: String,
        middleware: String,
        returned: &'static str,
    },

    /// A continuation asks for a type nothing downstream returns.
    #[error(
        "chain '{chain}': continuation of '{middleware}' expects `{required}` but nothing downstream returns it"
    )]
    MissingReturn {
        chain: String,
        middleware: String,
        required: &'static str,
    },

    /// The same path was registered twice.
    #[error("path '{path}' is already registered")]
    DuplicateRegistration { path: String },

    /// A decode target field cannot be filled from its annotation.
    #[error("field `{field}` of `{target}`: {reason}")]
    UnsupportedFieldType {
        target: &'static str,
        field: &'static str,
        reason: String,
    },

    /// A decode target field carries an annotation that does not parse.
    #[error("field `{field}` of `{target}`: unsupported tag \"{tag}\": {reason}")]
    UnsupportedTag {
        target: &'static str,
        field: &'static str,
        tag: String,
        reason: String,
    },

    /// The chain is empty or its last handler is not an endpoint.
    #[error("chain '{chain}' must end with an endpoint")]
    MissingEndpoint { chain: String },

    /// An endpoint appears before the end of the chain.
    #[error("chain '{chain}': endpoint '{handler}' must be the last handler")]
    MisplacedEndpoint { chain: String, handler: String },
}

/// Result type for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Failures of the engine itself while a compiled chain runs.
///
/// These are always delivered wrapped in a [`TerminalError`].
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// A declared seed was not part of the supplied values.
    #[error("seed value `{0}` was not supplied")]
    MissingSeed(&'static str),

    /// A continuation was called after its middleware returned.
    #[error("continuation called after its middleware returned")]
    ContinuationExpired,

    /// A bound value is absent from the store.
    #[error("no value for `{0}` at this point of the chain")]
    MissingValue(&'static str),

    /// A value does not have the type its slot declares.
    #[error("value for `{0}` has an unexpected type")]
    TypeMismatch(&'static str),

    /// Downstream did not return a value the continuation asked for.
    #[error("downstream did not return `{0}`")]
    MissingReturn(&'static str),
}

/// The short-circuit signal of a running chain.
///
/// Returned as the `Err` of a fallible handler, a `TerminalError` skips every
/// handler downstream and surfaces as the `Err` of the nearest enclosing
/// [`Next::call`](crate::Next::call), or of the invocation itself.
///
/// Cloning is cheap; the wrapped error is shared.
#[derive(Clone)]
pub struct TerminalError(Arc<dyn Error + Send + Sync>);

impl TerminalError {
    /// Wraps an error as a terminal signal.
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(Arc::from(err.into()))
    }

    /// Returns the wrapped error.
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }

    /// Attempts to downcast the wrapped error.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TerminalError").field(&self.0).finish()
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for TerminalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.0)
    }
}

impl From<InvokeError> for TerminalError {
    fn from(err: InvokeError) -> Self {
        Self::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_error_displays_inner_message() {
        let err = TerminalError::new("not allowed");
        assert_eq!(err.to_string(), "not allowed");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_terminal_error_downcast() {
        let err = TerminalError::from(InvokeError::MissingSeed("Request"));
        assert!(matches!(
            err.downcast_ref::<InvokeError>(),
            Some(InvokeError::MissingSeed("Request"))
        ));
    }
}
