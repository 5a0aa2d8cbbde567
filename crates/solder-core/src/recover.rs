//! Panic recovery.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use crate::error::TerminalError;
use crate::handler::{Handler, Next, try_middleware};

/// A panic caught by [`recover`].
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
    backtrace: Arc<Backtrace>,
}

impl PanicError {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self {
            message,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The backtrace captured when the panic was recovered.
    ///
    /// Only populated when backtraces are enabled through `RUST_BACKTRACE` or
    /// `RUST_LIB_BACKTRACE`.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.message)
    }
}

impl Error for PanicError {}

/// A middleware converting panics downstream of it into a [`TerminalError`]
/// wrapping a [`PanicError`].
///
/// Declare it right after the response terminator so a panicking handler
/// still produces a response:
///
/// ```rust,ignore
/// router.route("/", [encoding.build::<Reply>(), recover(), endpoint(handler)])?;
/// ```
///
/// Downstream returns pass through unchanged.
pub fn recover() -> Handler {
    try_middleware(|next: Next<(), ()>| async move {
        match AssertUnwindSafe(next.call(())).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let panic = PanicError::from_payload(payload);
                error!(message = %panic.message, "Recovered from handler panic");
                Err(TerminalError::new(panic))
            }
        }
    })
    .named("recover")
}
