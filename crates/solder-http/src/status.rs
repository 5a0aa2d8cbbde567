//! Status annotations on errors.

use std::error::Error;

use http::StatusCode;
use solder_core::BoxError;

/// An error carrying an explicit HTTP status.
///
/// Displays as the wrapped error, so the plain-text fallback body is the
/// original message.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct StatusError {
    status: StatusCode,
    source: BoxError,
}

impl StatusError {
    pub fn new(status: StatusCode, source: impl Into<BoxError>) -> Self {
        Self {
            status,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

/// Wraps `err` with `status`.
///
/// ```rust,ignore
/// Err(with_status(StatusCode::NOT_FOUND, "no such user"))
/// ```
pub fn with_status(status: StatusCode, err: impl Into<BoxError>) -> BoxError {
    Box::new(StatusError::new(status, err))
}

/// The status of `err`: the first [`StatusError`] found by following
/// `source()` links, or 500.
pub fn status_of(err: &(dyn Error + 'static)) -> StatusCode {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(status) = err.downcast_ref::<StatusError>() {
            return status.status;
        }
        current = err.source();
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use solder_core::TerminalError;

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct Lookup(#[source] StatusError);

    #[test]
    fn test_status_defaults_to_500() {
        let err: BoxError = "plain".into();
        assert_eq!(status_of(&*err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_follows_sources() {
        let err = Lookup(StatusError::new(StatusCode::NOT_FOUND, "no such user"));
        assert_eq!(status_of(&err), StatusCode::NOT_FOUND);

        let terminal = TerminalError::new(with_status(StatusCode::FORBIDDEN, "denied"));
        assert_eq!(status_of(&terminal), StatusCode::FORBIDDEN);
        assert_eq!(terminal.to_string(), "denied");
    }
}
