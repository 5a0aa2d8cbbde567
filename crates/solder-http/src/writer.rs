//! Buffered response sink.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use parking_lot::Mutex;

#[derive(Default)]
struct State {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    flushed: bool,
}

/// The response sink of one request, seeded into every route chain.
///
/// Handlers write into a buffer; nothing reaches the transport until the
/// request completes. [`flush`](Self::flush) commits the response: the
/// encode terminator leaves a committed writer untouched, so a handler that
/// writes and flushes a response itself takes precedence.
///
/// Clones share the same buffer. A writer belongs to a single invocation and
/// is written by one handler at a time.
#[derive(Clone, Default)]
pub struct DeferredWriter(Arc<Mutex<State>>);

impl DeferredWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.0.lock().status = Some(status);
    }

    /// The status set so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.0.lock().status
    }

    /// Sets a header, replacing previous values.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.0.lock().headers.insert(name, value);
    }

    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.0.lock().headers.append(name, value);
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.0.lock().headers.get(name).cloned()
    }

    /// Appends to the body buffer.
    pub fn write(&self, bytes: &[u8]) {
        self.0.lock().body.extend_from_slice(bytes);
    }

    /// Drops the buffered body. Status and headers are kept.
    pub fn reset_body(&self) {
        self.0.lock().body.clear();
    }

    /// Commits the response. Returns `false` if it was already committed.
    pub fn flush(&self) -> bool {
        let mut state = self.0.lock();
        if state.flushed {
            return false;
        }
        state.flushed = true;
        true
    }

    pub fn is_committed(&self) -> bool {
        self.0.lock().flushed
    }

    /// Builds the response from the buffered state. The status defaults to
    /// 200.
    pub fn into_response(&self) -> Response<Bytes> {
        let mut state = self.0.lock();
        let mut response = Response::new(std::mem::take(&mut state.body).freeze());
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut state.headers);
        response
    }
}

impl fmt::Debug for DeferredWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.lock();
        f.debug_struct("DeferredWriter")
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("body_len", &state.body.len())
            .field("flushed", &state.flushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    #[test]
    fn test_flush_commits_once() {
        let writer = DeferredWriter::new();
        assert!(!writer.is_committed());
        assert!(writer.flush());
        assert!(!writer.flush());
        assert!(writer.is_committed());
    }

    #[test]
    fn test_clones_share_the_buffer() {
        let writer = DeferredWriter::new();
        let other = writer.clone();
        other.set_status(StatusCode::CREATED);
        other.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        writer.write(b"hello ");
        other.write(b"world");

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.body().as_ref(), b"hello world");
    }

    #[test]
    fn test_reset_body_keeps_status() {
        let writer = DeferredWriter::new();
        writer.set_status(StatusCode::ACCEPTED);
        writer.write(b"partial");
        writer.reset_body();
        writer.write(b"done");

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"done");
    }
}
