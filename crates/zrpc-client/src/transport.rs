//! The transport seam and its optional capabilities.
//!
//! A [`Transport`] sends one request and yields one response. Two optional
//! capabilities sit on top of that:
//!
//! - [`Transport::abort_handle`]: the transport can abort a specific
//!   in-flight request by id.
//! - [`Transport::inner`]: the transport wraps another one (logging,
//!   metrics, auth decorators) and exposes it.
//!
//! [`find_abort`] walks the wrapping chain looking for the first transport
//! that can abort.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::request::{headers, Request, RequestId};

/// Upper bound on how many wrappers [`find_abort`] will look through.
pub const MAX_WRAP_DEPTH: usize = 16;

/// Sends requests over the network (or pretends to).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one request and wait for the response head.
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;

    /// The abort capability, if this transport has one.
    fn abort_handle(&self) -> Option<&dyn Abort> {
        None
    }

    /// The transport this one wraps, if any.
    fn inner(&self) -> Option<&dyn Transport> {
        None
    }
}

/// Aborts a specific in-flight request.
///
/// `abort` can race the request's own start: an id that has not been
/// registered yet must still fail as soon as its round trip begins. Once the
/// aborted call has settled, `release` is called so any state kept for the id
/// can be dropped.
pub trait Abort: Send + Sync {
    /// Abort the request with `id`.
    fn abort(&self, id: RequestId);

    /// Forget whatever was kept for `id` by [`Abort::abort`].
    fn release(&self, _id: RequestId) {}
}

/// Find an abort capability on `transport` or anything it wraps.
///
/// Stops after [`MAX_WRAP_DEPTH`] unwraps so a cyclic chain cannot hang the
/// caller.
pub fn find_abort(transport: &dyn Transport) -> Option<&dyn Abort> {
    let mut current = transport;
    for _ in 0..=MAX_WRAP_DEPTH {
        if let Some(abort) = current.abort_handle() {
            return Some(abort);
        }
        current = current.inner()?;
    }
    None
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("request aborted")]
    Aborted,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("transport task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e)
        }
    }
}

/// Streamed response body.
pub type ResponseBody = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response head plus its (not yet read) body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content_length: Option<u64>,
    body: ResponseBody,
}

impl Response {
    /// A response with a fully buffered body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: HeaderMap::new(),
            content_length: Some(body.len() as u64),
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// A buffered response with `Content-Type: application/json`.
    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static(headers::CONTENT_TYPE_JSON))
    }

    /// A response whose body arrives as a stream.
    pub fn from_stream(
        status: StatusCode,
        headers: HeaderMap,
        content_length: Option<u64>,
        body: ResponseBody,
    ) -> Self {
        Self {
            status,
            headers,
            content_length,
            body,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared body length; `None` when unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// A header value as text, if present and printable.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Read the whole body.
    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read and discard the rest of the body, then drop it.
    pub async fn drain(mut self) {
        while let Some(chunk) = self.body.next().await {
            if chunk.is_err() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
