//! Request descriptors and the endpoint syntax.
//!
//! An endpoint is either a plain absolute URL or `-H <host> <url>`, which
//! sends the request to `<url>` while presenting `<host>` as the `Host`
//! header.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use url::Url;
use uuid::Uuid;
use zrpc_common_async::Context;

use crate::error::{Error, Result};

/// Header names and content types used by the call layer.
pub mod headers {
    pub const X_REQID: &str = "x-reqid";
    pub const X_USER: &str = "x-user";
    pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const CONTENT_TYPE_TEXT: &str = "text/plain";
}

const HOST_FLAG: &str = "-H";

/// Form fields: name to ordered values. Encoded in key order.
pub type Form = BTreeMap<String, Vec<String>>;

/// Encode form fields as `application/x-www-form-urlencoded`.
pub fn encode_form(form: &Form) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, values) in form {
        for value in values {
            serializer.append_pair(name, value);
        }
    }
    serializer.finish()
}

/// Append an encoded query to an endpoint, with `?` or `&` as needed.
pub(crate) fn append_query(endpoint: &str, query: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}{query}")
}

/// Identifies one dispatched request, so a transport can abort it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A streamed request body. `Sync` so transports can hand it to hyper.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Request payload.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    /// The buffered bytes, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[] as &[u8]),
            Self::Bytes(bytes) => Some(bytes.as_ref()),
            Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(text.into())
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// A parsed endpoint: the URL to dial and an optional `Host` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub host: Option<String>,
}

impl Endpoint {
    /// Parse a plain URL or `-H <host> <url>`.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let (host, raw_url) = match endpoint.strip_prefix(HOST_FLAG) {
            Some(rest) => {
                let rest = rest.trim_start_matches(char::is_whitespace);
                let pos = rest
                    .find(char::is_whitespace)
                    .filter(|&pos| pos > 0)
                    .ok_or_else(|| Error::invalid_endpoint(endpoint, "missing host after -H"))?;
                let host = &rest[..pos];
                if HeaderValue::from_str(host).is_err() {
                    return Err(Error::invalid_endpoint(endpoint, "host is not a valid header value"));
                }
                let url = rest[pos..].trim_start_matches(char::is_whitespace);
                (Some(host.to_string()), url)
            }
            None => (None, endpoint),
        };

        let url = Url::parse(raw_url).map_err(|e| Error::invalid_endpoint(endpoint, e.to_string()))?;
        Ok(Self { url, host })
    }
}

/// Everything a transport needs to send one request.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    method: Method,
    url: Url,
    host: Option<String>,
    headers: HeaderMap,
    body: Body,
    content_length: Option<u64>,
}

impl Request {
    /// Build a request from an endpoint string. No I/O happens here.
    pub fn new(method: Method, endpoint: &str, body: impl Into<Body>) -> Result<Self> {
        let Endpoint { url, host } = Endpoint::parse(endpoint)?;
        Ok(Self {
            id: RequestId::new(),
            method,
            url,
            host,
            headers: HeaderMap::new(),
            body: body.into(),
            content_length: None,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `Host` override, when the endpoint used `-H`.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Declared body length, sent as `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    /// Replace every value of `name` with `values`, in order.
    pub fn set_header_values<I>(&mut self, name: HeaderName, values: I)
    where
        I: IntoIterator<Item = HeaderValue>,
    {
        self.headers.remove(&name);
        for value in values {
            self.headers.append(name.clone(), value);
        }
    }

    /// Apply string header overrides. Each listed name loses its previous
    /// values.
    pub fn set_headers<'a, I>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        for (name, values) in overrides {
            let header = HeaderName::try_from(name).map_err(|_| invalid_header(name, ""))?;
            let values = values
                .iter()
                .map(|value| HeaderValue::try_from(value.as_str()).map_err(|_| invalid_header(name, value)))
                .collect::<Result<Vec<_>>>()?;
            self.set_header_values(header, values);
        }
        Ok(())
    }

    /// Set a single header value, parsing both parts.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let header = HeaderName::try_from(name).map_err(|_| invalid_header(name, value))?;
        let value = HeaderValue::try_from(value).map_err(|_| invalid_header(name, value))?;
        self.headers.insert(header, value);
        Ok(())
    }

    /// Set `Content-Type` and the declared length together.
    pub(crate) fn set_payload_info(&mut self, content_type: &str, length: u64) -> Result<()> {
        self.set_header(CONTENT_TYPE.as_str(), content_type)?;
        self.set_content_length(length);
        Ok(())
    }

    /// Copy the context's correlation values into `X-Reqid` / `X-User`, and
    /// fill in `User-Agent` if the caller left it unset.
    pub(crate) fn inject_headers(&mut self, ctx: &Context, user_agent: &HeaderValue) {
        let correlated = [
            (headers::X_REQID, ctx.request_id()),
            (headers::X_USER, ctx.user()),
        ];
        for (name, value) in correlated {
            let Some(value) = value else { continue };
            match HeaderValue::try_from(value) {
                Ok(value) => {
                    self.headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => tracing::warn!(header = name, "dropping context value that is not a valid header"),
            }
        }

        if !self.headers.contains_key(USER_AGENT) {
            self.headers.insert(USER_AGENT, user_agent.clone());
        }
    }

    /// Take the body out, leaving the rest of the request intact.
    pub fn into_parts(self) -> RequestParts {
        RequestParts {
            id: self.id,
            method: self.method,
            url: self.url,
            host: self.host,
            headers: self.headers,
            body: self.body,
            content_length: self.content_length,
        }
    }
}

/// The owned pieces of a [`Request`], for transports.
#[derive(Debug)]
pub struct RequestParts {
    pub id: RequestId,
    pub method: Method,
    pub url: Url,
    pub host: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
    pub content_length: Option<u64>,
}

fn invalid_header(name: &str, value: &str) -> Error {
    Error::InvalidHeader {
        name: name.to_string(),
        value: value.to_string(),
    }
}
