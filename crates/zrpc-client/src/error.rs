//! Error types for outbound calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use zrpc_common_async::ContextError;

use crate::transport::TransportError;

/// Everything a call can fail with.
///
/// Nothing here is retried; the caller branches on the variant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The endpoint string could not be turned into a request.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A header name or value was not valid HTTP.
    #[error("invalid header {name}: {value:?}")]
    InvalidHeader { name: String, value: String },

    /// The request payload could not be encoded as JSON.
    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The cancellation context was done before the call completed.
    #[error(transparent)]
    Cancelled(#[from] ContextError),

    /// The server answered with a non-success status.
    #[error(transparent)]
    Status(#[from] ErrorInfo),

    /// A successful response body did not decode into the requested type.
    #[error("failed to decode response body (status {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn invalid_endpoint(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status code, for errors that carry one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(info) => Some(info.status_code()),
            Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the call lost the race against its cancellation context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The structured server error, if this is one.
    pub fn as_status(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Status(info) => Some(info),
            _ => None,
        }
    }
}

/// Normalized representation of a non-success response.
///
/// Serializes to the wire shape `{"error", "key", "errno", "reqid", "code"}`
/// with empty fields omitted (except `code`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "error", default, skip_serializing_if = "String::is_empty")]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reqid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    errno: Option<i64>,
    code: u16,
}

impl ErrorInfo {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_errno(mut self, errno: i64) -> Self {
        self.errno = Some(errno);
        self
    }

    pub fn with_reqid(mut self, reqid: impl Into<String>) -> Self {
        self.reqid = Some(reqid.into());
        self
    }

    /// Human-readable message. May be empty when the server sent no body.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Correlation id echoed by the server in `X-Reqid`.
    pub fn reqid(&self) -> Option<&str> {
        self.reqid.as_deref()
    }

    /// Application-level error number.
    pub fn errno(&self) -> Option<i64> {
        self.errno
    }

    /// HTTP status code of the failed response.
    pub fn status_code(&self) -> u16 {
        self.code
    }

    /// `(code, errno, key, message)` in one go.
    pub fn rpc_error(&self) -> (u16, Option<i64>, Option<&str>, &str) {
        (self.code, self.errno, self.key(), self.message())
    }

    /// JSON rendering for logs.
    pub fn error_detail(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "HTTP status {}", self.code)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for ErrorInfo {}

/// Result alias for call operations.
pub type Result<T> = std::result::Result<T, Error>;
