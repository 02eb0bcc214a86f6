//! Turning a completed response into a value or a structured error.

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, ErrorInfo, Result};
use crate::request::headers;
use crate::transport::Response;

/// What a call decodes a successful response into.
///
/// - `Option<T>`: `Some` when a 200 response carried a body, `None` for any
///   other success.
/// - `()`: the body is drained unread and never decoded.
pub trait FromBody: Sized {
    /// Whether the body should be read at all.
    const WANTS_BODY: bool = true;

    /// Build the value from a 200 body (`Some`) or from a success without one
    /// (`None`).
    fn from_body(body: Option<&[u8]>) -> std::result::Result<Self, serde_json::Error>;
}

impl<T: DeserializeOwned> FromBody for Option<T> {
    fn from_body(body: Option<&[u8]>) -> std::result::Result<Self, serde_json::Error> {
        body.map(serde_json::from_slice::<T>).transpose()
    }
}

impl FromBody for () {
    const WANTS_BODY: bool = false;

    fn from_body(_body: Option<&[u8]>) -> std::result::Result<Self, serde_json::Error> {
        Ok(())
    }
}

/// Normalize `response`: decode on success, [`Error::Status`] otherwise.
///
/// The body is always consumed before returning.
pub async fn call_ret<R: FromBody>(response: Response) -> Result<R> {
    let status = response.status();

    if status == StatusCode::OK && R::WANTS_BODY && response.content_length() != Some(0) {
        let body = response.bytes().await?;
        let body = (!body.is_empty()).then_some(&body[..]);
        return R::from_body(body).map_err(|source| Error::Decode {
            status: status.as_u16(),
            source,
        });
    }

    if status.is_success() {
        response.drain().await;
        return R::from_body(None).map_err(|source| Error::Decode {
            status: status.as_u16(),
            source,
        });
    }

    Err(Error::Status(response_error(response).await))
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    errno: Option<i64>,
}

/// Build the structured error for a non-success response.
///
/// Bodies are only inspected for statuses above 299 that declare JSON or
/// plain text. A body in the `{"error","key","errno"}` shape with a non-empty
/// `error` is used field by field; anything else becomes the message as is.
pub async fn response_error(response: Response) -> ErrorInfo {
    let code = response.status().as_u16();
    let reqid = response.header_str(headers::X_REQID).map(str::to_string);

    let readable = code > 299
        && response.content_length() != Some(0)
        && response
            .header_str(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with(headers::CONTENT_TYPE_JSON) || ct.starts_with(headers::CONTENT_TYPE_TEXT));

    let mut info = if readable {
        match response.bytes().await {
            Ok(body) => parse_error(code, &body),
            Err(e) => ErrorInfo::new(code, e.to_string()),
        }
    } else {
        response.drain().await;
        ErrorInfo::new(code, "")
    };

    if let Some(reqid) = reqid {
        info = info.with_reqid(reqid);
    }
    info
}

fn parse_error(code: u16, body: &[u8]) -> ErrorInfo {
    match serde_json::from_slice::<WireError>(body) {
        Ok(wire) if !wire.error.is_empty() => {
            let mut info = ErrorInfo::new(code, wire.error);
            if let Some(key) = wire.key.filter(|k| !k.is_empty()) {
                info = info.with_key(key);
            }
            if let Some(errno) = wire.errno {
                info = info.with_errno(errno);
            }
            info
        }
        _ => ErrorInfo::new(code, String::from_utf8_lossy(body)),
    }
}
