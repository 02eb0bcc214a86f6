//! Cancellable outbound HTTP calls.
//!
//! Every call is tied to a [`Context`]: when the context is cancelled or its
//! deadline passes, the in-flight request is aborted (if the transport can
//! abort) and the call fails with the context error. Responses are normalized
//! either into a decoded value or into a structured [`ErrorInfo`].
//!
//! ```no_run
//! use std::time::Duration;
//! use zrpc_client::{Client, ClientConfig, Context, Method};
//!
//! # async fn demo() -> zrpc_client::Result<()> {
//! let client = Client::with_reqwest(&ClientConfig::default())?;
//! let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(5));
//! let ctx = ctx.with_request_id("req-1");
//!
//! let item: Option<serde_json::Value> = client
//!     .call_with_json(&ctx, Method::POST, "-H api.internal http://10.0.0.1/items", &serde_json::json!({"a": 1}))
//!     .await?;
//! # let _ = item;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod client;
pub mod error;
pub mod reqwest_transport;
pub mod request;
pub mod response;
pub mod transport;

pub use client::Client;
pub use error::{Error, ErrorInfo, Result};
pub use reqwest_transport::ReqwestTransport;
pub use request::{encode_form, headers, Body, Endpoint, Form, Request, RequestId, RequestParts};
pub use response::{call_ret, response_error, FromBody};
pub use transport::{find_abort, Abort, Response, ResponseBody, Transport, TransportError, MAX_WRAP_DEPTH};

pub use reqwest::{Method, StatusCode};
pub use zrpc_common_async::{CancelHandle, Context, ContextError};
pub use zrpc_common_config::ClientConfig;
