//! The outbound call client.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::Serialize;
use tracing::Instrument;
use zrpc_common_async::Context;
use zrpc_common_config::ClientConfig;
use zrpc_common_log::spans::{self, Timer};

use crate::bridge;
use crate::error::{Error, Result};
use crate::request::{append_query, encode_form, headers, Body, Form, Request};
use crate::response::{call_ret, FromBody};
use crate::reqwest_transport::ReqwestTransport;
use crate::transport::{Response, Transport};

/// Issues HTTP calls tied to a cancellation [`Context`].
///
/// Holds only a shared transport and the default `User-Agent`; cloning is
/// cheap and clones may be used from any number of tasks.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    user_agent: HeaderValue,
}

impl Client {
    /// A client over `transport`, configured by `config`.
    pub fn new(transport: impl Transport, config: &ClientConfig) -> Result<Self> {
        Self::from_shared(Arc::new(transport), config)
    }

    /// A client over an already shared transport.
    pub fn from_shared(transport: Arc<dyn Transport>, config: &ClientConfig) -> Result<Self> {
        let user_agent = HeaderValue::try_from(config.user_agent.as_str()).map_err(|_| Error::InvalidHeader {
            name: "User-Agent".to_string(),
            value: config.user_agent.clone(),
        })?;
        Ok(Self {
            transport,
            user_agent,
        })
    }

    /// A client over [`ReqwestTransport`].
    pub fn with_reqwest(config: &ClientConfig) -> Result<Self> {
        Self::new(ReqwestTransport::new(config)?, config)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Inject context headers and send `request`, racing `ctx`.
    pub async fn execute(&self, ctx: &Context, mut request: Request) -> Result<Response> {
        request.inject_headers(ctx, &self.user_agent);

        let span = spans::call_span(request.method().as_str(), request.url().as_str());
        let timer = Timer::start("rpc_call");
        let result = bridge::execute(&self.transport, ctx, request)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(response) => spans::record_status(&span, response.status().as_u16()),
            Err(e) => {
                spans::record_error(&span, e);
                tracing::debug!(parent: &span, error = %e, "call failed");
            }
        }
        timer.finish(&span);
        result
    }

    /// Send a bodyless request.
    pub async fn do_request(&self, ctx: &Context, method: Method, endpoint: &str) -> Result<Response> {
        let request = Request::new(method, endpoint, Body::Empty)?;
        self.execute(ctx, request).await
    }

    /// Send `body` with an explicit content type and declared length.
    pub async fn do_request_with(
        &self,
        ctx: &Context,
        method: Method,
        endpoint: &str,
        content_type: &str,
        body: impl Into<Body>,
        content_length: u64,
    ) -> Result<Response> {
        let mut request = Request::new(method, endpoint, body)?;
        request.set_payload_info(content_type, content_length)?;
        self.execute(ctx, request).await
    }

    /// Send form fields: in the query string for GET, HEAD and DELETE, as a
    /// urlencoded body otherwise.
    pub async fn do_request_with_form(
        &self,
        ctx: &Context,
        method: Method,
        endpoint: &str,
        form: &Form,
    ) -> Result<Response> {
        let encoded = encode_form(form);
        if matches!(method, Method::GET | Method::HEAD | Method::DELETE) {
            return self.do_request(ctx, method, &append_query(endpoint, &encoded)).await;
        }
        let length = encoded.len() as u64;
        self.do_request_with(ctx, method, endpoint, headers::CONTENT_TYPE_FORM, encoded, length)
            .await
    }

    /// Send `payload` as a JSON body. Serialization failures are reported
    /// before anything is sent.
    pub async fn do_request_with_json<P>(
        &self,
        ctx: &Context,
        method: Method,
        endpoint: &str,
        payload: &P,
    ) -> Result<Response>
    where
        P: Serialize + ?Sized,
    {
        let encoded = Bytes::from(serde_json::to_vec(payload).map_err(Error::Serialization)?);
        let length = encoded.len() as u64;
        self.do_request_with(ctx, method, endpoint, headers::CONTENT_TYPE_JSON, encoded, length)
            .await
    }

    /// Bodyless call, normalized into `R`.
    pub async fn call<R: FromBody>(&self, ctx: &Context, method: Method, endpoint: &str) -> Result<R> {
        let response = self
            .do_request_with(ctx, method, endpoint, headers::CONTENT_TYPE_FORM, Body::Empty, 0)
            .await?;
        call_ret(response).await
    }

    /// Raw-body call, normalized into `R`.
    pub async fn call_with<R: FromBody>(
        &self,
        ctx: &Context,
        method: Method,
        endpoint: &str,
        content_type: &str,
        body: impl Into<Body>,
        content_length: u64,
    ) -> Result<R> {
        let response = self
            .do_request_with(ctx, method, endpoint, content_type, body, content_length)
            .await?;
        call_ret(response).await
    }

    /// Form call, normalized into `R`.
    pub async fn call_with_form<R: FromBody>(
        &self,
        ctx: &Context,
        method: Method,
        endpoint: &str,
        form: &Form,
    ) -> Result<R> {
        let response = self.do_request_with_form(ctx, method, endpoint, form).await?;
        call_ret(response).await
    }

    /// JSON call, normalized into `R`.
    pub async fn call_with_json<R, P>(&self, ctx: &Context, method: Method, endpoint: &str, payload: &P) -> Result<R>
    where
        R: FromBody,
        P: Serialize + ?Sized,
    {
        let response = self.do_request_with_json(ctx, method, endpoint, payload).await?;
        call_ret(response).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}
