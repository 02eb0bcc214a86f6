//! [`Transport`] over `reqwest`, with per-request abort.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, CONTENT_LENGTH, HOST};
use reqwest::ClientBuilder;
use tokio::sync::oneshot;
use zrpc_common_config::ClientConfig;

use crate::request::{Body, Request, RequestId};
use crate::transport::{Abort, Response, Transport, TransportError};

/// Sends requests with a shared `reqwest::Client`.
///
/// Every in-flight request registers an abort signal under its id;
/// [`Abort::abort`] fires it and the pending `round_trip` resolves with
/// [`TransportError::Aborted`]. Aborting an id that has not registered yet
/// leaves a marker, and that request fails as soon as it starts.
pub struct ReqwestTransport {
    client: reqwest::Client,
    inflight: Mutex<HashMap<RequestId, Slot>>,
}

enum Slot {
    InFlight(oneshot::Sender<()>),
    Aborted,
}

impl ReqwestTransport {
    /// Build a transport from client settings.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .gzip(config.gzip);

        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(TransportError::ClientBuild)?;
        Ok(Self::from_client(client))
    }

    /// Wrap an already configured `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of ids currently tracked, in flight or aborted early.
    pub fn inflight(&self) -> usize {
        self.inflight.lock().len()
    }

    fn build(&self, request: Request) -> reqwest::RequestBuilder {
        let parts = request.into_parts();
        let mut headers = parts.headers;

        if let Some(host) = parts.host.and_then(|h| HeaderValue::try_from(h).ok()) {
            headers.insert(HOST, host);
        }
        if let Some(length) = parts.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }

        let builder = self.client.request(parts.method, parts.url).headers(headers);
        match parts.body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        }
    }
}

/// Removes the abort registration when a round trip ends, however it ends.
struct Registration<'a> {
    inflight: &'a Mutex<HashMap<RequestId, Slot>>,
    id: RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.id);
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        let id = request.id();
        let (abort_tx, abort_rx) = oneshot::channel();
        {
            let mut inflight = self.inflight.lock();
            if let Some(Slot::Aborted) = inflight.remove(&id) {
                return Err(TransportError::Aborted);
            }
            inflight.insert(id, Slot::InFlight(abort_tx));
        }
        let _registration = Registration {
            inflight: &self.inflight,
            id,
        };

        let pending = self.build(request).send();

        let response = tokio::select! {
            result = pending => result?,
            _ = abort_rx => return Err(TransportError::Aborted),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let content_length = response.content_length();
        let body = response.bytes_stream().map_err(TransportError::from).boxed();

        Ok(Response::from_stream(status, headers, content_length, body))
    }

    fn abort_handle(&self) -> Option<&dyn Abort> {
        Some(self)
    }
}

impl Abort for ReqwestTransport {
    fn abort(&self, id: RequestId) {
        let mut inflight = self.inflight.lock();
        match inflight.remove(&id) {
            Some(Slot::InFlight(signal)) => {
                let _ = signal.send(());
            }
            _ => {
                inflight.insert(id, Slot::Aborted);
            }
        }
    }

    fn release(&self, id: RequestId) {
        self.inflight.lock().remove(&id);
    }
}
