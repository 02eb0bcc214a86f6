//! Scripted transports shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::sync::{oneshot, Notify};
use zrpc_client::{
    Abort, Client, ClientConfig, Method, Request, RequestId, Response, StatusCode, Transport, TransportError,
};

pub const TEST_USER_AGENT: &str = "zrpc-test/1.0";

pub fn config() -> ClientConfig {
    ClientConfig::default().with_user_agent(TEST_USER_AGENT)
}

pub fn client(transport: impl Transport) -> Client {
    Client::new(transport, &config()).expect("client")
}

/// What a transport saw for one request.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub url: String,
    pub host: Option<String>,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl Recorded {
    fn capture(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            url: request.url().to_string(),
            host: request.host().map(str::to_string),
            headers: request.headers().clone(),
            content_length: request.content_length(),
            body: request.body().as_bytes().unwrap_or_default().to_vec(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Responder = Box<dyn Fn(&Recorded) -> Result<Response, TransportError> + Send + Sync>;

/// Answers every request with a scripted response and records it.
pub struct MockTransport {
    responder: Responder,
    calls: AtomicUsize,
    last: Mutex<Option<Recorded>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Recorded) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn ok_json(body: &'static str) -> Self {
        Self::new(move |_| Ok(Response::json(StatusCode::OK, body)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<Recorded> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let recorded = Recorded::capture(&request);
        let response = (self.responder)(&recorded);
        *self.last.lock() = Some(recorded);
        response
    }
}

enum Slot {
    Pending(oneshot::Sender<()>),
    Aborted,
}

/// Blocks every request until it is aborted.
///
/// With [`AbortableTransport::gated`] a request first signals `entered` and
/// then waits for [`AbortableTransport::open_gate`] before it registers, so
/// an abort can be made to arrive ahead of registration.
#[derive(Default)]
pub struct AbortableTransport {
    slots: Mutex<HashMap<RequestId, Slot>>,
    gate: Option<Notify>,
    pub entered: Notify,
    pub started: Notify,
    aborts: AtomicUsize,
    releases: AtomicUsize,
}

impl AbortableTransport {
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Ids still tracked, waiting or aborted early.
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

#[async_trait]
impl Transport for AbortableTransport {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock();
            if let Some(Slot::Aborted) = slots.remove(&request.id()) {
                return Err(TransportError::Aborted);
            }
            slots.insert(request.id(), Slot::Pending(tx));
        }
        self.started.notify_one();

        let _ = rx.await;
        Err(TransportError::Aborted)
    }

    fn abort_handle(&self) -> Option<&dyn Abort> {
        Some(self)
    }
}

impl Abort for AbortableTransport {
    fn abort(&self, id: RequestId) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        match slots.remove(&id) {
            Some(Slot::Pending(tx)) => {
                let _ = tx.send(());
            }
            _ => {
                slots.insert(id, Slot::Aborted);
            }
        }
    }

    fn release(&self, id: RequestId) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().remove(&id);
    }
}

/// Decorator that only exposes what it wraps.
pub struct Wrapper<T>(pub T);

#[async_trait]
impl<T: Transport> Transport for Wrapper<T> {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        self.0.round_trip(request).await
    }

    fn inner(&self) -> Option<&dyn Transport> {
        Some(&self.0)
    }
}

/// Takes `delay` to answer and cannot be aborted.
pub struct SlowTransport {
    pub delay: Duration,
    pub finished: Arc<AtomicUsize>,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Transport for SlowTransport {
    async fn round_trip(&self, _request: Request) -> Result<Response, TransportError> {
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(StatusCode::OK, ""))
    }
}

/// Shares one transport between the client and the test body.
pub struct Shared<T>(pub Arc<T>);

#[async_trait]
impl<T: Transport> Transport for Shared<T> {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        self.0.round_trip(request).await
    }

    fn abort_handle(&self) -> Option<&dyn Abort> {
        self.0.abort_handle()
    }

    fn inner(&self) -> Option<&dyn Transport> {
        self.0.inner()
    }
}
