//! Cancellation contexts and task helpers for zrpc.
//!
//! A [`Context`] carries a cancellation signal, an optional deadline and the
//! request correlation values (`request_id`, `user`) that outbound calls
//! forward as headers.

pub mod context;

pub use context::{CancelHandle, Context, ContextError};

use std::future::Future;

use tracing::Instrument;

/// Spawn `future` on the current runtime inside a `task` span named `name`.
///
/// The span is a child of the caller's current span, so events from the task
/// stay attached to the operation that started it.
pub fn spawn_named<F>(name: &'static str, future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.instrument(tracing::debug_span!("task", name)))
}
