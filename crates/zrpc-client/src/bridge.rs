//! Races a transport call against a cancellation context.

use std::sync::Arc;

use tokio::task::JoinError;
use zrpc_common_async::{spawn_named, Context};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::transport::{find_abort, Response, TransportError, Transport};

/// Send `request` on `transport` unless `ctx` is done first.
///
/// - A context that is already done fails the call before any I/O.
/// - Otherwise the round trip runs on its own task. If it finishes first its
///   result is returned as is.
/// - If the context wins, the first abort capability found on the transport
///   chain is invoked for this request. Without one the request runs to
///   completion.
///
/// Either way the task is awaited before returning and its result is
/// discarded: a cancelled call always reports the context error.
pub async fn execute(transport: &Arc<dyn Transport>, ctx: &Context, request: Request) -> Result<Response> {
    if let Some(err) = ctx.err() {
        tracing::debug!(%err, "context done before dispatch");
        return Err(Error::Cancelled(err));
    }

    let id = request.id();
    let task_transport = Arc::clone(transport);
    let mut task = spawn_named("zrpc-round-trip", async move {
        task_transport.round_trip(request).await
    });

    tokio::select! {
        joined = &mut task => flatten(joined),
        err = ctx.done() => {
            match find_abort(transport.as_ref()) {
                Some(abort) => {
                    tracing::debug!(request_id = %id, %err, "aborting in-flight request");
                    abort.abort(id);
                    let _ = task.await;
                    abort.release(id);
                }
                None => {
                    tracing::warn!(
                        request_id = %id,
                        %err,
                        "transport cannot abort; waiting for request to finish"
                    );
                    let _ = task.await;
                }
            }
            Err(Error::Cancelled(err))
        }
    }
}

fn flatten(joined: std::result::Result<std::result::Result<Response, TransportError>, JoinError>) -> Result<Response> {
    match joined {
        Ok(result) => result.map_err(Error::Transport),
        Err(e) => Err(Error::Transport(TransportError::Task(e.to_string()))),
    }
}
