//! Cancellation contexts.
//!
//! A [`Context`] is created by the caller for one logical operation and
//! handed to every call made on its behalf. It can be observed without
//! blocking ([`Context::is_done`], [`Context::err`]) or awaited
//! ([`Context::done`]). Contexts form a tree: a child is done as soon as its
//! own handle fires, its deadline passes, or any ancestor is done.
//!
//! Correlation values (request id, user id) ride along on the context and are
//! inherited by children.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context's cancel handle (or an ancestor's) was fired.
    #[error("context canceled")]
    Canceled,

    /// The context's deadline (or an ancestor's) has passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct State {
    signal: watch::Sender<Option<ContextError>>,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl State {
    fn new(deadline: Option<Instant>, parent: Option<Context>) -> Arc<Self> {
        let (signal, _) = watch::channel(None);
        Arc::new(Self {
            signal,
            deadline,
            parent,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct Values {
    request_id: Option<String>,
    user: Option<String>,
}

/// A cancellation signal plus the correlation values of one operation.
#[derive(Clone)]
pub struct Context {
    state: Arc<State>,
    values: Values,
}

impl Context {
    /// A root context that is never done.
    pub fn background() -> Self {
        Self {
            state: State::new(None, None),
            values: Values::default(),
        }
    }

    /// A root context together with the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::background().child()
    }

    /// A child of this context that can be cancelled on its own.
    pub fn child(&self) -> (Self, CancelHandle) {
        self.derive(None)
    }

    /// A child of this context that is done once `timeout` has elapsed.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.derive(Some(Instant::now() + timeout))
    }

    /// A child of this context that is done at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> (Self, CancelHandle) {
        let state = State::new(deadline, Some(self.clone()));
        let handle = CancelHandle {
            state: state.clone(),
        };
        let ctx = Self {
            state,
            values: self.values.clone(),
        };
        (ctx, handle)
    }

    /// Attach a request correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.values.request_id = Some(request_id.into());
        self
    }

    /// Attach the authenticated user identifier.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.values.user = Some(user.into());
        self
    }

    /// The request correlation id, if one was attached.
    pub fn request_id(&self) -> Option<&str> {
        self.values.request_id.as_deref()
    }

    /// The authenticated user identifier, if one was attached.
    pub fn user(&self) -> Option<&str> {
        self.values.user.as_deref()
    }

    /// The earliest deadline on this context or any ancestor.
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.state.parent.as_ref().and_then(Context::deadline);
        match (self.state.deadline, inherited) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }

    /// Whether the context is done. Never blocks.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The reason the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(err) = *self.state.signal.borrow() {
            return Some(err);
        }
        if let Some(deadline) = self.state.deadline {
            if Instant::now() >= deadline {
                return Some(ContextError::DeadlineExceeded);
            }
        }
        self.state.parent.as_ref().and_then(Context::err)
    }

    /// Resolves with the context error once the context is done.
    ///
    /// Pends forever on a context that can never be done.
    pub fn done(&self) -> BoxFuture<'_, ContextError> {
        Box::pin(async move {
            if let Some(err) = self.err() {
                return err;
            }

            let mut signal = self.state.signal.subscribe();
            let cancelled = async {
                // The watch guard must be gone before the next await.
                let signalled = signal
                    .wait_for(Option::is_some)
                    .await
                    .map(|value| (*value).unwrap_or(ContextError::Canceled));
                match signalled {
                    Ok(err) => err,
                    Err(_) => std::future::pending().await,
                }
            };
            let expired = async {
                match self.state.deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(deadline).await;
                        ContextError::DeadlineExceeded
                    }
                    None => std::future::pending().await,
                }
            };
            let inherited = async {
                match &self.state.parent {
                    Some(parent) => parent.done().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                err = cancelled => err,
                err = expired => err,
                err = inherited => err,
            }
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("err", &self.err())
            .field("deadline", &self.deadline())
            .field("request_id", &self.values.request_id)
            .field("user", &self.values.user)
            .finish()
    }
}

/// Cancels the context it was created with (and every descendant).
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<State>,
}

impl CancelHandle {
    /// Cancel the context. Later calls have no effect.
    pub fn cancel(&self) {
        self.state.signal.send_if_modified(|value| {
            if value.is_none() {
                *value = Some(ContextError::Canceled);
                true
            } else {
                false
            }
        });
    }

    /// Whether this handle has fired.
    pub fn is_cancelled(&self) -> bool {
        self.state.signal.borrow().is_some()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    #[test]
    fn test_background_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_done_pends() {
        let ctx = Context::background();
        let result = timeout(Duration::from_secs(60), ctx.done()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_marks_done() {
        let (ctx, cancel) = Context::with_cancel();
        assert!(!ctx.is_done());

        cancel.cancel();

        assert!(cancel.is_cancelled());
        assert!(ctx.is_done());
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        assert_eq!(ctx.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (ctx, cancel) = Context::with_cancel();
        cancel.cancel();
        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn test_done_wakes_on_cancel_from_other_task() {
        let (ctx, cancel) = Context::with_cancel();

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = timeout(Duration::from_secs(5), ctx.done())
            .await
            .expect("context should be cancelled");
        assert_eq!(err, ContextError::Canceled);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_child_observes_parent() {
        let (parent, cancel_parent) = Context::with_cancel();
        let (child, _cancel_child) = parent.child();

        cancel_parent.cancel();

        assert!(child.is_done());
        assert_eq!(child.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_parent_ignores_child_cancel() {
        let (parent, _cancel_parent) = Context::with_cancel();
        let (child, cancel_child) = parent.child();

        cancel_child.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(100));
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_some());

        let err = ctx.done().await;
        assert_eq!(err, ContextError::DeadlineExceeded);
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_earliest_ancestor() {
        let (outer, _c1) = Context::background().with_timeout(Duration::from_secs(1));
        let (inner, _c2) = outer.with_timeout(Duration::from_secs(10));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[test]
    fn test_values_are_inherited() {
        let ctx = Context::background()
            .with_request_id("req-1")
            .with_user("alice");
        let (child, _cancel) = ctx.child();

        assert_eq!(child.request_id(), Some("req-1"));
        assert_eq!(child.user(), Some("alice"));
        assert_eq!(Context::background().request_id(), None);
    }

    #[test]
    fn test_done_is_woken_by_cancel() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let (ctx, cancel) = Context::with_cancel();
        let mut done = task::spawn(ctx.done());
        assert_pending!(done.poll());

        cancel.cancel();

        assert!(done.is_woken());
        assert_ready_eq!(done.poll(), ContextError::Canceled);
    }

    proptest::proptest! {
        #[test]
        fn prop_child_deadline_never_outlives_parent(parent_ms in 1u64..100_000, child_ms in 1u64..100_000) {
            let (parent, _p) = Context::background().with_timeout(Duration::from_millis(parent_ms));
            let (child, _c) = parent.with_timeout(Duration::from_millis(child_ms));

            let parent_deadline = parent.deadline().unwrap();
            let child_deadline = child.deadline().unwrap();
            proptest::prop_assert!(child_deadline <= parent_deadline);
            if parent_ms <= child_ms {
                proptest::prop_assert_eq!(child_deadline, parent_deadline);
            }
        }
    }

    #[tokio::test]
    async fn test_done_can_be_awaited_on_another_task() {
        fn assert_send<T: Send>(_: &T) {}

        let (ctx, cancel) = Context::with_cancel();
        let (child, _cancel_child) = ctx.child();
        assert_send(&child.done());

        let waiter = tokio::spawn(async move { child.done().await });
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), ContextError::Canceled);
    }

    #[test]
    fn test_context_error_display() {
        assert_eq!(ContextError::Canceled.to_string(), "context canceled");
        assert_eq!(
            ContextError::DeadlineExceeded.to_string(),
            "context deadline exceeded"
        );
    }
}
