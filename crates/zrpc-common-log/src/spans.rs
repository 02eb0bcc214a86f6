//! Spans and timing for outbound calls.

use std::fmt::Display;
use std::time::Instant;

use tracing::{field, info_span, Span};

/// Create a span for one outbound call.
///
/// `status` and `error` are declared empty and filled in once the call
/// settles.
pub fn call_span(method: &str, url: &str) -> Span {
    info_span!("rpc_call", method = %method, url = %url, status = field::Empty, error = field::Empty)
}

/// Record the response status on a call span.
pub fn record_status(span: &Span, status: u16) {
    span.record("status", status);
}

/// Record a failure on a call span.
pub fn record_error(span: &Span, error: &dyn Display) {
    span.record("error", field::display(error));
}

/// Measures how long an operation took.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Milliseconds since the timer started.
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Emit the duration as a debug event inside `span`.
    pub fn finish(self, span: &Span) {
        tracing::debug!(
            parent: span,
            operation = %self.operation,
            duration_ms = %self.elapsed_ms(),
            "operation completed"
        );
    }
}
