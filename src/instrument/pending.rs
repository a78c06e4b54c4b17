use crate::trace::Span;
use std::sync::atomic::{AtomicBool, Ordering};

/// A span whose terminal outcome has not been decided yet.
///
/// Async adapters share one `PendingSpan` between the path that finishes
/// the work and the path that tears it down. Whichever side reaches a
/// terminal call first claims the span; every later call is a no-op, so
/// racing completion against cancellation settles on exactly one outcome.
///
/// The `requested` flag records whether the wrapped work was ever
/// started. Cancelling work that never started discards the span without
/// reporting it; cancelling work in flight reports it as cancelled.
#[derive(Debug)]
pub struct PendingSpan {
    span: Span,
    requested: AtomicBool,
    claimed: AtomicBool,
}

impl PendingSpan {
    /// Takes custody of a span until a terminal outcome is decided.
    pub fn new(span: Span) -> Self {
        PendingSpan {
            span,
            requested: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    /// The span being managed. Still valid after a terminal call; the
    /// handle is simply inert then.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Records that the wrapped work has started.
    pub fn mark_requested(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// True once any terminal call has claimed the span.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// True once the wrapped work has started.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    fn claim(&self) -> Option<&Span> {
        (!self.claimed.swap(true, Ordering::AcqRel)).then_some(&self.span)
    }

    /// Ends the span successfully, if nothing else claimed it first.
    pub fn complete(&self) {
        if let Some(span) = self.claim() {
            span.end();
        }
    }

    /// Ends the span with an error, if nothing else claimed it first.
    pub fn fail(&self, message: impl Into<String>) {
        if let Some(span) = self.claim() {
            span.set_error(message);
            span.end();
        }
    }

    /// Tears the span down without a completion.
    ///
    /// Work that was never started leaves no record; work already in
    /// flight is reported as cancelled.
    pub fn cancel(&self) {
        if let Some(span) = self.claim() {
            if self.requested.load(Ordering::Acquire) {
                span.set_error("cancelled");
                span.end();
            } else {
                span.abandon();
            }
        }
    }
}
