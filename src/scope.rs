//! Current-context storage with scoped activation.
//!
//! A [`CurrentTraceContext`] answers "which trace context is active in
//! this logical execution" and hands out [`Scope`]s that activate a
//! context with guaranteed restore. Scopes nest LIFO: each scope only
//! remembers the single context that was current when it opened, which
//! yields correct stack discipline without an explicit stack.
//!
//! Blocking code uses [`ThreadLocalCurrentTraceContext`], backed by the
//! same thread-local cell as [`Context`]. Async pipelines do not use an
//! ambient holder at all: the context travels as a value inside
//! [`WithContext`](crate::WithContext) and is replayed through this same
//! scope mechanism around every poll.

use crate::context::Context;
use crate::trace::{Span, SpanContext};
use std::fmt;

/// Holder of the context currently active in this logical execution.
pub trait CurrentTraceContext: Send + Sync + fmt::Debug {
    /// The currently active context, if any.
    fn current(&self) -> Option<SpanContext>;

    /// Activates `context` (or clears the active context for `None`) until
    /// the returned scope is closed, which restores exactly the context
    /// that was active immediately before this call.
    fn new_scope(&self, context: Option<&SpanContext>) -> Scope;

    /// Like [`new_scope`](CurrentTraceContext::new_scope), but returns a
    /// no-op scope when `context` is already current. Avoids redundant
    /// save/restore churn on hot paths where wrappers re-activate the
    /// context they are already running under.
    fn maybe_scope(&self, context: Option<&SpanContext>) -> Scope {
        let same = match (self.current(), context) {
            (None, None) => true,
            (Some(current), Some(next)) => {
                current.trace_id() == next.trace_id() && current.span_id() == next.span_id()
            }
            _ => false,
        };
        if same {
            Scope::noop()
        } else {
            self.new_scope(context)
        }
    }
}

/// A token representing "context X is active here".
///
/// Dropping the scope restores the previously active context. Scopes are
/// not `Send`: they must be closed on the thread that opened them.
#[allow(missing_debug_implementations)]
pub struct Scope {
    _guard: Option<crate::context::ContextGuard>,
}

impl Scope {
    fn noop() -> Self {
        Scope { _guard: None }
    }

    /// Explicitly closes the scope, restoring the prior context.
    ///
    /// Equivalent to dropping it; provided for call sites where the
    /// restore point is clearer spelled out.
    pub fn close(self) {}
}

/// [`CurrentTraceContext`] backed by thread-local storage.
///
/// Suitable for blocking code where a scope's lifetime is strictly nested
/// within one thread's call stack.
#[derive(Clone, Debug, Default)]
pub struct ThreadLocalCurrentTraceContext {
    _private: (),
}

impl ThreadLocalCurrentTraceContext {
    /// Creates a new thread-local current-context holder.
    pub fn new() -> Self {
        ThreadLocalCurrentTraceContext::default()
    }
}

impl CurrentTraceContext for ThreadLocalCurrentTraceContext {
    fn current(&self) -> Option<SpanContext> {
        Context::map_current(|cx| cx.span_context().cloned())
    }

    fn new_scope(&self, context: Option<&SpanContext>) -> Scope {
        let span = context.map(|sc| Span::from_context(sc.clone()));
        let next = Context::map_current(|cx| cx.with_span_option(span));
        Scope {
            _guard: Some(next.attach()),
        }
    }
}
