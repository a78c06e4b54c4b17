use crate::context::Context;
use crate::trace::{Span, Tracer};
use std::thread;

impl Tracer {
    /// Wraps a unit of work so it runs under the trace active at wrap
    /// time, even when executed later on another thread.
    ///
    /// If a span is current when `wrap_task` is called, the task borrows
    /// it: the span is current while the task runs but its lifecycle
    /// stays with the caller. If nothing is current, the wrapper creates
    /// its own span named `async` and ends it when the task returns,
    /// tagging an error first if the task panics.
    ///
    /// # Example
    ///
    /// ```
    /// use spanflow::Tracer;
    ///
    /// let tracer = Tracer::builder().build();
    /// let span = tracer.next_span();
    /// let task = {
    ///     let _guard = tracer.with_span(&span);
    ///     let inner = tracer.clone();
    ///     tracer.wrap_task(move || inner.current_span().is_some())
    /// };
    /// let handle = std::thread::spawn(task);
    /// assert!(handle.join().unwrap());
    /// span.end();
    /// ```
    pub fn wrap_task<T>(&self, task: impl FnOnce() -> T) -> impl FnOnce() -> T {
        // capture happens here, not when the task eventually runs
        let (span, owned) = match self.current_span() {
            Some(span) => (span, false),
            None => {
                let span = self.next_span();
                span.set_name("async");
                (span, true)
            }
        };

        move || {
            let _guard = Context::current_with_span(span.clone()).attach();
            let _finish = OwnedFinish {
                span: owned.then_some(span),
            };
            task()
        }
    }
}

/// Ends a wrapper-owned span when the task returns or unwinds.
struct OwnedFinish {
    span: Option<Span>,
}

impl Drop for OwnedFinish {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            if thread::panicking() {
                span.set_error("task panicked");
            }
            span.end();
        }
    }
}
