//! Span lifecycle adapters for async and cross-thread boundaries.
//!
//! Blocking code can rely on scope nesting: whoever opened a span closes
//! it, further down the same call stack. Async code cannot; a span may be
//! finished by an executor thread, torn down by a cancellation, or never
//! started at all. The adapters here make that safe:
//!
//! * [`PendingSpan`] holds a span until exactly one terminal outcome
//!   (complete, fail, cancel) claims it, no matter how many parties race.
//! * [`TracedFuture`] and [`TracedStream`] (via [`TraceFutureExt`] and
//!   [`TraceStreamExt`]) bind a span to a future or stream: current on
//!   every poll, ended on resolution, cancelled on mid-flight drop,
//!   silently discarded if never polled.
//! * [`Tracer::wrap_task`](crate::Tracer::wrap_task) carries the wrap-time
//!   trace into a closure that runs later, possibly on another thread.
//! * [`TracedWorker`] scopes many units of work under one span.
//!
//! The task and future adapters follow one custody rule: a span the
//! adapter created is the adapter's to finish; a span it captured from
//! the surrounding scope is only made current, never finished.
//! [`TracedWorker`] is the deliberate exception: the submitting thread
//! hands its span over, and the worker closes it on shutdown.
//!
//! The future adapters manage lifecycle, not output inspection: to mark a
//! failed result, record the error through a cloned [`Span`] handle
//! before the future resolves.
//!
//! [`Span`]: crate::Span

mod future;
mod pending;
mod task;
mod worker;

pub use future::{TraceFutureExt, TraceStreamExt, TracedFuture, TracedStream};
pub use pending::PendingSpan;
pub use worker::TracedWorker;
