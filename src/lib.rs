//! Async-safe span lifecycle and trace context propagation.
//!
//! `spanflow` implements the small, correctness-critical core that every
//! tracing instrumentation shares: capturing a trace context, carrying it
//! across thread and async boundaries, and closing each span exactly once
//! despite concurrent completion, cancellation, and error paths.
//!
//! It deliberately does *not* implement a tracing backend, wire codecs, or
//! per-framework integrations. Instrumented transports interact with this
//! crate through three narrow seams: the [`propagation`] carrier traits,
//! the [`SpanReporter`] sink, and the [`instrument`] wrappers for deferred
//! work.
//!
//! # Getting started
//!
//! ```
//! use spanflow::trace::{InMemorySpanStore, Tracer};
//!
//! let store = InMemorySpanStore::new(128);
//! let tracer = Tracer::builder().with_reporter(store.clone()).build();
//!
//! let span = tracer.next_span();
//! span.set_name("handle_request");
//! {
//!     let _guard = tracer.with_span(&span);
//!     // work done here sees `span` as the current span, and
//!     // `tracer.next_span()` would create a child of it.
//! }
//! span.end();
//!
//! assert_eq!(store.spans().unwrap().len(), 1);
//! ```
//!
//! # Async boundaries
//!
//! Wrap deferred work so that the context active at submission time is
//! restored at execution time:
//!
//! ```
//! use spanflow::instrument::TraceFutureExt;
//! use spanflow::trace::Tracer;
//!
//! let tracer = Tracer::builder().build();
//! let span = tracer.next_span();
//! let fut = async { 1 + 1 }.in_span(span);
//! assert_eq!(futures_executor::block_on(fut), 2);
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod context;
pub mod instrument;
pub mod propagation;
pub mod scope;
pub mod trace;

pub use context::{Context, ContextGuard, FutureExt, WithContext};
pub use trace::{Span, SpanContext, SpanId, SpanReporter, TraceId, Tracer};
