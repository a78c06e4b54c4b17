//! Tracing data model and span creation.
//!
//! This module holds the value types that identify a trace
//! ([`SpanContext`], [`TraceId`], [`SpanId`], [`Baggage`]), the mutable
//! [`Span`] handle bound to one context, and the [`Tracer`] facade that
//! creates spans and coordinates with the current-context storage.
//!
//! Sampling is decided when a lineage first lacks a decision and is then
//! fixed: a child inherits its parent's yes/no, and only an
//! [`Unset`](Sampled::Unset) parent consults the configured [`Sampler`].

mod export;
mod id_generator;
mod sampler;
mod span;
mod span_context;
mod tracer;

pub use export::{InMemorySpanStore, NoopReporter, SpanReporter};
pub use id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator};
pub use sampler::{Sampler, ShouldSample};
pub use span::{Event, Span, SpanData, SpanKind};
pub use span_context::{Baggage, Sampled, SpanContext, SpanId, TraceId};
pub use tracer::{Tracer, TracerBuilder};

use thiserror::Error;

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing API.
///
/// Note that the traced call path itself never sees these: propagation is
/// fail-open and span bookkeeping absorbs its own failures. Errors only
/// surface from explicit accessors such as
/// [`InMemorySpanStore::spans`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The span store mutex was poisoned by a panicking writer.
    #[error("span store lock poisoned")]
    StorePoisoned,

    /// Other errors not covered above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}
