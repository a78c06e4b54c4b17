use crate::trace::span::SpanData;
use crate::trace::{TraceError, TraceResult};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// An append-only sink for finished spans.
///
/// The tracer calls [`report`](SpanReporter::report) once per finished
/// sampled span, fire-and-forget: a reporter must never block the traced
/// call path and must swallow its own delivery failures (logging them at
/// most). Abandoned and unsampled spans never reach a reporter.
pub trait SpanReporter: Send + Sync + fmt::Debug {
    /// Accept one finished span.
    fn report(&self, span: SpanData);
}

/// A reporter that drops everything.
#[derive(Clone, Debug, Default)]
pub struct NoopReporter {
    _private: (),
}

impl SpanReporter for NoopReporter {
    fn report(&self, _span: SpanData) {}
}

/// A bounded in-memory store of finished spans.
///
/// Useful for tests and for exposing a recent-spans dump. The store is a
/// ring buffer with a fixed capacity; once full, accepting a new span
/// evicts the oldest one.
///
/// # Example
///
/// ```
/// use spanflow::trace::{InMemorySpanStore, Tracer};
///
/// let store = InMemorySpanStore::new(16);
/// let tracer = Tracer::builder().with_reporter(store.clone()).build();
///
/// tracer.next_span().end();
/// assert_eq!(store.spans().unwrap().len(), 1);
/// store.clear();
/// assert!(store.spans().unwrap().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySpanStore {
    spans: Arc<Mutex<VecDeque<SpanData>>>,
    capacity: usize,
}

impl InMemorySpanStore {
    /// Creates a store that retains at most `capacity` finished spans.
    pub fn new(capacity: usize) -> Self {
        InMemorySpanStore {
            spans: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// Returns a snapshot of the retained spans, oldest first.
    pub fn spans(&self) -> TraceResult<Vec<SpanData>> {
        self.spans
            .lock()
            .map(|guard| guard.iter().cloned().collect())
            .map_err(|_| TraceError::StorePoisoned)
    }

    /// Number of retained spans.
    pub fn len(&self) -> usize {
        self.spans.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns `true` if no spans are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all retained spans.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.spans.lock() {
            guard.clear();
        }
    }
}

impl SpanReporter for InMemorySpanStore {
    fn report(&self, span: SpanData) {
        match self.spans.lock() {
            Ok(mut guard) => {
                if guard.len() == self.capacity {
                    guard.pop_front();
                }
                guard.push_back(span);
            }
            Err(_) => tracing::warn!("span store lock poisoned, dropping span"),
        }
    }
}
