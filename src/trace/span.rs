//! # Span
//!
//! A `Span` is one timed unit of work: a name, tags, events, and a
//! position in a trace tree. Spans are created by a
//! [`Tracer`](crate::trace::Tracer) and transition `started -> finished`
//! via [`Span::end`] or `started -> abandoned` via [`Span::abandon`].
//! Both transitions are terminal and idempotent: the first caller takes
//! the recording out of the handle, later callers find nothing to do.

use crate::trace::export::SpanReporter;
use crate::trace::{SpanContext, SpanId};
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

static NOOP_REPORTER: Lazy<Arc<dyn SpanReporter>> =
    Lazy::new(|| Arc::new(crate::trace::export::NoopReporter::default()));

/// `SpanKind` describes the relationship between the span, its parents,
/// and its children in a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpanKind {
    /// A request to some remote service.
    Client,
    /// Server-side handling of a remote request.
    Server,
    /// Initiator of an asynchronous message.
    Producer,
    /// Handler of an asynchronous message.
    Consumer,
    /// Default value; an operation internal to the application.
    #[default]
    Internal,
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// When the event happened.
    pub timestamp: SystemTime,
    /// The annotation value.
    pub value: String,
}

/// Immutable description of a finished (or in-flight) span, as handed to a
/// [`SpanReporter`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// The identifier triple and baggage of the span.
    pub context: SpanContext,
    /// Span name; mutable until finish.
    pub name: Cow<'static, str>,
    /// Span kind.
    pub kind: SpanKind,
    /// Start timestamp.
    pub start_time: SystemTime,
    /// End timestamp; `None` while the span is in flight.
    pub end_time: Option<SystemTime>,
    /// Tags in insertion order; same-key writes overwrite in place.
    pub tags: Vec<(String, String)>,
    /// Ordered annotations.
    pub events: Vec<Event>,
    /// Error description, if any was recorded.
    pub error: Option<String>,
}

impl SpanData {
    pub(crate) fn started(context: SpanContext, start_time: SystemTime) -> Self {
        SpanData {
            context,
            name: Cow::Borrowed(""),
            kind: SpanKind::default(),
            start_time,
            end_time: None,
            tags: Vec::new(),
            events: Vec::new(),
            error: None,
        }
    }

    /// The parent span id, if this is not a root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.context.parent_id()
    }

    /// Returns the value recorded for a tag key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A handle to one span recording.
///
/// `Span` is cheaply cloneable; all clones refer to the same recording, so
/// a handle can be captured by an async adapter on one thread while the
/// owner holds another on the original thread. Whichever handle finishes
/// first wins; the recording is taken out of the shared cell and every
/// later finish or mutation is a no-op.
///
/// Unsampled spans (and remote-parent handles) carry a valid context but
/// no recording: mutators do nothing and [`end`](Span::end) reports
/// nothing.
#[derive(Clone)]
pub struct Span {
    context: SpanContext,
    data: Arc<Mutex<Option<SpanData>>>,
    reporter: Arc<dyn SpanReporter>,
}

impl Span {
    pub(crate) fn new(
        context: SpanContext,
        data: Option<SpanData>,
        reporter: Arc<dyn SpanReporter>,
    ) -> Self {
        Span {
            context,
            data: Arc::new(Mutex::new(data)),
            reporter,
        }
    }

    /// A non-recording handle that only carries a context.
    ///
    /// Used for remote parents: spans created under this handle become its
    /// children, but the remote side owns the actual recording.
    pub fn from_context(context: SpanContext) -> Self {
        Span::new(context, None, NOOP_REPORTER.clone())
    }

    /// The immutable context of this span.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Returns `true` while this span is recording information.
    ///
    /// `false` once ended or abandoned, and always `false` for unsampled
    /// spans and remote-parent handles.
    pub fn is_recording(&self) -> bool {
        self.data
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Operate on the recording, if it is still present.
    fn with_data<T>(&self, f: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.data
            .lock()
            .ok()
            .and_then(|mut guard| guard.as_mut().map(f))
    }

    /// Updates the span name. No-op after finish.
    pub fn set_name(&self, name: impl Into<Cow<'static, str>>) {
        let name = name.into();
        self.with_data(|data| data.name = name);
    }

    /// Sets the span kind. No-op after finish.
    pub fn set_kind(&self, kind: SpanKind) {
        self.with_data(|data| data.kind = kind);
    }

    /// Records a tag, overwriting any previous value for the same key.
    pub fn tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.with_data(|data| {
            if let Some(entry) = data.tags.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                data.tags.push((key, value));
            }
        });
    }

    /// Records a timestamped annotation.
    pub fn event(&self, value: impl Into<String>) {
        let value = value.into();
        let timestamp = SystemTime::now();
        self.with_data(|data| data.events.push(Event { timestamp, value }));
    }

    /// Records an error description. The last recorded error wins.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_data(|data| data.error = Some(message));
    }

    /// Records an error. The last recorded error wins.
    pub fn record_error(&self, err: &dyn Error) {
        self.set_error(err.to_string());
    }

    /// Signals that the operation described by this span has ended.
    ///
    /// The first call takes the recording and hands it to the reporter;
    /// any later call (from this or any cloned handle) is a no-op. The
    /// reporter is fire-and-forget: its failures never reach the caller.
    pub fn end(&self) {
        self.end_with_timestamp(SystemTime::now())
    }

    /// Ends the span with an explicit end timestamp.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        let data = match self.data.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                tracing::warn!("span data lock poisoned, dropping recording");
                None
            }
        };
        let Some(mut data) = data else {
            return; // already ended or abandoned
        };
        data.end_time = Some(timestamp);
        self.reporter.report(data);
    }

    /// Discards a speculatively created span without reporting it.
    ///
    /// Used when a span was created before the work it describes was
    /// confirmed (e.g. before an async subscription saw demand) and the
    /// work never happened. Terminal and idempotent like [`end`](Span::end).
    pub fn abandon(&self) {
        let taken = self
            .data
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .is_some();
        if taken {
            tracing::debug!(context = ?self.context, "span abandoned");
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("context", &self.context)
            .field("recording", &self.is_recording())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::export::InMemorySpanStore;
    use crate::trace::{Sampled, TraceId};

    fn recording_span(store: &InMemorySpanStore) -> Span {
        let context = SpanContext::new(
            TraceId::from(1),
            SpanId::from(2),
            None,
            Sampled::Yes,
            false,
        );
        let data = SpanData::started(context.clone(), SystemTime::now());
        Span::new(context, Some(data), Arc::new(store.clone()))
    }

    #[test]
    fn end_reports_exactly_once() {
        let store = InMemorySpanStore::new(8);
        let span = recording_span(&store);
        let clone = span.clone();

        span.end();
        clone.end();
        span.end();

        assert_eq!(store.spans().unwrap().len(), 1);
        assert!(!span.is_recording());
    }

    #[test]
    fn abandon_never_reports() {
        let store = InMemorySpanStore::new(8);
        let span = recording_span(&store);

        span.abandon();
        span.end(); // finish after abandon is absorbed

        assert!(store.spans().unwrap().is_empty());
    }

    #[test]
    fn mutations_after_end_are_noops() {
        let store = InMemorySpanStore::new(8);
        let span = recording_span(&store);
        span.set_name("before");
        span.end();

        span.set_name("after");
        span.tag("late", "tag");
        span.event("late event");

        let spans = store.spans().unwrap();
        assert_eq!(spans[0].name, "before");
        assert!(spans[0].tags.is_empty());
        assert!(spans[0].events.is_empty());
    }

    #[test]
    fn tag_overwrites_same_key_in_place() {
        let store = InMemorySpanStore::new(8);
        let span = recording_span(&store);
        span.tag("peer", "a");
        span.tag("method", "GET");
        span.tag("peer", "b");
        span.end();

        let spans = store.spans().unwrap();
        assert_eq!(spans[0].tag("peer"), Some("b"));
        assert_eq!(spans[0].tags.len(), 2);
        assert_eq!(spans[0].tags[0].0, "peer");
    }

    #[test]
    fn non_recording_handle_is_inert() {
        let context = SpanContext::new(
            TraceId::from(7),
            SpanId::from(8),
            None,
            Sampled::No,
            true,
        );
        let span = Span::from_context(context.clone());
        assert!(!span.is_recording());
        span.set_name("ignored");
        span.end();
        assert_eq!(span.context(), &context);
    }
}
