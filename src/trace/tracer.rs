use crate::context::{Context, ContextGuard};
use crate::trace::export::{NoopReporter, SpanReporter};
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::sampler::{Sampler, ShouldSample};
use crate::trace::span::{Span, SpanData};
use crate::trace::span_context::{Sampled, SpanContext};
use std::sync::Arc;
use std::time::SystemTime;

/// Creates spans and coordinates with the current-context storage.
///
/// A `Tracer` is cheap to clone and safe to share across threads. Spans it
/// creates are parented on the ambient current context unless an explicit
/// parent is given.
///
/// # Example
///
/// ```
/// use spanflow::trace::{InMemorySpanStore, Tracer};
///
/// let store = InMemorySpanStore::new(16);
/// let tracer = Tracer::builder().with_reporter(store.clone()).build();
///
/// let parent = tracer.next_span();
/// let child = {
///     let _guard = tracer.with_span(&parent);
///     tracer.next_span()
/// };
/// assert_eq!(child.context().trace_id(), parent.context().trace_id());
/// assert_eq!(child.context().parent_id(), Some(parent.context().span_id()));
/// ```
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

#[derive(Debug)]
struct TracerInner {
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    reporter: Arc<dyn SpanReporter>,
}

impl Tracer {
    /// Start building a tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Creates a span parented on the current context.
    ///
    /// If a context is active here, the new span shares its trace id and
    /// records it as parent; otherwise a new root trace is started. The
    /// span's name is empty until [`Span::set_name`] is called.
    pub fn next_span(&self) -> Span {
        let parent = Context::map_current(|cx| cx.span_context().cloned());
        self.start_span(parent.as_ref())
    }

    /// Creates a span with an explicit parent, ignoring the current context.
    ///
    /// Used when the parent arrived out-of-band, e.g. through a reactive
    /// context value or an extracted remote carrier, rather than through
    /// the thread-local current context.
    pub fn next_span_with_parent(&self, parent: &SpanContext) -> Span {
        self.start_span(Some(parent))
    }

    /// The span active in the current context, if any.
    ///
    /// `None` is a normal state meaning "no ambient span here".
    pub fn current_span(&self) -> Option<Span> {
        Context::map_current(|cx| cx.span().cloned())
    }

    /// Makes the given span current until the returned guard is dropped.
    ///
    /// The guard restores the previously current context even if the
    /// guarded block panics, so scopes nest like a call stack.
    pub fn with_span(&self, span: &Span) -> ContextGuard {
        Context::current_with_span(span.clone()).attach()
    }

    fn start_span(&self, parent: Option<&SpanContext>) -> Span {
        let parent = parent.filter(|p| p.is_valid());
        let (context, sampled) = match parent {
            Some(parent) => {
                let sampled = match parent.sampled() {
                    Sampled::Unset => self.inner.sampler.should_sample(parent.trace_id()),
                    decided => decided,
                };
                let context = SpanContext::new(
                    parent.trace_id(),
                    self.inner.id_generator.new_span_id(),
                    Some(parent.span_id()),
                    sampled,
                    false,
                )
                .with_baggage(parent.baggage().clone());
                (context, sampled)
            }
            None => {
                let trace_id = self.inner.id_generator.new_trace_id();
                let sampled = self.inner.sampler.should_sample(trace_id);
                let context = SpanContext::new(
                    trace_id,
                    self.inner.id_generator.new_span_id(),
                    None,
                    sampled,
                    false,
                );
                (context, sampled)
            }
        };

        let data = sampled
            .is_sampled()
            .then(|| SpanData::started(context.clone(), SystemTime::now()));
        Span::new(context, data, self.inner.reporter.clone())
    }
}

/// Configures and builds a [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    reporter: Arc<dyn SpanReporter>,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            sampler: Box::new(Sampler::AlwaysOn),
            id_generator: Box::new(RandomIdGenerator::default()),
            reporter: Arc::new(NoopReporter::default()),
        }
    }
}

impl TracerBuilder {
    /// The sampler consulted for decision-less lineages. Defaults to
    /// [`Sampler::AlwaysOn`].
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// The id generator for new traces and spans. Defaults to
    /// [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// The sink receiving finished sampled spans. Defaults to
    /// [`NoopReporter`].
    pub fn with_reporter<R: SpanReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Build the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                sampler: self.sampler,
                id_generator: self.id_generator,
                reporter: self.reporter,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::id_generator::IncrementIdGenerator;
    use crate::trace::InMemorySpanStore;
    use crate::trace::{SpanId, TraceId};

    fn test_tracer(store: &InMemorySpanStore) -> Tracer {
        Tracer::builder()
            .with_id_generator(IncrementIdGenerator::new())
            .with_reporter(store.clone())
            .build()
    }

    #[test]
    fn root_span_has_no_parent() {
        let store = InMemorySpanStore::new(8);
        let tracer = test_tracer(&store);

        let span = tracer.next_span();
        assert_eq!(span.context().parent_id(), None);
        assert!(span.context().is_valid());
        assert!(span.context().sampled().is_sampled());
    }

    #[test]
    fn child_links_to_current_parent() {
        let store = InMemorySpanStore::new(8);
        let tracer = test_tracer(&store);

        let parent = tracer.next_span();
        let _guard = tracer.with_span(&parent);
        let child = tracer.next_span();

        assert_eq!(child.context().trace_id(), parent.context().trace_id());
        assert_eq!(
            child.context().parent_id(),
            Some(parent.context().span_id())
        );
        assert_ne!(child.context().span_id(), parent.context().span_id());
    }

    #[test]
    fn explicit_parent_overrides_current() {
        let store = InMemorySpanStore::new(8);
        let tracer = test_tracer(&store);

        let ambient = tracer.next_span();
        let _guard = tracer.with_span(&ambient);

        let remote = SpanContext::new(
            TraceId::from(0xabcu128),
            SpanId::from(0xdefu64),
            None,
            Sampled::Yes,
            true,
        );
        let child = tracer.next_span_with_parent(&remote);

        assert_eq!(child.context().trace_id(), remote.trace_id());
        assert_eq!(child.context().parent_id(), Some(remote.span_id()));
    }

    #[test]
    fn child_inherits_decided_sampling() {
        let tracer = Tracer::builder().with_sampler(Sampler::AlwaysOn).build();

        let unsampled_parent = SpanContext::new(
            TraceId::from(5u128),
            SpanId::from(6u64),
            None,
            Sampled::No,
            true,
        );
        let child = tracer.next_span_with_parent(&unsampled_parent);
        // the parent decision wins over the sampler
        assert_eq!(child.context().sampled(), Sampled::No);
        assert!(!child.is_recording());
    }

    #[test]
    fn unset_parent_consults_sampler_and_fixes_decision() {
        let undecided = SpanContext::new(
            TraceId::from(5u128),
            SpanId::from(6u64),
            None,
            Sampled::Unset,
            true,
        );

        let on = Tracer::builder().with_sampler(Sampler::AlwaysOn).build();
        assert_eq!(
            on.next_span_with_parent(&undecided).context().sampled(),
            Sampled::Yes
        );

        let off = Tracer::builder().with_sampler(Sampler::AlwaysOff).build();
        assert_eq!(
            off.next_span_with_parent(&undecided).context().sampled(),
            Sampled::No
        );
    }

    #[test]
    fn sampler_may_defer_the_decision() {
        #[derive(Debug)]
        struct Deferring;
        impl ShouldSample for Deferring {
            fn should_sample(&self, _trace_id: TraceId) -> Sampled {
                Sampled::Unset
            }
        }

        let store = InMemorySpanStore::new(8);
        let tracer = Tracer::builder()
            .with_sampler(Deferring)
            .with_reporter(store.clone())
            .build();

        let span = tracer.next_span();
        assert_eq!(span.context().sampled(), Sampled::Unset);
        assert!(!span.is_recording());
        span.end();
        assert!(store.spans().unwrap().is_empty());

        // the next participant can still decide for the lineage
        let deciding = Tracer::builder().with_sampler(Sampler::AlwaysOn).build();
        let child = deciding.next_span_with_parent(span.context());
        assert_eq!(child.context().sampled(), Sampled::Yes);
    }

    #[test]
    fn unsampled_spans_are_never_reported() {
        let store = InMemorySpanStore::new(8);
        let tracer = Tracer::builder()
            .with_sampler(Sampler::AlwaysOff)
            .with_reporter(store.clone())
            .build();

        let span = tracer.next_span();
        assert!(!span.is_recording());
        span.end();
        assert!(store.spans().unwrap().is_empty());
    }

    #[test]
    fn child_inherits_parent_baggage() {
        let tracer = Tracer::builder().build();
        let parent = tracer.next_span();
        let parent_cx = parent
            .context()
            .clone()
            .with_baggage([("tenant", "acme")].into_iter().collect());

        let child = tracer.next_span_with_parent(&parent_cx);
        assert_eq!(child.context().baggage().get("tenant"), Some("acme"));
    }

    #[test]
    fn current_span_reflects_scope() {
        let store = InMemorySpanStore::new(8);
        let tracer = test_tracer(&store);
        assert!(tracer.current_span().is_none());

        let span = tracer.next_span();
        {
            let _guard = tracer.with_span(&span);
            let current = tracer.current_span().expect("span should be current");
            assert_eq!(current.context(), span.context());
        }
        assert!(tracer.current_span().is_none());
    }
}
