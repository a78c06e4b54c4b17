use crate::context::Context;
use crate::instrument::PendingSpan;
use crate::trace::Tracer;

/// Trace scope for a long-lived worker that processes many units of work
/// under one span.
///
/// The worker captures the span current at construction time and takes
/// custody of it: the submitting thread hands the span over, and the
/// worker closes it on [`shutdown`](TracedWorker::shutdown) (or drop).
/// The close is exactly-once even if the original owner also ends the
/// span from its side. When no span is active at construction the worker
/// starts its own, named `worker`; if that created span never ran any
/// work it is discarded instead of reported.
///
/// Each [`run`](TracedWorker::run) call executes with the worker span
/// current, without ending it.
#[derive(Debug)]
pub struct TracedWorker {
    pending: PendingSpan,
    created: bool,
}

impl TracedWorker {
    /// Creates a worker scope from the current span, or a fresh span
    /// when none is active.
    pub fn new(tracer: &Tracer) -> Self {
        let (span, created) = match tracer.current_span() {
            Some(span) => (span, false),
            None => {
                let span = tracer.next_span();
                span.set_name("worker");
                (span, true)
            }
        };
        TracedWorker {
            pending: PendingSpan::new(span),
            created,
        }
    }

    /// Runs one unit of work with the worker span current.
    pub fn run<T>(&self, work: impl FnOnce() -> T) -> T {
        self.pending.mark_requested();
        let cx = Context::current_with_span(self.pending.span().clone());
        let _guard = cx.attach();
        work()
    }

    /// Closes the worker span.
    ///
    /// Dropping the worker has the same effect; either way the span is
    /// closed at most once.
    pub fn shutdown(self) {}

    fn finish(&self) {
        if self.created && !self.pending.is_requested() {
            // speculative span that never represented work
            self.pending.cancel();
        } else {
            self.pending.complete();
        }
    }
}

impl Drop for TracedWorker {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::InMemorySpanStore;

    fn tracer_with_store() -> (Tracer, InMemorySpanStore) {
        let store = InMemorySpanStore::new(8);
        let tracer = Tracer::builder().with_reporter(store.clone()).build();
        (tracer, store)
    }

    #[test]
    fn created_worker_spans_all_runs() {
        let (tracer, store) = tracer_with_store();
        let worker = TracedWorker::new(&tracer);

        let contexts: Vec<_> = (0..3)
            .map(|_| worker.run(|| tracer.current_span().map(|s| s.context().clone())))
            .collect();

        // all units ran under the same span, still open
        assert!(contexts.iter().all(|cx| cx == &contexts[0]));
        assert!(store.spans().unwrap().is_empty());

        worker.shutdown();
        let spans = store.spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "worker");
    }

    #[test]
    fn shutdown_closes_the_captured_span() {
        let (tracer, store) = tracer_with_store();
        let span = tracer.next_span();
        span.set_name("submitter");
        let expected = span.context().clone();

        let worker = {
            let _guard = tracer.with_span(&span);
            TracedWorker::new(&tracer)
        };
        worker.run(|| ());
        worker.shutdown();

        // custody moved to the worker; shutdown closed the span
        let spans = store.spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].context, expected);

        // the submitter's own end finds nothing left to report
        span.end();
        assert_eq!(store.spans().unwrap().len(), 1);
    }

    #[test]
    fn captured_span_closed_exactly_once_despite_owner_end() {
        let (tracer, store) = tracer_with_store();
        let span = tracer.next_span();

        let worker = {
            let _guard = tracer.with_span(&span);
            TracedWorker::new(&tracer)
        };
        worker.run(|| ());

        // the submitter finishes first this time
        span.end();
        worker.shutdown();

        assert_eq!(store.spans().unwrap().len(), 1);
    }

    #[test]
    fn idle_worker_still_closes_captured_span() {
        let (tracer, store) = tracer_with_store();
        let span = tracer.next_span();

        let worker = {
            let _guard = tracer.with_span(&span);
            TracedWorker::new(&tracer)
        };
        drop(worker);

        // captured spans were real work for the submitter; always closed
        assert_eq!(store.spans().unwrap().len(), 1);
    }

    #[test]
    fn idle_created_worker_leaves_no_record() {
        let (tracer, store) = tracer_with_store();
        let worker = TracedWorker::new(&tracer);
        drop(worker);
        assert!(store.spans().unwrap().is_empty());
    }

    #[test]
    fn drop_after_shutdown_reports_once() {
        let (tracer, store) = tracer_with_store();
        let worker = TracedWorker::new(&tracer);
        worker.run(|| ());
        worker.shutdown();
        assert_eq!(store.spans().unwrap().len(), 1);
    }
}
