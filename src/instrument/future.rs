use crate::context::Context;
use crate::instrument::PendingSpan;
use crate::trace::Span;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{self, Poll};

pin_project! {
    /// A [`Future`] bound to the lifecycle of a [`Span`].
    ///
    /// Every poll runs with the span's context attached, so code inside
    /// the future sees it as current regardless of which executor thread
    /// runs the poll. The span ends when the future resolves; a future
    /// dropped before resolution cancels it instead. A future that was
    /// never polled leaves no span record at all.
    #[must_use = "futures do nothing unless polled"]
    pub struct TracedFuture<T> {
        #[pin]
        inner: T,
        pending: PendingSpan,
    }

    impl<T> PinnedDrop for TracedFuture<T> {
        fn drop(this: Pin<&mut Self>) {
            // no-op when the future already resolved
            this.project().pending.cancel();
        }
    }
}

impl<T> TracedFuture<T> {
    /// A handle to the wrapped span, e.g. for tagging an error on a
    /// result before the future resolves.
    pub fn span(&self) -> &Span {
        self.pending.span()
    }
}

impl<T: Future> Future for TracedFuture<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        this.pending.mark_requested();
        let cx = Context::current_with_span(this.pending.span().clone());
        let _guard = cx.attach();
        let poll = this.inner.poll(task_cx);
        if poll.is_ready() {
            this.pending.complete();
        }
        poll
    }
}

pin_project! {
    /// A [`Stream`] bound to the lifecycle of a [`Span`].
    ///
    /// Same rules as [`TracedFuture`], with exhaustion (`None`) as the
    /// successful terminal state.
    #[must_use = "streams do nothing unless polled"]
    pub struct TracedStream<T> {
        #[pin]
        inner: T,
        pending: PendingSpan,
    }

    impl<T> PinnedDrop for TracedStream<T> {
        fn drop(this: Pin<&mut Self>) {
            this.project().pending.cancel();
        }
    }
}

impl<T> TracedStream<T> {
    /// A handle to the wrapped span.
    pub fn span(&self) -> &Span {
        self.pending.span()
    }
}

impl<T: Stream> Stream for TracedStream<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut task::Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        this.pending.mark_requested();
        let cx = Context::current_with_span(this.pending.span().clone());
        let _guard = cx.attach();
        let poll = this.inner.poll_next(task_cx);
        if matches!(poll, Poll::Ready(None)) {
            this.pending.complete();
        }
        poll
    }
}

/// Extension trait allowing spans to follow futures across await points
/// and executor threads.
pub trait TraceFutureExt: Sized {
    /// Binds this future to `span`: the span is current during every
    /// poll, ends when the future resolves, and is cancelled if the
    /// future is dropped mid-flight.
    fn in_span(self, span: Span) -> TracedFuture<Self>;
}

impl<T: Future> TraceFutureExt for T {
    fn in_span(self, span: Span) -> TracedFuture<Self> {
        TracedFuture {
            inner: self,
            pending: PendingSpan::new(span),
        }
    }
}

/// Extension trait allowing spans to follow streams across await points.
pub trait TraceStreamExt: Sized {
    /// Binds this stream to `span`; the span ends when the stream is
    /// exhausted and is cancelled if the stream is dropped before that.
    fn in_span(self, span: Span) -> TracedStream<Self>;
}

impl<T: Stream> TraceStreamExt for T {
    fn in_span(self, span: Span) -> TracedStream<Self> {
        TracedStream {
            inner: self,
            pending: PendingSpan::new(span),
        }
    }
}
