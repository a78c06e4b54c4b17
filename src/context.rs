use crate::trace::{Span, SpanContext};
use futures_core::stream::Stream;
use pin_project_lite::pin_project;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

/// An execution-scoped, immutable collection of values.
///
/// A `Context` carries the active [`Span`] plus arbitrary application
/// values across API boundaries and between logically associated execution
/// units. Write operations return a new context; existing contexts are
/// never mutated, so a captured context is a stable snapshot no matter
/// which thread later replays it.
///
/// For blocking code the current context lives in a thread local and is
/// managed with [`attach`], which returns a [`ContextGuard`] restoring the
/// previous context on drop. For async pipelines the context is carried as
/// a value inside [`WithContext`] and re-attached around every poll, so
/// execution may hop threads between polls without losing the context.
///
/// [`attach`]: Context::attach()
///
/// # Examples
///
/// ```
/// use spanflow::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct Deadline(u64);
///
/// let _guard = Context::new().with_value(Deadline(30)).attach();
///
/// assert_eq!(Context::current().get::<Deadline>(), Some(&Deadline(30)));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Span>,
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context, returning its value.
    ///
    /// Avoids the clone of [`Context::current`] when only a read is needed.
    ///
    /// Note: this function will panic if another context is attached while
    /// the current one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a clone of the current context with the given value added.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Context::current().with_value(value)
    }

    /// Returns a clone of the current context with the given span active.
    pub fn current_with_span(span: Span) -> Self {
        Context::current().with_span(span)
    }

    /// Returns a reference to the entry of the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// Returns a copy of this context with the new value included.
    ///
    /// Use application-specific types as keys; inserting a value of an
    /// already-present type overwrites the previous entry.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }

    /// Returns a copy of this context with the given span active.
    ///
    /// The span handle is cheap to clone; the returned context and the
    /// caller share the same underlying span recording.
    pub fn with_span(&self, span: Span) -> Self {
        Context {
            span: Some(span),
            entries: self.entries.clone(),
        }
    }

    /// Returns a copy of this context with a remote parent active.
    ///
    /// The remote context is wrapped in a non-recording span handle so that
    /// spans created under this context become its children even though no
    /// local recording exists for the remote side.
    pub fn with_remote_parent(&self, span_context: SpanContext) -> Self {
        self.with_span(Span::from_context(span_context))
    }

    pub(crate) fn with_span_option(&self, span: Option<Span>) -> Self {
        Context {
            span,
            entries: self.entries.clone(),
        }
    }

    /// A reference to the active span of this context, if any.
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    /// A reference to the active span's context, if any.
    ///
    /// `None` means "no ambient trace here", which is a normal state and
    /// not an error.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref().map(|s| s.context())
    }

    /// Replaces the current context on this thread with this context.
    ///
    /// Dropping the returned [`ContextGuard`] restores the context that was
    /// current immediately before this call, so nested attachments behave
    /// like a stack:
    ///
    /// ```
    /// use spanflow::Context;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct ValueA(&'static str);
    ///
    /// let cx_guard = Context::new().with_value(ValueA("a")).attach();
    /// assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA("a")));
    ///
    /// drop(cx_guard);
    /// assert_eq!(Context::current().get::<ValueA>(), None);
    /// ```
    pub fn attach(self) -> ContextGuard {
        let previous_cx = CURRENT_CONTEXT
            .try_with(|current| current.replace(self))
            .ok();

        ContextGuard {
            previous_cx,
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span", &self.span_context())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[allow(missing_debug_implementations)]
pub struct ContextGuard {
    previous_cx: Option<Context>,
    // ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous_cx) = self.previous_cx.take() {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous_cx));
        }
    }
}

pin_project! {
    /// A future or stream that has an associated context.
    ///
    /// The captured context is attached as current around every poll and
    /// detached afterwards, so nested span creation inside the wrapped
    /// work parents correctly even when polls land on different threads.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: Context,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.clone().attach();

        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.clone().attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<T: Sized> FutureExt for T {}

/// Extension trait allowing futures and streams to carry a context.
pub trait FutureExt: Sized {
    /// Attaches the provided [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    ///
    /// The attached context will be set as current while the wrapped
    /// future or stream is being polled.
    fn with_context(self, cx: Context) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the current [`Context`] to this type, returning a
    /// [`WithContext`] wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let cx = Context::current();
        self.with_context(cx)
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher holds the u64
/// of the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct ValueA(&'static str);
        #[derive(Debug, PartialEq)]
        struct ValueB(u64);
        let _outer_guard = Context::new().with_value(ValueA("a")).attach();

        // Only value `a` is set
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);

        {
            let _inner_guard = Context::current_with_value(ValueB(42)).attach();
            // Both values are set in inner context
            let current = Context::current();
            assert_eq!(current.get(), Some(&ValueA("a")));
            assert_eq!(current.get(), Some(&ValueB(42)));
        }

        // Resets to only value `a` when inner guard is dropped
        let current = Context::current();
        assert_eq!(current.get(), Some(&ValueA("a")));
        assert_eq!(current.get::<ValueB>(), None);
    }

    #[test]
    fn future_poll_sees_attached_context() {
        use std::future::Future;
        use std::task::{Context as TaskContext, Poll};

        #[derive(Debug, PartialEq)]
        struct Marker(&'static str);

        struct Check;
        impl Future for Check {
            type Output = bool;

            fn poll(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<bool> {
                Poll::Ready(Context::current().get::<Marker>() == Some(&Marker("here")))
            }
        }

        let cx = Context::new().with_value(Marker("here"));
        let seen = futures_executor::block_on(Check.with_context(cx));
        assert!(seen);
        // the wrapped poll must not leak the context
        assert_eq!(Context::current().get::<Marker>(), None);
    }
}
