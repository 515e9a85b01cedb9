//! The lazy stages a [`Pipeline`](super::Pipeline) is built from.
//!
//! Every stage is an [`Iterator`] that owns the stage before it. Pulling
//! one element from the last stage pulls at most one element from each
//! upstream stage, and a stage never holds more than the output of a
//! single upstream element.

use std::collections::VecDeque;
use std::iter::Fuse;

/// Head of a pipeline, wrapping the source sequence.
///
/// The source is fused: once it reports exhaustion it is never polled
/// again.
#[derive(Debug, Clone)]
pub struct Source<I> {
    inner: Fuse<I>,
}

impl<I: Iterator> Source<I> {
    pub(crate) fn new(inner: I) -> Self {
        Self {
            inner: inner.fuse(),
        }
    }
}

impl<I: Iterator> Iterator for Source<I> {
    type Item = I::Item;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Keeps the elements matching a predicate.
///
/// Equivalent to an [`Expand`] emitting zero or one unchanged element.
#[derive(Clone)]
pub struct Filter<S, P> {
    upstream: S,
    predicate: P,
}

impl<S, P> Filter<S, P> {
    pub(crate) fn new(upstream: S, predicate: P) -> Self {
        Self {
            upstream,
            predicate,
        }
    }
}

impl<S, P> Iterator for Filter<S, P>
where
    S: Iterator,
    P: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.upstream.next()?;
            if (self.predicate)(&item) {
                return Some(item);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.upstream.size_hint().1)
    }
}

/// Transforms every element.
///
/// Equivalent to an [`Expand`] emitting exactly one element.
#[derive(Clone)]
pub struct Map<S, F> {
    upstream: S,
    mapper: F,
}

impl<S, F> Map<S, F> {
    pub(crate) fn new(upstream: S, mapper: F) -> Self {
        Self { upstream, mapper }
    }
}

impl<S, F, U> Iterator for Map<S, F>
where
    S: Iterator,
    F: FnMut(S::Item) -> U,
{
    type Item = U;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.upstream.next().map(&mut self.mapper)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.upstream.size_hint()
    }
}

/// Turns every element into a lazy sequence of zero or more elements.
///
/// The expansion of one upstream element is drained completely, in order,
/// before the next upstream element is pulled.
pub struct Expand<S, F, C: IntoIterator> {
    upstream: S,
    expander: F,

    /// Remaining output of the current upstream element.
    pending: Option<C::IntoIter>,
}

impl<S, F, C: IntoIterator> Expand<S, F, C> {
    pub(crate) fn new(upstream: S, expander: F) -> Self {
        Self {
            upstream,
            expander,
            pending: None,
        }
    }
}

impl<S, F, C> Iterator for Expand<S, F, C>
where
    S: Iterator,
    F: FnMut(S::Item) -> C,
    C: IntoIterator,
{
    type Item = C::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pending) = &mut self.pending {
                if let Some(item) = pending.next() {
                    return Some(item);
                }
                self.pending = None;
            }

            let item = self.upstream.next()?;
            self.pending = Some((self.expander)(item).into_iter());
        }
    }
}

/// Sink handed to a [`MapMulti`] mapper.
///
/// Elements pushed here are delivered downstream in push order, once the
/// mapper returns.
#[derive(Debug)]
pub struct Downstream<U> {
    buffer: VecDeque<U>,
}

impl<U> Downstream<U> {
    pub fn push(&mut self, item: U) {
        self.buffer.push_back(item);
    }

    /// Number of elements pushed for the current upstream element that
    /// have not been delivered yet.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<U> Extend<U> for Downstream<U> {
    fn extend<T: IntoIterator<Item = U>>(&mut self, iter: T) {
        self.buffer.extend(iter);
    }
}

/// Push-style expansion: the mapper receives each element together with a
/// [`Downstream`] and pushes zero or more outputs into it.
pub struct MapMulti<S, F, U> {
    upstream: S,
    mapper: F,
    downstream: Downstream<U>,
}

impl<S, F, U> MapMulti<S, F, U> {
    pub(crate) fn new(upstream: S, mapper: F) -> Self {
        Self {
            upstream,
            mapper,
            downstream: Downstream {
                buffer: VecDeque::new(),
            },
        }
    }
}

impl<S, F, U> Iterator for MapMulti<S, F, U>
where
    S: Iterator,
    F: FnMut(S::Item, &mut Downstream<U>),
{
    type Item = U;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.downstream.buffer.pop_front() {
                return Some(item);
            }

            let item = self.upstream.next()?;
            (self.mapper)(item, &mut self.downstream);
        }
    }
}
