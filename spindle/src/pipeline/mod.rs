//! Lazy, order-preserving transformation pipelines.
//!
//! A pipeline starts at [`source`] and is extended with stages. Each stage
//! may turn one element into zero, one or many elements:
//! - [`Pipeline::filter`] emits zero or one,
//! - [`Pipeline::map`] emits exactly one,
//! - [`Pipeline::expand`] and [`Pipeline::map_multi`] emit any number.
//!
//! Nothing happens until a terminal operation runs. The terminal pulls one
//! source element at a time and drains its whole expansion, in order,
//! before pulling the next one, so an unbounded source is fine as long as
//! the terminal stops early (see [`Pipeline::for_each`]).
//!
//! Terminals consume the pipeline: a traversal cannot be repeated, a fresh
//! pipeline has to be built from a fresh source instead.
//!
//! Pipelines run synchronously on the calling thread and are independent
//! of the task runtime.
//!
//! # Examples
//!
//! ```rust
//! use spindle::pipeline::source;
//!
//! let out = source([1, 2, 3, 4, 5, 6])
//!     .expand(|x| if x % 2 == 1 { vec![x, x] } else { vec![] })
//!     .to_vec();
//!
//! assert_eq!(out, [1, 1, 3, 3, 5, 5]);
//! ```

mod stage;
mod stats;

pub use stage::{Downstream, Expand, Filter, Map, MapMulti, Source};
pub use stats::SummaryStatistics;

use std::fmt::{self, Display, Write};
use std::ops::ControlFlow;

/// Starts a pipeline over `seq`.
pub fn source<I: IntoIterator>(seq: I) -> Pipeline<Source<I::IntoIter>> {
    Pipeline {
        stage: Source::new(seq.into_iter()),
    }
}

/// A chain of lazy stages ending in `S`.
#[must_use = "pipelines are lazy and do nothing until a terminal operation runs"]
pub struct Pipeline<S> {
    stage: S,
}

/// Outcome of [`Pipeline::for_each`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traversal {
    /// Number of elements handed to the sink.
    pub delivered: usize,

    /// `true` if the source ran dry, `false` if the sink stopped first.
    pub exhausted: bool,
}

impl<S: Iterator> Pipeline<S> {
    pub fn filter<P>(self, predicate: P) -> Pipeline<Filter<S, P>>
    where
        P: FnMut(&S::Item) -> bool,
    {
        Pipeline {
            stage: Filter::new(self.stage, predicate),
        }
    }

    pub fn map<U, F>(self, mapper: F) -> Pipeline<Map<S, F>>
    where
        F: FnMut(S::Item) -> U,
    {
        Pipeline {
            stage: Map::new(self.stage, mapper),
        }
    }

    /// Replaces every element by the elements of the sequence `expander`
    /// returns for it, in that sequence's order.
    pub fn expand<C, F>(self, expander: F) -> Pipeline<Expand<S, F, C>>
    where
        C: IntoIterator,
        F: FnMut(S::Item) -> C,
    {
        Pipeline {
            stage: Expand::new(self.stage, expander),
        }
    }

    /// Same as [`expand`](Self::expand).
    pub fn flat_map<C, F>(self, expander: F) -> Pipeline<Expand<S, F, C>>
    where
        C: IntoIterator,
        F: FnMut(S::Item) -> C,
    {
        self.expand(expander)
    }

    /// Push-style expansion.
    ///
    /// `mapper` receives every element along with a [`Downstream`] and may
    /// push any number of outputs into it.
    ///
    /// ```rust
    /// use spindle::pipeline::source;
    ///
    /// let out = source(["a,b", "", "c"])
    ///     .map_multi(|line, down| {
    ///         down.extend(line.split(',').filter(|s| !s.is_empty()));
    ///     })
    ///     .to_vec();
    ///
    /// assert_eq!(out, ["a", "b", "c"]);
    /// ```
    pub fn map_multi<U, F>(self, mapper: F) -> Pipeline<MapMulti<S, F, U>>
    where
        F: FnMut(S::Item, &mut Downstream<U>),
    {
        Pipeline {
            stage: MapMulti::new(self.stage, mapper),
        }
    }

    /// Drains a finite pipeline into any collection.
    pub fn collect<C>(self) -> C
    where
        C: FromIterator<S::Item>,
    {
        self.stage.collect()
    }

    pub fn to_vec(self) -> Vec<S::Item> {
        self.collect()
    }

    /// Feeds elements to `sink` until the source is exhausted or the sink
    /// returns [`ControlFlow::Break`].
    ///
    /// No element is pulled from the source after the sink breaks, which
    /// makes this the terminal to use with unbounded sources.
    pub fn for_each<F>(mut self, mut sink: F) -> Traversal
    where
        F: FnMut(S::Item) -> ControlFlow<()>,
    {
        let mut delivered = 0;

        while let Some(item) = self.stage.next() {
            delivered += 1;

            if sink(item).is_break() {
                return Traversal {
                    delivered,
                    exhausted: false,
                };
            }
        }

        Traversal {
            delivered,
            exhausted: true,
        }
    }

    pub fn count(self) -> usize {
        self.stage.count()
    }

    /// Concatenates the `Display` form of every element, separated by
    /// `separator`.
    pub fn joining(self, separator: &str) -> String
    where
        S::Item: Display,
    {
        let mut out = String::new();

        for (i, item) in self.stage.enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            // Writing into a `String` cannot fail.
            let _ = write!(out, "{item}");
        }

        out
    }

    pub fn summary_statistics(self) -> SummaryStatistics
    where
        S::Item: Into<i64>,
    {
        let mut stats = SummaryStatistics::new();
        stats.extend(self.stage.map(Into::into));
        stats
    }
}

impl<S: Iterator> IntoIterator for Pipeline<S> {
    type Item = S::Item;
    type IntoIter = S;

    fn into_iter(self) -> S {
        self.stage
    }
}

impl<S> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;

    #[test]
    fn test_expand_duplicates_odd_and_drops_even() {
        let out = source([1, 2, 3, 4, 5, 6])
            .expand(|x| if x % 2 == 1 { vec![x, x] } else { vec![] })
            .to_vec();

        assert_eq!(out, vec![1, 1, 3, 3, 5, 5]);
    }

    #[test]
    fn test_identity_expand_reproduces_source() {
        let input = vec!["a", "b", "c", "b", "a"];
        let out: Vec<_> = source(input.clone()).expand(|x| [x]).collect();

        assert_eq!(out, input);
    }

    #[test]
    fn test_filter_and_map_match_their_expand_forms() {
        let via_stages = source(0..50).filter(|x| x % 3 == 0).map(|x| x * 10).to_vec();

        let via_expand = source(0..50)
            .expand(|x| (x % 3 == 0).then_some(x))
            .expand(|x| std::iter::once(x * 10))
            .to_vec();

        assert_eq!(via_stages, via_expand);
    }

    #[test]
    fn test_flat_expansion_keeps_nested_order() {
        let out = source(vec![vec![1, 2], vec![], vec![3], vec![4, 5, 6]])
            .flat_map(|inner| inner)
            .to_vec();

        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_one_upstream_element_at_a_time() {
        let log = RefCell::new(Vec::new());

        source(1..=3)
            .map(|x| {
                log.borrow_mut().push(format!("pull {x}"));
                x
            })
            .expand(|x| (0..x).map(move |i| (x, i)))
            .for_each(|(x, i)| {
                log.borrow_mut().push(format!("emit {x}.{i}"));
                ControlFlow::Continue(())
            });

        assert_eq!(
            log.into_inner(),
            vec![
                "pull 1", "emit 1.0", "pull 2", "emit 2.0", "emit 2.1", "pull 3", "emit 3.0",
                "emit 3.1", "emit 3.2",
            ]
        );
    }

    #[test]
    fn test_for_each_stops_an_unbounded_source() {
        let mut seen = Vec::new();
        let pulled = RefCell::new(0u64);

        let traversal = source(1u64..)
            .map(|x| {
                *pulled.borrow_mut() += 1;
                x
            })
            .filter(|x| x % 2 == 0)
            .for_each(|x| {
                seen.push(x);
                if seen.len() == 4 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });

        assert_eq!(seen, vec![2, 4, 6, 8]);
        assert_eq!(traversal, Traversal { delivered: 4, exhausted: false });
        assert_eq!(*pulled.borrow(), 8);
    }

    #[test]
    fn test_for_each_reports_exhaustion() {
        let traversal = source(0..3).for_each(|_| ControlFlow::Continue(()));

        assert_eq!(traversal, Traversal { delivered: 3, exhausted: true });
    }

    #[test]
    fn test_map_multi_pushes_in_order() {
        let out = source(1..=4)
            .map_multi(|x: i32, down| {
                for _ in 0..x % 3 {
                    down.push(x);
                }
            })
            .to_vec();

        assert_eq!(out, vec![1, 2, 2, 4]);
    }

    #[test]
    fn test_joining_and_count() {
        assert_eq!(source(["x", "y", "z"]).joining(", "), "x, y, z");
        assert_eq!(source(Vec::<u8>::new()).joining("-"), "");
        assert_eq!(source(0..10).filter(|x| x % 2 == 1).count(), 5);
    }

    #[test]
    fn test_summary_statistics_over_integers() {
        let stats = source([4i32, -2, 9, 1]).summary_statistics();

        assert_eq!(stats.count(), 4);
        assert_eq!(stats.sum(), 12);
        assert_eq!(stats.min(), Some(-2));
        assert_eq!(stats.max(), Some(9));
        assert_eq!(stats.average(), Some(3.0));

        let empty = source(Vec::<i64>::new()).summary_statistics();
        assert_eq!(empty.count(), 0);
        assert_eq!(empty.min(), None);
        assert_eq!(empty.average(), None);
    }

    #[test]
    fn test_summary_statistics_combine() {
        let mut left = source([1i64, 2]).summary_statistics();
        let right = source([10i64]).summary_statistics();
        left.combine(&right);

        assert_eq!(left.count(), 3);
        assert_eq!(left.max(), Some(10));
        assert_eq!(left.to_string(), "count=3, sum=13, min=1, average=4.333333, max=10");
    }
}
