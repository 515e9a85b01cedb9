use std::fmt;

/// Count, sum, minimum, maximum and average of a sequence of integers.
///
/// Built by [`Pipeline::summary_statistics`](super::Pipeline::summary_statistics),
/// or incrementally through [`accept`](Self::accept).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryStatistics {
    count: u64,
    sum: i128,
    min: i64,
    max: i64,
}

impl SummaryStatistics {
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i64::MAX,
            max: i64::MIN,
        }
    }

    pub fn accept(&mut self, value: i64) {
        self.count += 1;
        self.sum += i128::from(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Merges the statistics of another sequence into these.
    pub fn combine(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> i128 {
        self.sum
    }

    /// `None` for an empty sequence.
    pub fn min(&self) -> Option<i64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<i64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

impl Default for SummaryStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<i64> for SummaryStatistics {
    fn extend<T: IntoIterator<Item = i64>>(&mut self, iter: T) {
        for value in iter {
            self.accept(value);
        }
    }
}

impl fmt::Display for SummaryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min(), self.max(), self.average()) {
            (Some(min), Some(max), Some(average)) => write!(
                f,
                "count={}, sum={}, min={min}, average={average:.6}, max={max}",
                self.count, self.sum
            ),
            _ => f.write_str("count=0, sum=0"),
        }
    }
}
