//! Static split of the query axis across workers.
//!
//! Every worker owns one contiguous range of `ceil(queries / workers)`
//! queries; the tail range may be shorter or empty. There is no work
//! stealing between ranges.

use std::ops::Range;

use crate::{MsdaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    total: usize,
    workers: usize,
    chunk: usize,
}

impl WorkPartition {
    pub fn new(total: usize, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(MsdaError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(Self {
            total,
            workers,
            chunk: total.div_ceil(workers),
        })
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queries per worker, except possibly the last non-empty range.
    pub fn chunk_len(&self) -> usize {
        self.chunk
    }

    /// Query range owned by `worker`. Empty for workers past the tail.
    pub fn range(&self, worker: usize) -> Range<usize> {
        let start = (worker * self.chunk).min(self.total);
        let end = ((worker + 1) * self.chunk).min(self.total);
        start..end
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.workers).map(|w| self.range(w))
    }

    /// Number of workers that own at least one query.
    pub fn active_workers(&self) -> usize {
        if self.chunk == 0 {
            0
        } else {
            self.total.div_ceil(self.chunk)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_rejected() {
        assert!(WorkPartition::new(10, 0).is_err());
    }

    #[test]
    fn uneven_split_has_short_tail() {
        let p = WorkPartition::new(10, 4).unwrap();
        let ranges: Vec<_> = p.ranges().collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(p.active_workers(), 4);
    }

    #[test]
    fn surplus_workers_get_empty_ranges() {
        let p = WorkPartition::new(9, 4).unwrap();
        let ranges: Vec<_> = p.ranges().collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..9]);
        assert_eq!(p.active_workers(), 3);
    }

    #[test]
    fn no_queries() {
        let p = WorkPartition::new(0, 3).unwrap();
        assert!(p.ranges().all(|r| r.is_empty()));
        assert_eq!(p.active_workers(), 0);
    }
}
