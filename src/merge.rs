//! Deduplicating merger.
//!
//! Combines records from any number of sources into one corpus keyed by
//! [`Keyed::merge_key`]. The corpus keeps first-appearance order and the
//! first record seen for a key wins: later duplicates are discarded even
//! when their metrics are newer. Refreshing merged records is explicitly
//! not supported.
//!
//! The seen-set is built once from the existing corpus, so a merge costs
//! O(existing + incoming).

use std::collections::HashSet;

use crate::models::{Dataset, Keyed};

/// Counts produced by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub appended: usize,
    pub discarded: usize,
}

impl MergeStats {
    fn absorb(&mut self, other: MergeStats) {
        self.appended += other.appended;
        self.discarded += other.discarded;
    }
}

/// Per-corpus merge counts for a [`Dataset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetMergeStats {
    pub videos: MergeStats,
    pub comments: MergeStats,
}

impl DatasetMergeStats {
    pub fn absorb(&mut self, other: DatasetMergeStats) {
        self.videos.absorb(other.videos);
        self.comments.absorb(other.comments);
    }
}

/// Incremental merger over a borrowed corpus.
///
/// Batches are merged in the order [`Merger::merge_batch`] is called, which
/// is how source priority is expressed.
pub struct Merger<'a, R: Keyed> {
    corpus: &'a mut Vec<R>,
    seen: HashSet<String>,
    stats: MergeStats,
}

impl<'a, R: Keyed> Merger<'a, R> {
    pub fn new(corpus: &'a mut Vec<R>) -> Self {
        let seen = corpus.iter().map(|r| r.merge_key().into_owned()).collect();
        Self {
            corpus,
            seen,
            stats: MergeStats::default(),
        }
    }

    /// Append every record whose key has not been seen yet. Returns the
    /// number appended from this batch.
    pub fn merge_batch<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = R>,
    {
        let mut appended = 0;
        for record in batch {
            let key = record.merge_key().into_owned();
            if self.seen.insert(key) {
                self.corpus.push(record);
                appended += 1;
            } else {
                self.stats.discarded += 1;
            }
        }
        self.stats.appended += appended;
        appended
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn finish(self) -> MergeStats {
        self.stats
    }
}

/// Merge one batch into `corpus`.
pub fn merge_into<R, I>(corpus: &mut Vec<R>, batch: I) -> MergeStats
where
    R: Keyed,
    I: IntoIterator<Item = R>,
{
    let mut merger = Merger::new(corpus);
    merger.merge_batch(batch);
    merger.finish()
}

/// Merge both corpora of `incoming` into `target`.
pub fn merge_dataset(target: &mut Dataset, incoming: Dataset) -> DatasetMergeStats {
    DatasetMergeStats {
        videos: merge_into(&mut target.videos, incoming.videos),
        comments: merge_into(&mut target.comments, incoming.comments),
    }
}
