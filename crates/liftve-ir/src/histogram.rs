//! Histograms over the range of a counted function, and their ranking.
//!
//! A [`HistogramType`] with `b` buckets and total `n` has
//! `multichoose(b, n)` members. They are ranked so that index 0 holds every
//! item in bucket 0 and later indices trickle items towards the last bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, Result};

/// Number of ways to choose `k` items from `n` buckets with repetition,
/// `C(n + k - 1, n - 1)`. Saturates at `usize::MAX`.
pub fn multichoose(n: usize, k: usize) -> usize {
    if n == 0 {
        return usize::from(k == 0);
    }
    binomial(n + k - 1, n - 1)
}

fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > usize::MAX as u128 {
            return usize::MAX;
        }
    }
    acc as usize
}

/// `ln(n!)`.
pub fn log_factorial(n: usize) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

/// Counts of items per bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Histogram {
    counts: Vec<usize>,
}

impl Histogram {
    pub fn new(counts: Vec<usize>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Items in `bucket`, or `None` past the last bucket.
    pub fn count(&self, bucket: usize) -> Option<usize> {
        self.counts.get(bucket).copied()
    }

    pub fn num_buckets(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// A copy with one more item in `bucket`.
    pub fn increment(&self, bucket: usize) -> Result<Histogram> {
        let mut counts = self.counts.clone();
        let slot = counts.get_mut(bucket).ok_or(IrError::HistogramIndexOutOfRange {
            index: bucket,
            buckets: self.num_buckets(),
            total: self.total(),
        })?;
        *slot += 1;
        Ok(Histogram::new(counts))
    }

    /// `total! / Π counts[i]!`, the number of assignments of `total`
    /// distinguishable items producing this histogram.
    pub fn multinomial_coefficient(&self, total: usize) -> f64 {
        let denom: f64 = self.counts.iter().map(|c| log_factorial(*c)).sum();
        (log_factorial(total) - denom).exp()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.counts)
    }
}

/// The set of histograms with a fixed number of buckets and total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistogramType {
    buckets: usize,
    total: usize,
}

impl HistogramType {
    pub fn new(buckets: usize, total: usize) -> Self {
        Self { buckets, total }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn size(&self) -> usize {
        multichoose(self.buckets, self.total)
    }

    /// The histogram of rank `index`.
    pub fn nth(&self, index: usize) -> Result<Histogram> {
        let mut counts = vec![0; self.buckets];
        if self.buckets > 0 && set_to_nth(&mut counts, index, self.total) {
            Ok(Histogram::new(counts))
        } else {
            Err(IrError::HistogramIndexOutOfRange {
                index,
                buckets: self.buckets,
                total: self.total,
            })
        }
    }

    /// Rank of `hist`.
    pub fn index_of(&self, hist: &Histogram) -> Result<usize> {
        let mismatch = || IrError::HistogramMismatch {
            counts: hist.counts.clone(),
            buckets: self.buckets,
            total: self.total,
        };
        if hist.num_buckets() != self.buckets || self.buckets == 0 {
            return Err(mismatch());
        }
        histogram_index(&hist.counts, self.total).ok_or_else(mismatch)
    }

    /// All members in rank order.
    pub fn iter(&self) -> HistogramIter {
        HistogramIter::new(self.buckets, self.total)
    }
}

impl fmt::Display for HistogramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hist[{} buckets, total {}]", self.buckets, self.total)
    }
}

fn set_to_nth(counts: &mut [usize], mut index: usize, sum: usize) -> bool {
    if counts.len() == 1 {
        counts[0] = sum;
        return index == 0;
    }
    for c in (0..=sum).rev() {
        let with_prefix = multichoose(counts.len() - 1, sum - c);
        if index < with_prefix {
            counts[0] = c;
            return set_to_nth(&mut counts[1..], index, sum - c);
        }
        index -= with_prefix;
    }
    false
}

fn histogram_index(counts: &[usize], sum: usize) -> Option<usize> {
    if counts.len() == 1 {
        return (counts[0] == sum).then_some(0);
    }
    if counts[0] > sum {
        return None;
    }
    let skipped: usize = (counts[0] + 1..=sum)
        .map(|c| multichoose(counts.len() - 1, sum - c))
        .sum();
    histogram_index(&counts[1..], sum - counts[0]).map(|offset| skipped + offset)
}

/// Rank-order iterator over a [`HistogramType`].
#[derive(Clone, Debug)]
pub struct HistogramIter {
    counts: Vec<usize>,
    total: usize,
    next_to_change: isize,
    started: bool,
    done: bool,
}

impl HistogramIter {
    fn new(buckets: usize, total: usize) -> Self {
        let mut counts = vec![0; buckets];
        if let Some(first) = counts.first_mut() {
            *first = total;
        }
        Self {
            counts,
            total,
            next_to_change: 0,
            started: false,
            done: buckets == 0,
        }
    }
}

impl Iterator for HistogramIter {
    type Item = Histogram;

    fn next(&mut self) -> Option<Histogram> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(Histogram::new(self.counts.clone()));
        }
        let last = self.counts.len() - 1;
        if self.counts[last] >= self.total {
            self.done = true;
            return None;
        }
        while self.next_to_change >= 0
            && (self.next_to_change as usize >= last || self.counts[self.next_to_change as usize] == 0)
        {
            self.next_to_change -= 1;
        }
        if self.next_to_change < 0 {
            self.done = true;
            return None;
        }
        let i = self.next_to_change as usize;
        self.counts[i] -= 1;
        if i + 1 == last {
            self.counts[last] += 1;
        } else {
            // move the item along with everything piled up in the last bucket
            self.counts[i + 1] = self.counts[last] + 1;
            self.counts[last] = 0;
            self.next_to_change += 1;
        }
        Some(Histogram::new(self.counts.clone()))
    }
}
