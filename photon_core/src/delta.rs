// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity median filter for noisy time deltas.
//!
//! Hardware timing signals (present-to-present intervals, scanout readbacks,
//! GPU timestamps for the distortion pass) jitter by a fraction of a
//! millisecond and occasionally spike by whole frames. [`TimeDeltaCollector`]
//! keeps the most recent samples in insertion order and reports their ordinal
//! median, which ignores isolated spikes entirely.

/// Capacity used by the frame timing pipeline's collectors.
pub const DEFAULT_CAPACITY: usize = 12;

/// Summary statistics over the samples in a [`TimeDeltaCollector`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeltaStats {
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Ordinal median, see [`TimeDeltaCollector::median`].
    pub median: f64,
}

/// Ring of the last `N` non-negative time deltas, in seconds.
///
/// When full, adding a sample evicts the oldest one. Samples are kept in
/// insertion order (oldest first).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeDeltaCollector<const N: usize = DEFAULT_CAPACITY> {
    samples: [f64; N],
    count: usize,
}

impl<const N: usize> Default for TimeDeltaCollector<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TimeDeltaCollector<N> {
    /// Maximum number of samples retained.
    pub const CAPACITY: usize = N;

    /// Creates an empty collector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples: [0.0; N],
            count: 0,
        }
    }

    /// Adds a sample, evicting the oldest one if the collector is full.
    ///
    /// Negative and NaN samples are ignored.
    pub fn add_time_delta(&mut self, seconds: f64) {
        if !(seconds >= 0.0) || N == 0 {
            return;
        }
        if self.count == N {
            self.samples.copy_within(1.., 0);
            self.count -= 1;
        }
        self.samples[self.count] = seconds;
        self.count += 1;
    }

    /// Removes every sample.
    #[inline]
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Number of samples currently held.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` when no samples are held.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns `true` once `N` samples are held.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.count == N
    }

    /// The held samples, oldest first.
    #[inline]
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples[..self.count]
    }

    /// Returns the ordinal median of the held samples, or `0.0` when empty.
    ///
    /// The samples are ordered with a stable selection scan and the element at
    /// `count / 2` is returned, so an even count yields the upper of the two
    /// middle values rather than their average. Prediction formulas downstream
    /// depend on this tie-break.
    #[must_use]
    pub fn median(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted = [0.0; N];
        let mut used = [false; N];
        for slot in sorted.iter_mut().take(self.count) {
            let mut smallest = f64::INFINITY;
            let mut index = 0;
            for (j, &sample) in self.samples().iter().enumerate() {
                if !used[j] && sample < smallest {
                    smallest = sample;
                    index = j;
                }
            }
            used[index] = true;
            *slot = smallest;
        }
        sorted[self.count / 2]
    }

    /// Returns min/max/mean/median, or `None` when empty.
    #[must_use]
    pub fn stats(&self) -> Option<DeltaStats> {
        let samples = self.samples();
        let (&first, rest) = samples.split_first()?;
        let (mut min, mut max, mut sum) = (first, first, first);
        for &s in rest {
            min = min.min(s);
            max = max.max(s);
            sum += s;
        }
        Some(DeltaStats {
            min,
            max,
            mean: sum / samples.len() as f64,
            median: self.median(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_median_is_zero() {
        let c = TimeDeltaCollector::<8>::new();
        assert_eq!(c.median(), 0.0, "empty collector reports zero");
        assert!(c.stats().is_none(), "no stats without samples");
    }

    #[test]
    fn overflow_keeps_last_capacity_in_order() {
        let mut c = TimeDeltaCollector::<8>::new();
        for i in 0..20 {
            c.add_time_delta(f64::from(i));
        }
        assert_eq!(c.count(), 8, "count is capped at capacity");
        assert!(c.is_full(), "collector reports full");
        let expected: [f64; 8] = [12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0];
        assert_eq!(c.samples(), &expected, "last 8 samples in insertion order");
    }

    #[test]
    fn median_is_upper_middle_for_even_counts() {
        let mut c = TimeDeltaCollector::<8>::new();
        for v in [0.4, 0.1, 0.3, 0.2] {
            c.add_time_delta(v);
        }
        // Sorted: 0.1 0.2 0.3 0.4 -> index 2.
        assert_eq!(c.median(), 0.3, "count/2 picks the upper middle");
    }

    #[test]
    fn median_odd_count_and_duplicates() {
        let mut c = TimeDeltaCollector::<8>::new();
        for v in [0.011, 0.009, 0.011, 0.050, 0.011] {
            c.add_time_delta(v);
        }
        assert_eq!(c.median(), 0.011, "spike and low outlier are ignored");

        let mut same = TimeDeltaCollector::<8>::new();
        for _ in 0..6 {
            same.add_time_delta(0.0111);
        }
        assert_eq!(same.median(), 0.0111, "duplicates are deterministic");
    }

    #[test]
    fn median_after_eviction_uses_window_only() {
        let mut c = TimeDeltaCollector::<8>::new();
        // Old large values get evicted entirely.
        for _ in 0..8 {
            c.add_time_delta(1.0);
        }
        for v in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8] {
            c.add_time_delta(v);
        }
        assert_eq!(c.median(), 0.5, "sorted index 4 of the current window");
    }

    #[test]
    fn negative_and_nan_samples_are_no_ops() {
        let mut c = TimeDeltaCollector::<8>::new();
        c.add_time_delta(0.5);
        c.add_time_delta(0.25);
        let before = c;
        c.add_time_delta(-1.0);
        c.add_time_delta(f64::NAN);
        assert_eq!(c, before, "invalid samples leave state untouched");
    }

    #[test]
    fn zero_is_a_valid_sample() {
        let mut c = TimeDeltaCollector::<4>::new();
        c.add_time_delta(0.0);
        assert_eq!(c.count(), 1, "zero is accepted");
    }

    #[test]
    fn stats_summarize_window() {
        let mut c = TimeDeltaCollector::<8>::new();
        for v in [2.0, 4.0, 6.0] {
            c.add_time_delta(v);
        }
        let stats = c.stats().unwrap();
        assert_eq!(stats.min, 2.0, "min");
        assert_eq!(stats.max, 6.0, "max");
        assert_eq!(stats.mean, 4.0, "mean");
        assert_eq!(stats.median, 4.0, "median");
    }

    #[test]
    fn clear_empties() {
        let mut c = TimeDeltaCollector::<8>::new();
        c.add_time_delta(1.0);
        c.clear();
        assert!(c.is_empty(), "cleared collector is empty");
        assert_eq!(c.median(), 0.0, "cleared median is zero");
    }
}
