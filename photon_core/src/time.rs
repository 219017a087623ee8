// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic time sources and host tick conversion.
//!
//! Every prediction in this crate works in absolute seconds (`f64`) on a single
//! monotonic clock. [`TimeSource`] is the seam through which that clock is
//! read; platform crates implement it on top of their native tick counters.
//!
//! [`HostTime`] represents a point in time as platform-native monotonic ticks
//! and [`Timebase`] carries the rational conversion factor from ticks to
//! nanoseconds (numer/denom, matching `mach_timebase_info`).
//! [`HostTime::to_seconds`] bridges the two worlds.
//!
//! [`ManualClock`] is a shareable, manually advanced clock used by simulations
//! and tests.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// A monotonic wall clock reporting absolute time in seconds.
///
/// Implementations must never go backwards. The epoch is arbitrary but must be
/// shared by every timestamp fed into the same timing pipeline.
pub trait TimeSource {
    /// Returns the current time in seconds.
    fn now_seconds(&self) -> f64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    #[inline]
    fn now_seconds(&self) -> f64 {
        (**self).now_seconds()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    #[inline]
    fn now_seconds(&self) -> f64 {
        (**self).now_seconds()
    }
}

/// A manually advanced clock.
///
/// Clones share the same underlying time, so a simulation can hold one handle
/// and advance it while readers on other threads observe the new value.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `seconds`.
    #[must_use]
    pub fn new(seconds: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        }
    }

    /// Sets the current time.
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// Advances the current time by `seconds`.
    pub fn advance(&self, seconds: f64) {
        // Single logical writer; a plain load/store pair is enough.
        let now = f64::from_bits(self.bits.load(Ordering::Acquire));
        self.set(now + seconds);
    }
}

impl TimeSource for ManualClock {
    #[inline]
    fn now_seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManualClock({})", self.now_seconds())
    }
}

/// A point in time expressed as platform-native monotonic ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Converts this host time to nanoseconds using the given timebase.
    ///
    /// Uses `u128` intermediate arithmetic to avoid overflow.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn to_nanos(self, timebase: Timebase) -> u64 {
        let wide = self.0 as u128 * timebase.numer as u128 / timebase.denom as u128;
        wide as u64
    }

    /// Converts this host time to seconds.
    ///
    /// Whole seconds and the nanosecond remainder are converted separately so
    /// that large uptimes keep full sub-microsecond precision.
    #[inline]
    #[must_use]
    pub fn to_seconds(self, timebase: Timebase) -> f64 {
        let nanos = self.to_nanos(timebase);
        let whole = nanos / 1_000_000_000;
        let frac = nanos % 1_000_000_000;
        whole as f64 + frac as f64 * 1e-9
    }

    /// Creates a [`HostTime`] from a nanosecond value and timebase.
    ///
    /// This is the inverse of [`to_nanos`](Self::to_nanos).
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn from_nanos(nanos: u64, timebase: Timebase) -> Self {
        let wide = nanos as u128 * timebase.denom as u128 / timebase.numer as u128;
        Self(wide as u64)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Rational conversion factor from ticks to nanoseconds.
///
/// `nanoseconds = ticks * numer / denom`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator of the ticks-to-nanoseconds ratio.
    pub numer: u32,
    /// Denominator of the ticks-to-nanoseconds ratio.
    pub denom: u32,
}

impl Timebase {
    /// A timebase where ticks are already nanoseconds (1:1).
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Creates a new timebase with the given numerator and denominator.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "timebase denominator must not be zero");
        Self { numer, denom }
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}
