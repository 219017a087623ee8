// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock selection and reads.

use photon_core::time::{HostTime, TimeSource, Timebase};
use rustix::time::{ClockId as PosixClockId, Timespec, clock_gettime};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Clock source used for timing timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Clock {
    /// `CLOCK_MONOTONIC`.
    #[default]
    Monotonic,
    /// A clock chosen by the display stack, such as the one its vsync
    /// timestamps are reported in.
    Display(PosixClockId),
}

impl Clock {
    #[must_use]
    const fn posix_clock_id(self) -> PosixClockId {
        match self {
            Self::Monotonic => PosixClockId::Monotonic,
            Self::Display(clock_id) => clock_id,
        }
    }
}

/// Returns the host [`Timebase`]: host ticks are nanoseconds.
#[must_use]
pub const fn timebase() -> Timebase {
    Timebase::NANOS
}

/// Returns the current monotonic host time in nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    now_for_clock(Clock::Monotonic)
}

/// Returns the current time of `clock` in nanoseconds.
#[must_use]
pub fn now_for_clock(clock: Clock) -> HostTime {
    let timespec = clock_gettime(clock.posix_clock_id());
    timespec_to_host_time(timespec)
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);

    let ticks_u128 = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    let ticks = u64::try_from(ticks_u128).unwrap_or(u64::MAX);
    HostTime(ticks)
}

/// A [`TimeSource`] reading a host clock in seconds.
///
/// Every process on the machine reading the same clock shares one epoch, so
/// times published through the shared timing region stay comparable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostClock {
    clock: Clock,
}

impl HostClock {
    /// A clock reading `CLOCK_MONOTONIC`.
    #[must_use]
    pub const fn monotonic() -> Self {
        Self {
            clock: Clock::Monotonic,
        }
    }

    /// A clock reading `clock`.
    #[must_use]
    pub const fn new(clock: Clock) -> Self {
        Self { clock }
    }
}

impl TimeSource for HostClock {
    fn now_seconds(&self) -> f64 {
        now_for_clock(self.clock).to_seconds(timebase())
    }
}
