// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host integration for photon.
//!
//! - [`clock`]: the monotonic host clock as a
//!   [`TimeSource`](photon_core::time::TimeSource).
//! - [`shm`]: memory-mapped region publishing the application timing base
//!   record across processes.
//! - [`latency_tester`]: processing of latency sensor pixel readbacks.
//!
//! Lifecycle messages go through the `log` facade.

pub mod clock;
pub mod latency_tester;
pub mod shm;

pub use clock::HostClock;
pub use latency_tester::{LatencyTester, PixelRead, TestResult};
pub use shm::{SharedTimingError, SharedTimingReader, SharedTimingWriter};
