// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame timing, latency tracking and pose prediction timing for head-mounted
//! displays.
//!
//! `photon_core` predicts, for each rendered frame, when its pixels will
//! actually be lit on the headset panel, so that head pose can be sampled for
//! that instant. It is `no_std` compatible (with `alloc`); every algorithm
//! works in absolute seconds on a single monotonic [`TimeSource`](time::TimeSource).
//!
//! # Architecture
//!
//! Two threads cooperate through lock-free snapshots:
//!
//! ```text
//!   render thread                              time-warp thread
//!   ─────────────                              ────────────────
//!   FrameTimeManager::begin_frame()            TimewarpTimer::calculate_timewarp_timing()
//!        │  Timing snapshot ──► readers             │  LocklessAppTimingBase ──► AppRenderTimer
//!        ▼                                           ▼
//!   eye_prediction_pose() / timewarp_matrices()  JIT start, scanout, eye windows
//!        │                                           │
//!   end_frame() ─► frame deltas                 DisplayFrameClock ─► vsync interval
//!        │
//!   update_frame_latency_tracking_after_end_frame()
//!        └──► FrameLatencyTracker ─► measured vsync → scanout delay
//! ```
//!
//! **[`delta`]**: Fixed-capacity ring of time deltas with an upper median.
//!
//! **[`record`]**: Frame readback records and the color tag mapping used by
//! the latency tester.
//!
//! **[`latency`]**: State machine matching tagged frame colors against
//! readback data to measure real scanout latency.
//!
//! **[`lockless`]**: Single-writer, multi-reader seqlock snapshot over
//! `AtomicU64` words, usable over shared memory.
//!
//! **[`display`]**: Shutter geometry and per-eye time helpers.
//!
//! **[`pose`]**: Quaternion, pose and matrix value types.
//!
//! **[`frame_timing`]**: [`FrameTimeManager`](frame_timing::FrameTimeManager),
//! the render thread's frame timeline and time-warp prediction.
//!
//! **[`app_timing`]**: The cross-thread base record schema,
//! [`AppRenderTimer`](app_timing::AppRenderTimer) and the prediction history.
//!
//! **[`compositor`]**: [`TimewarpTimer`](compositor::TimewarpTimer), the
//! producer of the base record.
//!
//! **[`time`]**: [`TimeSource`](time::TimeSource), a manual clock, and host
//! tick conversion.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies and
//!   the lock-protected
//!   [`SharedAppTimingHistory`](app_timing::SharedAppTimingHistory).
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-eye
//!   prediction and time delta sample events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod app_timing;
pub mod compositor;
pub mod delta;
pub mod display;
pub mod frame_timing;
pub mod latency;
pub mod lockless;
pub mod pose;
pub mod record;
pub mod time;
pub mod trace;
