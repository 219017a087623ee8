// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Application-side timing derived from the compositor's shared base record.
//!
//! In a compositor architecture the time-warp thread owns the display cadence.
//! Once per frame it publishes a [`LocklessAppTimingBase`]: the last frame
//! start it targeted, the vsync reference and the measured delays. Any number
//! of application threads (possibly in other processes) turn a copy of that
//! record into an [`AppTiming`] for whatever frame index they are rendering.
//!
//! ## Wire format
//!
//! The base record has a fixed little-endian layout, independent of pointer
//! width and struct padding, so writer and reader need not share a compiler:
//!
//! ```text
//!   offset  size  field
//!        0     4  is_valid (u32, 0 or 1)
//!        4     4  last_end_frame_index (u32)
//!        8     8  last_start_frame_time (f64)
//!       16     8  last_known_vsync_time (f64)
//!       24     8  vsync_fuzz_factor (f64)
//!       32     8  frame_interval (f64)
//!       40     8  scanout_delay (f64)
//!       48     8  screen_switching_delay (f64)
//! ```
//!
//! [`SCHEMA_VERSION`] changes whenever this layout does.

use core::fmt;

use crate::lockless::{LocklessReader, Snapshot};
use crate::time::TimeSource;

/// Version of the [`LocklessAppTimingBase`] byte layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Size in bytes of an encoded [`LocklessAppTimingBase`].
pub const SCHEMA_SIZE: usize = 56;

/// Last known vsync data older than this is not extrapolated from.
pub const VSYNC_DATA_AGE_LIMIT: f64 = 10.0;

/// Assumed progress into the current frame when there is no usable vsync.
pub const NO_VSYNC_INFO_FRAME_TIME: f64 = 0.002;

/// Frame interval reported by a cleared [`AppTiming`].
pub const CLEARED_FRAME_INTERVAL: f64 = 0.013;

/// Number of frames kept by [`AppTimingHistory`].
pub const HISTORY_LEN: usize = 8;

/// Largest distance between a prediction and a recorded visible midpoint for
/// [`AppTimingHistory::set_render_imu_time`] to back-fill it.
pub const RENDER_IMU_MATCH_WINDOW: f64 = 0.010;

/// Errors decoding a [`LocklessAppTimingBase`] from bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// The buffer is not [`SCHEMA_SIZE`] bytes long.
    Length {
        /// Bytes supplied.
        found: usize,
    },
    /// The validity flag is neither 0 nor 1.
    InvalidFlag(u32),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { found } => {
                write!(f, "app timing record is {found} bytes, expected {SCHEMA_SIZE}")
            }
            Self::InvalidFlag(flag) => write!(f, "app timing validity flag is {flag}"),
        }
    }
}

impl core::error::Error for SchemaError {}

/// Base timing shared by the compositor with application threads.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LocklessAppTimingBase {
    /// Has the compositor published real data?
    pub is_valid: bool,
    /// Application frame index of the last time-warp timing update.
    pub last_end_frame_index: u32,
    /// Frame start targeted by that update.
    pub last_start_frame_time: f64,
    /// Reference vsync time.
    pub last_known_vsync_time: f64,
    /// Uncertainty of the reference vsync time.
    pub vsync_fuzz_factor: f64,
    /// Measured vsync interval.
    pub frame_interval: f64,
    /// Vsync to scanout delay.
    pub scanout_delay: f64,
    /// Pixel switching delay of the panel.
    pub screen_switching_delay: f64,
}

impl LocklessAppTimingBase {
    /// Encodes to the fixed little-endian layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SCHEMA_SIZE] {
        let mut out = [0_u8; SCHEMA_SIZE];
        out[0..4].copy_from_slice(&u32::from(self.is_valid).to_le_bytes());
        out[4..8].copy_from_slice(&self.last_end_frame_index.to_le_bytes());
        let times = [
            self.last_start_frame_time,
            self.last_known_vsync_time,
            self.vsync_fuzz_factor,
            self.frame_interval,
            self.scanout_delay,
            self.screen_switching_delay,
        ];
        for (chunk, time) in out[8..].chunks_exact_mut(8).zip(times) {
            chunk.copy_from_slice(&time.to_le_bytes());
        }
        out
    }

    /// Decodes from the fixed little-endian layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let bytes: &[u8; SCHEMA_SIZE] = bytes
            .try_into()
            .map_err(|_| SchemaError::Length { found: bytes.len() })?;
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let f64_at = |at: usize| {
            let mut word = [0_u8; 8];
            word.copy_from_slice(&bytes[at..at + 8]);
            f64::from_le_bytes(word)
        };
        let is_valid = match u32_at(0) {
            0 => false,
            1 => true,
            other => return Err(SchemaError::InvalidFlag(other)),
        };
        Ok(Self {
            is_valid,
            last_end_frame_index: u32_at(4),
            last_start_frame_time: f64_at(8),
            last_known_vsync_time: f64_at(16),
            vsync_fuzz_factor: f64_at(24),
            frame_interval: f64_at(32),
            scanout_delay: f64_at(40),
            screen_switching_delay: f64_at(48),
        })
    }
}

impl Snapshot for LocklessAppTimingBase {
    const WORDS: usize = SCHEMA_SIZE / 8;

    fn encode(&self, words: &mut [u64]) {
        for (word, chunk) in words.iter_mut().zip(self.to_bytes().chunks_exact(8)) {
            let mut le = [0_u8; 8];
            le.copy_from_slice(chunk);
            *word = u64::from_le_bytes(le);
        }
    }

    fn decode(words: &[u64]) -> Self {
        let mut bytes = [0_u8; SCHEMA_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let decoded = Self::from_bytes(&bytes);
        debug_assert!(decoded.is_ok(), "seqlock payload is not an encoded base record");
        decoded.unwrap_or_default()
    }
}

/// Where an [`AppRenderTimer`] gets the compositor's base record from.
pub trait AppTimingSource {
    /// The latest base record, or `None` if none is available.
    fn load_base(&self) -> Option<LocklessAppTimingBase>;
}

impl AppTimingSource for LocklessReader<LocklessAppTimingBase> {
    fn load_base(&self) -> Option<LocklessAppTimingBase> {
        self.try_load()
    }
}

impl<T: AppTimingSource + ?Sized> AppTimingSource for &T {
    fn load_base(&self) -> Option<LocklessAppTimingBase> {
        (**self).load_base()
    }
}

/// Predicted timing of one application frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AppTiming {
    /// When half of the frame's image has been visible.
    pub visible_midpoint_time: f64,
    /// When scanout starts, excluding pixel switching.
    pub scanout_start_time: f64,
    /// Time between frames.
    pub frame_interval: f64,
    /// Display frame the application frame lands on.
    pub display_frame_index: u32,
}

impl AppTiming {
    /// The neutral result: predict to "now" with a harmless interval.
    pub const CLEARED: Self = Self {
        visible_midpoint_time: 0.0,
        scanout_start_time: 0.0,
        frame_interval: CLEARED_FRAME_INTERVAL,
        display_frame_index: 0,
    };
}

impl Default for AppTiming {
    fn default() -> Self {
        Self::CLEARED
    }
}

/// Start of the vsync interval containing `now`, extrapolated from the last
/// known vsync.
///
/// Without recent vsync data (older than [`VSYNC_DATA_AGE_LIMIT`], or in the
/// future) or without a positive interval the frame is assumed to have
/// started [`NO_VSYNC_INFO_FRAME_TIME`] ago.
#[must_use]
pub fn calculate_frame_start_time(
    now: f64,
    last_known_vsync_time: f64,
    vsync_fuzz: f64,
    frame_interval: f64,
) -> f64 {
    let delta = now - last_known_vsync_time + vsync_fuzz;
    if !usable_interval(frame_interval) || !(0.0..=VSYNC_DATA_AGE_LIMIT).contains(&delta) {
        return now - NO_VSYNC_INFO_FRAME_TIME;
    }
    #[expect(
        clippy::cast_possible_truncation,
        reason = "delta is at most ten seconds, so the vsync count is small"
    )]
    let vsyncs = (delta / frame_interval) as i64;
    let start = last_known_vsync_time + vsyncs as f64 * frame_interval;
    debug_assert!(
        start - now > -0.16 && start - now < 0.30,
        "extrapolated frame start is implausibly far from now"
    );
    start
}

fn usable_interval(frame_interval: f64) -> bool {
    frame_interval.is_finite() && frame_interval > 0.0
}

/// Application-side predictor over a compositor's base record.
#[derive(Clone, Debug)]
pub struct AppRenderTimer<S, C> {
    source: Option<S>,
    clock: C,
}

impl<S: AppTimingSource, C: TimeSource> AppRenderTimer<S, C> {
    /// Creates a timer without a source; every prediction is cleared until
    /// [`set_source`](Self::set_source) is called.
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            source: None,
            clock,
        }
    }

    /// Creates a timer reading from `source`.
    #[must_use]
    pub fn with_source(source: S, clock: C) -> Self {
        Self {
            source: Some(source),
            clock,
        }
    }

    /// Replaces the base record source.
    pub fn set_source(&mut self, source: Option<S>) {
        self.source = source;
    }

    /// Is a source attached?
    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Predicts when `frame_index` will be visible.
    ///
    /// Frame indices ahead of the compositor's last update queue ahead by whole
    /// intervals. If the targeted vsync already passed, the prediction snaps to
    /// the next upcoming vsync instead.
    #[must_use]
    pub fn app_timing_for_index(&self, vsync_on: bool, frame_index: u32) -> AppTiming {
        let Some(base) = self.source.as_ref().and_then(|s| s.load_base()) else {
            return AppTiming::CLEARED;
        };
        // The record comes from another process; a bad interval is treated
        // like a missing one.
        if !base.is_valid || !usable_interval(base.frame_interval) {
            return AppTiming::CLEARED;
        }

        let interval = base.frame_interval;
        // Offset of the vsync (or mid-frame without vsync) targeted for the
        // base frame itself.
        let target_offset = if vsync_on { interval } else { interval * 0.5 };
        let delta_index = frame_index.wrapping_sub(base.last_end_frame_index).cast_signed();
        let mut end =
            base.last_start_frame_time + target_offset + interval * f64::from(delta_index);

        let now = self.clock.now_seconds();
        if now + base.vsync_fuzz_factor > end {
            let start = calculate_frame_start_time(
                now,
                base.last_known_vsync_time,
                base.vsync_fuzz_factor,
                interval,
            );
            end = start + target_offset;
        }

        let scanout = end + base.scanout_delay;
        AppTiming {
            visible_midpoint_time: scanout + base.screen_switching_delay + interval * 0.5,
            scanout_start_time: scanout,
            frame_interval: interval,
            display_frame_index: display_frame_for(&base, target_offset, end),
        }
    }
}

/// Display frame whose vsync is `end`, counting whole intervals from the base
/// record's own target.
fn display_frame_for(base: &LocklessAppTimingBase, target_offset: f64, end: f64) -> u32 {
    if base.frame_interval <= 0.0 {
        return base.last_end_frame_index;
    }
    let first_end = base.last_start_frame_time + target_offset;
    let intervals = (end - first_end) / base.frame_interval;
    #[expect(
        clippy::cast_possible_truncation,
        reason = "queue-ahead and re-anchoring stay within a few hundred frames"
    )]
    let whole = if intervals >= 0.0 {
        (intervals + 0.5) as i32
    } else {
        (intervals - 0.5) as i32
    };
    base.last_end_frame_index.wrapping_add_signed(whole)
}

/// One frame's predicted timing plus the render pose sample time filled in
/// later.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AppTimingHistoryRecord {
    /// Application frame index.
    pub frame_index: u32,
    /// Prediction handed to the application.
    pub timing: AppTiming,
    /// When the render pose was sampled, or 0 if not known yet.
    pub render_imu_time: f64,
}

/// Recent predictions, for comparing against measured scanout later.
///
/// Not synchronized; see [`SharedAppTimingHistory`] for a locked wrapper.
#[derive(Clone, Debug, Default)]
pub struct AppTimingHistory {
    records: [Option<AppTimingHistoryRecord>; HISTORY_LEN],
    last_write_index: usize,
}

impl AppTimingHistory {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [None; HISTORY_LEN],
            last_write_index: 0,
        }
    }

    /// Forgets every record.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Records the prediction for `frame_index`, replacing an earlier one for
    /// the same frame or else evicting the oldest record.
    pub fn set_timing(&mut self, frame_index: u32, timing: AppTiming) {
        if let Some(record) = self
            .records
            .iter_mut()
            .flatten()
            .find(|r| r.frame_index == frame_index)
        {
            record.timing = timing;
            return;
        }
        self.last_write_index = (self.last_write_index + 1) % HISTORY_LEN;
        self.records[self.last_write_index] = Some(AppTimingHistoryRecord {
            frame_index,
            timing,
            render_imu_time: 0.0,
        });
    }

    /// Back-fills `imu_time` into the record whose visible midpoint is closest
    /// to `predicted_time`, if it lies within [`RENDER_IMU_MATCH_WINDOW`].
    ///
    /// Returns the frame index that was updated.
    pub fn set_render_imu_time(&mut self, predicted_time: f64, imu_time: f64) -> Option<u32> {
        let closest = self.records.iter_mut().flatten().min_by(|a, b| {
            let da = (a.timing.visible_midpoint_time - predicted_time).abs();
            let db = (b.timing.visible_midpoint_time - predicted_time).abs();
            da.total_cmp(&db)
        })?;
        let distance = (closest.timing.visible_midpoint_time - predicted_time).abs();
        if distance >= RENDER_IMU_MATCH_WINDOW {
            return None;
        }
        closest.render_imu_time = imu_time;
        Some(closest.frame_index)
    }

    /// The record for `frame_index`, if present.
    #[must_use]
    pub fn get(&self, frame_index: u32) -> Option<&AppTimingHistoryRecord> {
        // Most lookups are for the newest frame.
        if let Some(record) = &self.records[self.last_write_index]
            && record.frame_index == frame_index
        {
            return Some(record);
        }
        self.records
            .iter()
            .flatten()
            .find(|r| r.frame_index == frame_index)
    }

    /// The record for `frame_index`, or a cleared record when absent.
    #[must_use]
    pub fn lookup(&self, frame_index: u32) -> AppTimingHistoryRecord {
        self.get(frame_index).copied().unwrap_or_default()
    }

    /// Number of frames recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().flatten().count()
    }

    /// Is the history empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.iter().all(Option::is_none)
    }
}

/// An [`AppTimingHistory`] shared between application threads.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct SharedAppTimingHistory {
    inner: std::sync::Mutex<AppTimingHistory>,
}

#[cfg(feature = "std")]
impl SharedAppTimingHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, AppTimingHistory> {
        // The history holds plain values; a panicking writer cannot leave it
        // half-updated in a way later readers care about.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// See [`AppTimingHistory::set_timing`].
    pub fn set_timing(&self, frame_index: u32, timing: AppTiming) {
        self.locked().set_timing(frame_index, timing);
    }

    /// See [`AppTimingHistory::set_render_imu_time`].
    pub fn set_render_imu_time(&self, predicted_time: f64, imu_time: f64) -> Option<u32> {
        self.locked().set_render_imu_time(predicted_time, imu_time)
    }

    /// See [`AppTimingHistory::lookup`].
    #[must_use]
    pub fn lookup(&self, frame_index: u32) -> AppTimingHistoryRecord {
        self.locked().lookup(frame_index)
    }

    /// See [`AppTimingHistory::clear`].
    pub fn clear(&self) {
        self.locked().clear();
    }
}
