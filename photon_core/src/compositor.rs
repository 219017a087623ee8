// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Producer side of the application timing protocol.
//!
//! A compositor's time-warp thread runs [`TimewarpTimer`] once per displayed
//! frame. It tracks the display cadence through a [`DisplayFrameClock`],
//! decides when just-in-time time-warp should start, and publishes the
//! [`LocklessAppTimingBase`] that application threads extrapolate from with an
//! [`AppRenderTimer`](crate::app_timing::AppRenderTimer).
//!
//! ```text
//!   present ──► set_last_present_time()
//!                   │
//!   calculate_timewarp_timing(app_frame, vsync?, scanout?)
//!        ├─► last known vsync (exact or fuzzy)
//!        ├─► frame start / end, scanout, JIT start
//!        ├─► DisplayFrameClock::submit_display_frame()
//!        └─► AppTimingPublisher::publish_base()
//! ```

use crate::app_timing::{LocklessAppTimingBase, calculate_frame_start_time};
use crate::delta::TimeDeltaCollector;
use crate::display::{DisplayInfo, ShutterInfo, eye_timewarp_times};
use crate::lockless::LocklessWriter;
use crate::time::TimeSource;

/// Timing constants for the time-warp thread.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositorTimingConfig {
    /// Padding on top of the measured time-warp draw time, absorbing
    /// preemption jitter.
    pub jit_preempt_buffer: f64,
    /// Smallest plausible measured frame interval.
    pub min_frame_interval: f64,
    /// Largest plausible measured frame interval.
    pub max_frame_interval: f64,
    /// Present to scanout when vsync is off.
    pub no_vsync_latency: f64,
    /// Time-warp draw timings collected before JIT is enabled.
    pub timewarp_render_samples: usize,
    /// Uncertainty of a vsync time inferred from the last present.
    pub fuzzy_vsync_buffer: f64,
    /// Uncertainty of a vsync time reported by the display.
    pub exact_vsync_buffer: f64,
    /// Vsync to scanout assumed without a latency measurement.
    pub default_vsync_to_scanout: f64,
}

impl CompositorTimingConfig {
    /// Extended-mode desktop compositor; vsync to scanout observed at 0.7 ms.
    #[must_use]
    pub const fn linux() -> Self {
        Self {
            jit_preempt_buffer: 0.004,
            min_frame_interval: 0.001,
            max_frame_interval: 0.020,
            no_vsync_latency: 0.003,
            timewarp_render_samples: 12,
            fuzzy_vsync_buffer: 0.004,
            exact_vsync_buffer: 0.001,
            default_vsync_to_scanout: 0.0007,
        }
    }

    /// Direct-mode display driver, whose post-present scanout delay is close
    /// to zero.
    #[must_use]
    pub const fn direct_driver() -> Self {
        Self {
            default_vsync_to_scanout: 0.0002,
            ..Self::linux()
        }
    }
}

impl Default for CompositorTimingConfig {
    fn default() -> Self {
        Self::linux()
    }
}

/// Ring capacity of [`FrameIndexMapper`].
pub const INDEX_MAPPER_CAPACITY: usize = 12;

/// Tracks how application frame indices advance relative to display frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameIndexMapper {
    display: [u32; INDEX_MAPPER_CAPACITY],
    app: [u32; INDEX_MAPPER_CAPACITY],
    start: usize,
    count: usize,
}

impl FrameIndexMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            display: [0; INDEX_MAPPER_CAPACITY],
            app: [0; INDEX_MAPPER_CAPACITY],
            start: 0,
            count: 0,
        }
    }

    /// Forgets all pairs.
    pub fn reset(&mut self) {
        self.start = 0;
        self.count = 0;
    }

    /// Number of pairs held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Is the mapper empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Records that `app_frame` was shown at `display_frame`, overwriting the
    /// oldest pair when full.
    pub fn add(&mut self, display_frame: u32, app_frame: u32) {
        if self.count == INDEX_MAPPER_CAPACITY {
            self.display[self.start] = display_frame;
            self.app[self.start] = app_frame;
            self.start = (self.start + 1) % INDEX_MAPPER_CAPACITY;
        } else {
            self.display[self.count] = display_frame;
            self.app[self.count] = app_frame;
            self.count += 1;
        }
    }

    /// Application frames per display frame over the window.
    ///
    /// One-to-one until there are three pairs spanning at least two display
    /// frames; never below 0.33, since prediction that far ahead is
    /// meaningless anyway.
    #[must_use]
    pub fn app_to_display_ratio(&self) -> f64 {
        if self.count < 3 {
            return 1.0;
        }
        let newest = (self.start + self.count - 1) % INDEX_MAPPER_CAPACITY;
        let display_delta = self.display[newest].wrapping_sub(self.display[self.start]);
        let app_delta = self.app[newest].wrapping_sub(self.app[self.start]);
        if display_delta < 2 {
            return 1.0;
        }
        (f64::from(app_delta) / f64::from(display_delta)).max(0.33)
    }
}

/// State of the display at its most recently submitted frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayTiming {
    /// Measured (or nominal) vsync interval.
    pub frame_delta: f64,
    /// Application frame shown.
    pub app_frame_index: u32,
    /// Display frame counter; monotonically increasing.
    pub display_frame_index: u32,
    /// When the frame was submitted (its targeted vsync).
    pub frame_submit_seconds: f64,
    /// See [`FrameIndexMapper::app_to_display_ratio`].
    pub app_to_display_ratio: f64,
}

/// Display-frame cadence as seen from the time-warp thread.
#[derive(Clone, Debug)]
pub struct DisplayFrameClock {
    vsync_enabled: bool,
    default_frame_delta: f64,
    last: DisplayTiming,
    frame_deltas: TimeDeltaCollector,
    indices: FrameIndexMapper,
}

impl DisplayFrameClock {
    /// Creates a clock with vsync on and the given nominal interval.
    #[must_use]
    pub fn new(default_frame_delta: f64) -> Self {
        let mut clock = Self {
            vsync_enabled: true,
            default_frame_delta,
            last: DisplayTiming::default(),
            frame_deltas: TimeDeltaCollector::new(),
            indices: FrameIndexMapper::new(),
        };
        clock.initialize(DisplayTiming {
            frame_delta: default_frame_delta,
            app_to_display_ratio: 1.0,
            ..DisplayTiming::default()
        });
        clock
    }

    /// Restarts from `initial`, whose `frame_delta` becomes the nominal
    /// interval.
    pub fn initialize(&mut self, initial: DisplayTiming) {
        self.frame_deltas.clear();
        self.indices.reset();
        self.default_frame_delta = initial.frame_delta;
        self.last = initial;
    }

    /// Enables or disables vsync; without it the frame delta is 0.
    pub fn set_vsync(&mut self, enabled: bool) {
        self.vsync_enabled = enabled;
    }

    /// Records that `display_frame` (showing `app_frame`) was submitted at
    /// `time`.
    ///
    /// A frame exactly one display frame after the previous one contributes a
    /// vsync interval sample.
    pub fn submit_display_frame(&mut self, display_frame: u32, app_frame: u32, time: f64) {
        let advanced = display_frame.wrapping_sub(self.last.display_frame_index).cast_signed();
        if self.last.frame_submit_seconds > 0.0 && advanced < 2 {
            if advanced > 0 {
                self.frame_deltas
                    .add_time_delta((time - self.last.frame_submit_seconds) / f64::from(advanced));
            }
            self.last.frame_delta = self.frame_delta();
        }

        self.indices.add(display_frame, app_frame);
        self.last.app_frame_index = app_frame;
        self.last.display_frame_index = display_frame;
        self.last.frame_submit_seconds = time;
        self.last.app_to_display_ratio = self.indices.app_to_display_ratio();
    }

    /// Measured vsync interval: the median once more than three samples exist,
    /// capped to nominal plus 1 ms; 0 without vsync.
    #[must_use]
    pub fn frame_delta(&self) -> f64 {
        if !self.vsync_enabled {
            return 0.0;
        }
        if self.frame_deltas.count() > 3 {
            let median = self.frame_deltas.median();
            if median > self.default_frame_delta + 0.001 {
                return self.default_frame_delta;
            }
            return median;
        }
        self.default_frame_delta
    }

    /// State at the last submitted frame.
    #[must_use]
    pub fn last(&self) -> &DisplayTiming {
        &self.last
    }

    /// Display frame counter of the last submission.
    #[must_use]
    pub fn last_display_frame_index(&self) -> u32 {
        self.last.display_frame_index
    }

    /// Submission time of the last display frame, 0 before the first.
    #[must_use]
    pub fn last_display_frame_time(&self) -> f64 {
        self.last.frame_submit_seconds
    }

    /// Timing of a later display frame, in whole intervals from the last one.
    #[must_use]
    pub fn display_frame_timing(&self, display_frame: u32, now: f64) -> DisplayTiming {
        let mut timing = self.last;
        if display_frame > timing.display_frame_index {
            let from = self.submit_time_or(now);
            timing.frame_submit_seconds =
                from + f64::from(display_frame - timing.display_frame_index) * timing.frame_delta;
            timing.display_frame_index = display_frame;
        }
        timing
    }

    /// Timing of a later application frame, mapped to display frames by the
    /// observed app to display ratio.
    #[must_use]
    pub fn app_frame_timing(&self, app_frame: u32, now: f64) -> DisplayTiming {
        let mut timing = self.last;
        if app_frame > timing.app_frame_index {
            let app_delta = f64::from(app_frame - timing.app_frame_index);
            #[expect(
                clippy::cast_possible_truncation,
                reason = "a non-negative count of display frames, at most three per app frame"
            )]
            let display_delta = (app_delta / timing.app_to_display_ratio) as u32;
            let from = self.submit_time_or(now);
            timing.app_frame_index = app_frame;
            timing.display_frame_index = timing.display_frame_index.wrapping_add(display_delta);
            timing.frame_submit_seconds = from + f64::from(display_delta) * timing.frame_delta;
        }
        timing
    }

    fn submit_time_or(&self, now: f64) -> f64 {
        if self.last.frame_submit_seconds == 0.0 {
            now
        } else {
            self.last.frame_submit_seconds
        }
    }
}

/// Time-warp timing of the current display frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimewarpTiming {
    /// Predicted scanout start.
    pub scanout_time: f64,
    /// When just-in-time time-warp should begin, or 0 to start immediately.
    pub jit_timewarp_time: f64,
    /// Per-eye time-warp window.
    pub eye_start_end_times: [[f64; 2]; 2],
}

/// Sink for the base record application threads extrapolate from.
pub trait AppTimingPublisher {
    /// Publishes a new base record.
    fn publish_base(&mut self, base: &LocklessAppTimingBase);
}

impl AppTimingPublisher for LocklessWriter<LocklessAppTimingBase> {
    fn publish_base(&mut self, base: &LocklessAppTimingBase) {
        self.publish(base);
    }
}

/// Calculator for the time-warp thread's per-frame timing.
pub struct TimewarpTimer<P, C> {
    config: CompositorTimingConfig,
    shutter: ShutterInfo,
    screen_switching_delay: f64,
    vsync_enabled: bool,
    jit_enabled: bool,
    last_present_time: f64,
    last_known_vsync_time: f64,
    last_known_vsync_fuzz: f64,
    latency_tester_present_time: f64,
    last_timewarp_frame_end_time: f64,
    distortion_render_times: TimeDeltaCollector,
    estimated_timewarp_render_time: f64,
    display_clock: DisplayFrameClock,
    current: TimewarpTiming,
    timewarp_imu_time: f64,
    clock: C,
    publisher: P,
}

impl<P, C> core::fmt::Debug for TimewarpTimer<P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimewarpTimer")
            .field("vsync_enabled", &self.vsync_enabled)
            .field("jit_enabled", &self.jit_enabled)
            .field("last_known_vsync_time", &self.last_known_vsync_time)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl<P: AppTimingPublisher, C: TimeSource> TimewarpTimer<P, C> {
    /// Creates a timer for `display`, with vsync and JIT on, and publishes a
    /// cleared base record.
    pub fn new(config: CompositorTimingConfig, display: &DisplayInfo, clock: C, publisher: P) -> Self {
        let shutter = display.shutter;
        let mut timer = Self {
            config,
            shutter,
            screen_switching_delay: shutter.screen_switching_delay(),
            vsync_enabled: true,
            jit_enabled: true,
            last_present_time: 0.0,
            last_known_vsync_time: 0.0,
            last_known_vsync_fuzz: 0.0,
            latency_tester_present_time: 0.0,
            last_timewarp_frame_end_time: 0.0,
            distortion_render_times: TimeDeltaCollector::new(),
            estimated_timewarp_render_time: 0.0,
            display_clock: DisplayFrameClock::new(shutter.vsync_to_next_vsync),
            current: TimewarpTiming::default(),
            timewarp_imu_time: 0.0,
            clock,
            publisher,
        };
        timer.reset();
        timer
    }

    /// Forgets vsync history and publishes a cleared base record.
    ///
    /// Distortion timings are kept; they remain valid across resets.
    pub fn reset(&mut self) {
        self.last_known_vsync_time = 0.0;
        self.last_known_vsync_fuzz = 0.0;
        self.last_present_time = 0.0;
        self.last_timewarp_frame_end_time = 0.0;
        self.publisher.publish_base(&LocklessAppTimingBase::default());
    }

    /// Enables or disables vsync.
    pub fn set_vsync_enabled(&mut self, enabled: bool) {
        self.vsync_enabled = enabled;
        self.display_clock.set_vsync(enabled);
    }

    /// Enables or disables just-in-time time-warp.
    pub fn set_jit_enabled(&mut self, enabled: bool) {
        self.jit_enabled = enabled;
    }

    /// Call right after present completed.
    pub fn set_last_present_time(&mut self) {
        self.last_present_time = self.clock.now_seconds();
    }

    /// Reference point for measuring present to scanout: frame end with
    /// vsync, frame start without.
    #[must_use]
    pub fn latency_tester_present_time(&self) -> f64 {
        self.latency_tester_present_time
    }

    /// Records when the sensor was sampled for the time-warp pose.
    pub fn set_timewarp_imu_time(&mut self, time: f64) {
        self.timewarp_imu_time = time;
    }

    /// See [`set_timewarp_imu_time`](Self::set_timewarp_imu_time).
    #[must_use]
    pub fn timewarp_imu_time(&self) -> f64 {
        self.timewarp_imu_time
    }

    /// Does JIT still need time-warp draw timings?
    #[must_use]
    pub fn need_distortion_time_measurement(&self) -> bool {
        // Useful even without vsync.
        self.distortion_render_times.count() < self.config.timewarp_render_samples
    }

    /// Adds a time-warp draw duration; once enough are collected their median
    /// becomes the estimate JIT schedules with.
    pub fn add_distortion_time_measurement(&mut self, seconds: f64) {
        self.distortion_render_times.add_time_delta(seconds);
        if !self.need_distortion_time_measurement() {
            self.estimated_timewarp_render_time = self.distortion_render_times.median();
        }
    }

    /// Current time-warp draw estimate, 0 until measured.
    #[must_use]
    pub fn estimated_timewarp_render_time(&self) -> f64 {
        self.estimated_timewarp_render_time
    }

    /// Timing computed by the last
    /// [`calculate_timewarp_timing`](Self::calculate_timewarp_timing).
    #[must_use]
    pub fn timewarp_timing(&self) -> &TimewarpTiming {
        &self.current
    }

    /// The display cadence tracker.
    #[must_use]
    pub fn display_clock(&self) -> &DisplayFrameClock {
        &self.display_clock
    }

    /// The base record sink.
    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Computes this frame's time-warp timing and publishes the application
    /// base record.
    ///
    /// `previous_known_vsync` is an exact vsync time from the display, or
    /// `None` to infer it from the last present. `measured_vsync_to_scanout`
    /// is the latency tracker's reading, if any.
    pub fn calculate_timewarp_timing(
        &mut self,
        app_frame_index: u32,
        previous_known_vsync: Option<f64>,
        measured_vsync_to_scanout: Option<f64>,
    ) -> TimewarpTiming {
        self.update_last_known_vsync_time(previous_known_vsync);

        let frame_interval = self.frame_interval();
        let frame_start = calculate_frame_start_time(
            self.clock.now_seconds(),
            self.last_known_vsync_time,
            self.last_known_vsync_fuzz,
            frame_interval,
        );
        let scanout_delay = self.scanout_delay(measured_vsync_to_scanout);

        if self.vsync_enabled {
            let frame_end = frame_start + frame_interval;
            self.current.jit_timewarp_time = if self.jit_enabled {
                self.jit_timewarp_time(frame_end)
            } else {
                0.0
            };
            self.last_timewarp_frame_end_time = frame_end;
            self.current.scanout_time = frame_end + scanout_delay;
            self.submit_display_frame(app_frame_index, frame_end, frame_interval);
            self.latency_tester_present_time = frame_end;
        } else {
            self.current.scanout_time = frame_start + scanout_delay;
            self.current.jit_timewarp_time = 0.0;
            self.last_timewarp_frame_end_time = 0.0;
            self.latency_tester_present_time = frame_start;
        }

        self.publisher.publish_base(&LocklessAppTimingBase {
            is_valid: true,
            last_end_frame_index: app_frame_index,
            last_start_frame_time: frame_start,
            last_known_vsync_time: self.last_known_vsync_time,
            vsync_fuzz_factor: self.last_known_vsync_fuzz,
            frame_interval,
            scanout_delay,
            screen_switching_delay: self.screen_switching_delay,
        });

        // Scanline start to end approximated by the vsync interval.
        self.current.eye_start_end_times = eye_timewarp_times(
            self.current.scanout_time + self.screen_switching_delay,
            frame_interval,
            self.shutter.shutter_type,
        );
        self.current
    }

    fn update_last_known_vsync_time(&mut self, previous_known_vsync: Option<f64>) {
        match previous_known_vsync.filter(|&t| t > 0.0) {
            Some(vsync) => {
                self.last_known_vsync_time = vsync;
                self.last_known_vsync_fuzz = self.config.exact_vsync_buffer;
            }
            None => {
                self.last_known_vsync_time = self.last_present_time;
                self.last_known_vsync_fuzz = self.config.fuzzy_vsync_buffer;
            }
        }
    }

    fn frame_interval(&self) -> f64 {
        let interval = self.display_clock.frame_delta();
        if interval < self.config.min_frame_interval || interval > self.config.max_frame_interval {
            self.shutter.vsync_to_next_vsync
        } else {
            interval
        }
    }

    fn scanout_delay(&self, measured: Option<f64>) -> f64 {
        if !self.vsync_enabled {
            return self.config.no_vsync_latency;
        }
        measured
            .unwrap_or(self.config.default_vsync_to_scanout)
            .max(0.0)
    }

    fn jit_timewarp_time(&self, frame_end: f64) -> f64 {
        if self.estimated_timewarp_render_time <= 0.0 {
            // No idea how long the draw takes yet.
            return 0.0;
        }
        frame_end - self.estimated_timewarp_render_time - self.config.jit_preempt_buffer
    }

    fn submit_display_frame(&mut self, app_frame_index: u32, frame_end: f64, frame_interval: f64) {
        let mut display_frame = self.display_clock.last_display_frame_index();
        let last_time = self.display_clock.last_display_frame_time();
        if last_time > 0.0 {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "frame ends are seconds apart at most"
            )]
            let elapsed = ((frame_end - last_time + frame_interval * 0.5) / frame_interval) as i32;
            display_frame = display_frame.wrapping_add_signed(elapsed);
        }
        self.display_clock
            .submit_display_frame(display_frame, app_frame_index, frame_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_timing::{AppRenderTimer, LocklessAppTimingBase};
    use crate::display::ShutterType;
    use crate::lockless::{LocklessReader, snapshot_channel};
    use crate::time::ManualClock;

    const INTERVAL: f64 = 0.0111;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn display(shutter_type: ShutterType) -> DisplayInfo {
        DisplayInfo::new(ShutterInfo {
            shutter_type,
            vsync_to_next_vsync: INTERVAL,
            vsync_to_first_scanline: 0.0,
            first_scanline_to_last_scanline: INTERVAL,
            pixel_settle_time: 0.0,
            pixel_persistence: 0.002,
        })
    }

    fn timer(
        shutter_type: ShutterType,
    ) -> (
        TimewarpTimer<LocklessWriter<LocklessAppTimingBase>, ManualClock>,
        LocklessReader<LocklessAppTimingBase>,
        ManualClock,
    ) {
        let clock = ManualClock::new(50.0);
        let (writer, reader) = snapshot_channel();
        let timer = TimewarpTimer::new(
            CompositorTimingConfig::linux(),
            &display(shutter_type),
            clock.clone(),
            writer,
        );
        (timer, reader, clock)
    }

    #[test]
    fn ratio_defaults_and_clamps() {
        let mut mapper = FrameIndexMapper::new();
        mapper.add(10, 1);
        mapper.add(11, 2);
        assert_eq!(mapper.app_to_display_ratio(), 1.0, "fewer than three pairs");

        mapper.add(11, 3);
        assert_eq!(mapper.app_to_display_ratio(), 1.0, "display advanced by one");

        let mut slow = FrameIndexMapper::new();
        for d in 0..12 {
            slow.add(d * 5, d);
        }
        assert!(close(slow.app_to_display_ratio(), 0.33), "1/5 clamps to 0.33");

        let mut half = FrameIndexMapper::new();
        for d in 0..20 {
            half.add(d * 2, d);
        }
        assert_eq!(half.len(), INDEX_MAPPER_CAPACITY, "ring is bounded");
        assert!(close(half.app_to_display_ratio(), 0.5), "every other vsync");
    }

    #[test]
    fn display_clock_measures_consecutive_frames() {
        let mut clock = DisplayFrameClock::new(INTERVAL);
        for i in 0..6 {
            clock.submit_display_frame(i, i, 1.0 + f64::from(i) * 0.0105);
        }
        assert!(close(clock.frame_delta(), 0.0105), "median of 0.0105 steps");

        // Skipping a display frame adds no sample.
        let before = clock.frame_deltas.count();
        clock.submit_display_frame(8, 6, 1.0 + 8.0 * 0.0105);
        assert_eq!(clock.frame_deltas.count(), before, "skip ignored");
        assert_eq!(clock.last_display_frame_index(), 8, "index recorded");

        let ahead = clock.display_frame_timing(10, 0.0);
        assert!(
            close(ahead.frame_submit_seconds, clock.last_display_frame_time() + 2.0 * 0.0105),
            "two intervals later"
        );
    }

    #[test]
    fn app_frame_timing_uses_ratio() {
        let mut clock = DisplayFrameClock::new(INTERVAL);
        for i in 0..6 {
            clock.submit_display_frame(i * 2, i, 1.0 + f64::from(i) * 2.0 * INTERVAL);
        }
        let t = clock.app_frame_timing(6, 0.0);
        assert_eq!(t.display_frame_index, 12, "one app frame is two display frames");
    }

    #[test]
    fn publishes_cleared_base_on_creation() {
        let (_timer, reader, _) = timer(ShutterType::RollingTopToBottom);
        let base = reader.try_load().unwrap();
        assert!(!base.is_valid, "cleared record");
    }

    #[test]
    fn timing_with_fuzzy_vsync() {
        let (mut timer, reader, clock) = timer(ShutterType::RollingTopToBottom);
        timer.set_last_present_time();
        clock.advance(0.003);

        let t = timer.calculate_timewarp_timing(7, None, None);
        // Last present at 50.0, fuzzy buffer 4 ms: 7 ms into the frame.
        let frame_end = 50.0 + INTERVAL;
        assert!(close(t.scanout_time, frame_end + 0.0007), "default scanout delay");
        assert_eq!(t.jit_timewarp_time, 0.0, "no JIT without measurements");
        let start = t.scanout_time + 0.001;
        assert_eq!(t.eye_start_end_times[0], [start, start + INTERVAL], "rolling window");
        assert!(close(timer.latency_tester_present_time(), frame_end), "present reference");

        let base = reader.load();
        assert!(base.is_valid, "published");
        assert_eq!(base.last_end_frame_index, 7, "frame index");
        assert!(close(base.last_start_frame_time, 50.0), "frame start");
        assert_eq!(base.vsync_fuzz_factor, 0.004, "fuzzy");
        assert_eq!(base.frame_interval, INTERVAL, "nominal interval");
        assert!(close(base.screen_switching_delay, 0.001), "switching delay");
    }

    #[test]
    fn exact_vsync_uses_tight_buffer() {
        let (mut timer, reader, clock) = timer(ShutterType::Global);
        clock.set(60.005);
        let t = timer.calculate_timewarp_timing(1, Some(60.0), Some(0.002));
        assert_eq!(reader.load().vsync_fuzz_factor, 0.001, "exact buffer");
        assert!(close(t.scanout_time, 60.0 + INTERVAL + 0.002), "measured scanout delay");
        let mid = t.scanout_time + 0.001 + INTERVAL * 0.5;
        assert!(close(t.eye_start_end_times[1][0], mid), "global collapses to midpoint");
    }

    #[test]
    fn negative_scanout_measurement_clamps_to_zero() {
        let (mut timer, reader, clock) = timer(ShutterType::RollingTopToBottom);
        clock.set(60.005);
        let _ = timer.calculate_timewarp_timing(1, Some(60.0), Some(-0.001));
        assert_eq!(reader.load().scanout_delay, 0.0, "clamped");
    }

    #[test]
    fn no_vsync_scans_out_from_frame_start() {
        let (mut timer, reader, clock) = timer(ShutterType::RollingTopToBottom);
        timer.set_vsync_enabled(false);
        clock.set(60.005);
        let t = timer.calculate_timewarp_timing(1, Some(60.0), Some(0.010));
        assert!(close(t.scanout_time, 60.0 + 0.003), "no-vsync latency");
        assert_eq!(t.jit_timewarp_time, 0.0, "JIT off without vsync");
        assert_eq!(reader.load().frame_interval, INTERVAL, "zero interval falls back to nominal");
    }

    #[test]
    fn jit_time_after_measurements() {
        let (mut timer, _, clock) = timer(ShutterType::RollingTopToBottom);
        for _ in 0..11 {
            timer.add_distortion_time_measurement(0.002);
        }
        assert!(timer.need_distortion_time_measurement(), "eleven samples");
        assert_eq!(timer.estimated_timewarp_render_time(), 0.0, "not yet");
        timer.add_distortion_time_measurement(0.002);
        assert_eq!(timer.estimated_timewarp_render_time(), 0.002, "median of twelve");

        clock.set(60.005);
        let t = timer.calculate_timewarp_timing(1, Some(60.0), None);
        assert!(
            close(t.jit_timewarp_time, 60.0 + INTERVAL - 0.002 - 0.004),
            "frame end minus draw time minus preempt buffer"
        );

        timer.set_jit_enabled(false);
        let t = timer.calculate_timewarp_timing(2, Some(60.0), None);
        assert_eq!(t.jit_timewarp_time, 0.0, "disabled");
    }

    #[test]
    fn display_frames_follow_frame_ends() {
        let (mut timer, _, clock) = timer(ShutterType::RollingTopToBottom);
        let vsync = 60.0;
        for frame in 0..4_u32 {
            let now = vsync + f64::from(frame) * INTERVAL + 0.002;
            clock.set(now);
            let _ = timer.calculate_timewarp_timing(frame, Some(vsync), None);
        }
        assert_eq!(timer.display_clock().last_display_frame_index(), 3, "one per vsync");
        assert_eq!(timer.display_clock().last().app_frame_index, 3, "app index");
    }

    #[test]
    fn app_timer_reads_published_base() {
        let (mut timer, reader, clock) = timer(ShutterType::RollingTopToBottom);
        clock.set(60.002);
        let t = timer.calculate_timewarp_timing(20, Some(60.0), None);

        let app = AppRenderTimer::with_source(reader, clock.clone());
        let timing = app.app_timing_for_index(true, 20);
        assert!(close(timing.scanout_start_time, t.scanout_time), "same scanout prediction");
    }
}
