// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame index to wall-clock prediction for an application render loop.
//!
//! [`FrameTimeManager`] is owned by the render thread. It measures the frame
//! cadence between [`end_frame`](FrameTimeManager::end_frame) calls, combines
//! it with the display's scan-out delay (measured by the latency tracker when
//! available) and publishes a [`Timing`] snapshot for the current frame.
//!
//! ```text
//!   this_frame_time        next_frame_time    base = next + screen_delay
//!        │◄──── frame_delta ────►│◄─ screen_delay ─►│◄──── frame_delta ────►│
//!        │   render + present    │   vsync → scanout │   scanout (eyes lit)  │
//!                                                     midpoint = base + fd/2
//! ```
//!
//! Any thread may ask a [`FrameTimingReader`] for the timing of the current or
//! a near-future frame; the reader copies the latest snapshot lock-free and
//! extrapolates from it.

use crate::delta::TimeDeltaCollector;
use crate::display::{
    DisplayInfo, Eye, ShutterInfo, ShutterType, eye_render_times, eye_timewarp_times,
};
use crate::latency::{FrameLatencyTracker, LatencyTimings, LatencyTrackerConfig, MatchOutcome};
use crate::lockless::{LocklessReader, LocklessWriter, Snapshot, snapshot_channel};
use crate::pose::{Matrix4, Pose};
use crate::record::FrameTimeRecordSet;
use crate::time::TimeSource;

/// Frames ahead of the published frame that extrapolation is trusted for.
pub const MAX_FUTURE_FRAMES: u32 = 6;

/// Timing constants for a [`FrameTimeManager`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTimingConfig {
    /// Vsync to scanout delay assumed until the latency tracker has a reading.
    pub vsync_to_scanout_delay: f64,
    /// Present to scanout delay when vsync is off.
    pub no_vsync_to_scanout_delay: f64,
    /// Measured frame deltas above nominal plus this slack fall back to
    /// nominal.
    pub frame_delta_slack: f64,
    /// Tracker samples needed before the measured delay is used.
    pub min_latency_samples: usize,
    /// Plausible range (exclusive) of a measured vsync to scanout delay.
    pub measured_delay_range: (f64, f64),
    /// Distortion timings needed before time-warp waits on them.
    pub distortion_samples: usize,
    /// Safety margin added to the measured distortion time.
    pub distortion_margin: f64,
    /// Time-warp lead used when the application renders distortion itself.
    pub external_timewarp_wait: f64,
    /// Latency tracker thresholds.
    pub tracker: LatencyTrackerConfig,
}

impl FrameTimingConfig {
    /// Constants tuned for a 75 Hz low-persistence panel on a typical desktop
    /// GPU, where vsync to scanout is close to a full frame.
    #[must_use]
    pub const fn dk2() -> Self {
        Self {
            vsync_to_scanout_delay: 0.013,
            no_vsync_to_scanout_delay: 0.004,
            frame_delta_slack: 0.001,
            min_latency_samples: 3,
            measured_delay_range: (0.0001, 0.06),
            distortion_samples: 10,
            distortion_margin: 0.002,
            external_timewarp_wait: 0.003,
            tracker: LatencyTrackerConfig::new(),
        }
    }
}

impl Default for FrameTimingConfig {
    fn default() -> Self {
        Self::dk2()
    }
}

/// Inputs from which a [`Timing`] is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimingInputs {
    /// Expected time between frames; 0 without vsync.
    pub frame_delta: f64,
    /// Present to perceived scanout start.
    pub screen_delay: f64,
    /// Offset from the next frame time at which time-warp should begin; 0 or
    /// negative.
    pub timewarp_wait_delta: f64,
}

/// Predicted timeline of one frame, in absolute seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timing {
    /// Frame this timing describes.
    pub frame_index: u32,
    /// When rendering of this frame started.
    pub this_frame_time: f64,
    /// When the frame is expected to be presented.
    pub next_frame_time: f64,
    /// Middle of scanout.
    pub midpoint_time: f64,
    /// When time-warp should start, or 0 if it should not wait.
    pub timewarp_point_time: f64,
    /// When each eye's image is visible.
    pub eye_render_times: [f64; 2],
    /// Per-eye time-warp window.
    pub timewarp_start_end_times: [[f64; 2]; 2],
    /// Inputs the times were derived from.
    pub inputs: TimingInputs,
}

impl Timing {
    /// Recomputes every time from `inputs` for a frame starting at
    /// `this_frame_time`.
    pub fn init_from_inputs(
        &mut self,
        inputs: TimingInputs,
        shutter: ShutterType,
        this_frame_time: f64,
        frame_index: u32,
    ) {
        let frame_delta = inputs.frame_delta;
        self.frame_index = frame_index;
        self.inputs = inputs;
        self.this_frame_time = this_frame_time;
        self.next_frame_time = this_frame_time + frame_delta;
        let base = self.next_frame_time + inputs.screen_delay;
        self.midpoint_time = base + frame_delta * 0.5;
        self.timewarp_point_time = if inputs.timewarp_wait_delta == 0.0 {
            0.0
        } else {
            self.next_frame_time + inputs.timewarp_wait_delta
        };
        self.eye_render_times = eye_render_times(base, frame_delta, shutter);
        self.timewarp_start_end_times = eye_timewarp_times(base, frame_delta, shutter);
    }

    /// Timing for `frame_index` extrapolated from this snapshot.
    ///
    /// A snapshot that was never started is anchored at `now`; a future frame
    /// is placed whole frame deltas after the snapshot's next frame time.
    #[must_use]
    pub fn predict(&self, shutter: ShutterType, now: f64, frame_index: u32) -> Self {
        let mut out = *self;
        if self.this_frame_time == 0.0 {
            out.init_from_inputs(self.inputs, shutter, now, frame_index);
        } else if frame_index > self.frame_index {
            let ahead = frame_index - self.frame_index;
            debug_assert!(ahead < MAX_FUTURE_FRAMES, "predicting too far ahead");
            let this_frame_time =
                self.next_frame_time + f64::from(ahead - 1) * self.inputs.frame_delta;
            out.init_from_inputs(self.inputs, shutter, this_frame_time, frame_index);
        }
        out
    }
}

/// Head pose at a requested time, plus when the underlying sensor sample was
/// taken.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseSample {
    /// Pose predicted for the requested time.
    pub predicted: Pose,
    /// Time of the sensor reading the prediction started from.
    pub sample_time: f64,
}

/// Supplies predicted head poses; implemented by the tracking subsystem.
pub trait PoseOracle {
    /// Predicts the head pose at `time` (absolute seconds).
    fn pose_at(&self, time: f64) -> PoseSample;
}

/// What the render thread publishes: the frame timing plus the shutter it was
/// computed for, so readers can extrapolate on their own.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Published {
    timing: Timing,
    shutter: ShutterType,
}

const fn shutter_code(shutter: ShutterType) -> u64 {
    match shutter {
        ShutterType::RollingTopToBottom => 0,
        ShutterType::RollingLeftToRight => 1,
        ShutterType::RollingRightToLeft => 2,
        ShutterType::Global => 3,
    }
}

const fn shutter_from_code(code: u64) -> ShutterType {
    match code {
        1 => ShutterType::RollingLeftToRight,
        2 => ShutterType::RollingRightToLeft,
        3 => ShutterType::Global,
        _ => ShutterType::RollingTopToBottom,
    }
}

impl Snapshot for Published {
    const WORDS: usize = 15;

    fn encode(&self, words: &mut [u64]) {
        let t = &self.timing;
        words[0] = u64::from(t.frame_index);
        let times = [
            t.this_frame_time,
            t.next_frame_time,
            t.midpoint_time,
            t.timewarp_point_time,
            t.eye_render_times[0],
            t.eye_render_times[1],
            t.timewarp_start_end_times[0][0],
            t.timewarp_start_end_times[0][1],
            t.timewarp_start_end_times[1][0],
            t.timewarp_start_end_times[1][1],
            t.inputs.frame_delta,
            t.inputs.screen_delay,
            t.inputs.timewarp_wait_delta,
        ];
        for (word, time) in words[1..14].iter_mut().zip(times) {
            *word = time.to_bits();
        }
        words[14] = shutter_code(self.shutter);
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "the frame index word was widened from u32 by encode"
    )]
    fn decode(words: &[u64]) -> Self {
        let f = |i: usize| f64::from_bits(words[i]);
        Self {
            timing: Timing {
                frame_index: words[0] as u32,
                this_frame_time: f(1),
                next_frame_time: f(2),
                midpoint_time: f(3),
                timewarp_point_time: f(4),
                eye_render_times: [f(5), f(6)],
                timewarp_start_end_times: [[f(7), f(8)], [f(9), f(10)]],
                inputs: TimingInputs {
                    frame_delta: f(11),
                    screen_delay: f(12),
                    timewarp_wait_delta: f(13),
                },
            },
            shutter: shutter_from_code(words[14]),
        }
    }
}

/// Per-session frame timing state, owned by the render thread.
pub struct FrameTimeManager<C> {
    config: FrameTimingConfig,
    clock: C,
    shutter: ShutterInfo,
    screen_switching_delay: f64,
    vsync_enabled: bool,
    dynamic_prediction: bool,
    sdk_render: bool,
    frame_time_deltas: TimeDeltaCollector,
    distortion_render_times: TimeDeltaCollector,
    latency_tracker: FrameLatencyTracker,
    render_imu_time: f64,
    timewarp_imu_time: f64,
    frame_timing: Timing,
    writer: LocklessWriter<Published>,
}

impl<C> core::fmt::Debug for FrameTimeManager<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameTimeManager")
            .field("vsync_enabled", &self.vsync_enabled)
            .field("dynamic_prediction", &self.dynamic_prediction)
            .field("sdk_render", &self.sdk_render)
            .field("frame_timing", &self.frame_timing)
            .finish_non_exhaustive()
    }
}

impl<C: TimeSource> FrameTimeManager<C> {
    /// Creates a manager with vsync and dynamic prediction on.
    ///
    /// Call [`init`](Self::init) with the display description before the
    /// first frame.
    #[must_use]
    pub fn new(config: FrameTimingConfig, clock: C) -> Self {
        let (writer, _) = snapshot_channel();
        let shutter = ShutterInfo::default();
        Self {
            config,
            clock,
            shutter,
            screen_switching_delay: shutter.screen_switching_delay(),
            vsync_enabled: true,
            dynamic_prediction: true,
            sdk_render: false,
            frame_time_deltas: TimeDeltaCollector::new(),
            distortion_render_times: TimeDeltaCollector::new(),
            latency_tracker: FrameLatencyTracker::new(config.tracker),
            render_imu_time: 0.0,
            timewarp_imu_time: 0.0,
            frame_timing: Timing::default(),
            writer,
        }
    }

    /// Adopts the display's shutter timing.
    pub fn init(&mut self, display: &DisplayInfo) {
        self.shutter = display.shutter;
        self.screen_switching_delay = display.shutter.screen_switching_delay();
    }

    /// Clears all measurements and restarts timing at `frame_index`.
    pub fn reset_frame_timing(
        &mut self,
        frame_index: u32,
        vsync_enabled: bool,
        dynamic_prediction: bool,
        sdk_render: bool,
    ) {
        self.vsync_enabled = vsync_enabled;
        self.dynamic_prediction = dynamic_prediction;
        self.sdk_render = sdk_render;

        self.frame_time_deltas.clear();
        self.distortion_render_times.clear();
        self.latency_tracker.reset();

        self.frame_timing.frame_index = frame_index;
        self.frame_timing.next_frame_time = 0.0;
        self.frame_timing.this_frame_time = 0.0;
        self.frame_timing.inputs = TimingInputs {
            frame_delta: self.calc_frame_delta(),
            screen_delay: self.calc_screen_delay(),
            timewarp_wait_delta: 0.0,
        };
        self.publish();
    }

    /// Expected time between frames.
    #[must_use]
    pub fn calc_frame_delta(&self) -> f64 {
        if !self.vsync_enabled {
            return 0.0;
        }
        let nominal = self.shutter.vsync_to_next_vsync;
        if self.frame_time_deltas.count() > 3 {
            let measured = self.frame_time_deltas.median();
            if measured > nominal + self.config.frame_delta_slack {
                nominal
            } else {
                measured
            }
        } else {
            nominal
        }
    }

    /// Present to perceived scanout delay.
    #[must_use]
    pub fn calc_screen_delay(&self) -> f64 {
        let delay = if !self.vsync_enabled {
            self.config.no_vsync_to_scanout_delay
        } else {
            self.measured_scanout_delay()
                .unwrap_or(self.config.vsync_to_scanout_delay)
        };
        self.screen_switching_delay + delay
    }

    fn measured_scanout_delay(&self) -> Option<f64> {
        let deltas = self.latency_tracker.frame_deltas();
        if !self.dynamic_prediction || deltas.count() < self.config.min_latency_samples {
            return None;
        }
        let median = deltas.median();
        let (lo, hi) = self.config.measured_delay_range;
        (median > lo && median < hi).then_some(median)
    }

    /// Offset from the next frame time at which time-warp should start.
    #[must_use]
    pub fn calc_timewarp_wait_delta(&self) -> f64 {
        if !self.vsync_enabled {
            return 0.0;
        }
        if self.sdk_render {
            if self.need_distortion_time_measurement() {
                return 0.0;
            }
            return -(self.distortion_render_times.median() + self.config.distortion_margin);
        }
        -self.config.external_timewarp_wait
    }

    /// Starts `frame_index` and returns its start time.
    pub fn begin_frame(&mut self, frame_index: u32) -> f64 {
        self.render_imu_time = 0.0;
        self.timewarp_imu_time = 0.0;

        let this_frame_time = if self.frame_timing.next_frame_time != 0.0 {
            self.frame_timing.next_frame_time
        } else {
            self.clock.now_seconds()
        };
        let inputs = self.frame_timing.inputs;
        self.frame_timing
            .init_from_inputs(inputs, self.shutter.shutter_type, this_frame_time, frame_index);
        self.frame_timing.this_frame_time
    }

    /// Records the end of the frame; call after present returned.
    pub fn end_frame(&mut self) {
        self.frame_timing.next_frame_time = self.clock.now_seconds();
        if self.frame_timing.this_frame_time > 0.0 {
            self.frame_time_deltas
                .add_time_delta(self.frame_timing.next_frame_time - self.frame_timing.this_frame_time);
            self.frame_timing.inputs.frame_delta = self.calc_frame_delta();
        }
        self.publish();
    }

    /// Timing of `frame_index`, extrapolated from the last published snapshot.
    #[must_use]
    pub fn frame_timing(&self, frame_index: u32) -> Timing {
        let published = self.writer.reader().load();
        published
            .timing
            .predict(published.shutter, self.clock.now_seconds(), frame_index)
    }

    /// When the given eye's image of the current frame becomes visible.
    #[must_use]
    pub fn eye_prediction_time(&self, eye: Eye) -> f64 {
        if self.vsync_enabled {
            return self.frame_timing.eye_render_times[eye.index()];
        }
        self.free_running_prediction()
    }

    /// Predicted head pose for rendering `eye`.
    ///
    /// The first call per frame records when the sensor sample was taken, for
    /// latency reporting.
    pub fn eye_prediction_pose(&mut self, oracle: &dyn PoseOracle, eye: Eye) -> Pose {
        let sample = oracle.pose_at(self.eye_prediction_time(eye));
        if self.render_imu_time == 0.0 {
            self.render_imu_time = sample.sample_time;
        }
        sample.predicted
    }

    /// Start and end of the time-warp window for `eye`.
    #[must_use]
    pub fn timewarp_predictions(&self, eye: Eye) -> [f64; 2] {
        if self.vsync_enabled {
            return self.frame_timing.timewarp_start_end_times[eye.index()];
        }
        // Free running: scan position is unknown, so no spatial warp.
        let t = self.free_running_prediction();
        [t, t]
    }

    /// Rotation deltas from the render pose to the poses at the start and end
    /// of the time-warp window, in the distortion mesh's basis.
    ///
    /// Without an oracle there is no tracking session and both matrices are
    /// identity.
    pub fn timewarp_matrices(
        &mut self,
        oracle: Option<&dyn PoseOracle>,
        eye: Eye,
        render_pose: &Pose,
    ) -> [Matrix4; 2] {
        let Some(oracle) = oracle else {
            return [Matrix4::IDENTITY; 2];
        };
        let [start_time, end_time] = self.timewarp_predictions(eye);
        let start = oracle.pose_at(start_time);
        let end = oracle.pose_at(end_time);
        if self.timewarp_imu_time == 0.0 {
            self.timewarp_imu_time = start.sample_time;
        }

        let from_eye = render_pose.orientation.inverted();
        [start, end].map(|s| to_mesh_basis(Matrix4::from_quat(from_eye * s.predicted.orientation)))
    }

    /// Should the renderer time its distortion pass?
    #[must_use]
    pub fn need_distortion_time_measurement(&self) -> bool {
        self.vsync_enabled
            && self.distortion_render_times.count() < self.config.distortion_samples
    }

    /// Adds a distortion pass duration; republishes if the time-warp lead
    /// changed.
    pub fn add_distortion_time_measurement(&mut self, seconds: f64) {
        self.distortion_render_times.add_time_delta(seconds);
        let wait = self.calc_timewarp_wait_delta();
        if wait != self.frame_timing.inputs.timewarp_wait_delta {
            self.frame_timing.inputs.timewarp_wait_delta = wait;
            self.publish();
        }
    }

    /// Feeds the frame's latency color and the sensor's latest readbacks to
    /// the tracker; call after [`end_frame`](Self::end_frame).
    pub fn update_frame_latency_tracking_after_end_frame(
        &mut self,
        color: u8,
        records: &FrameTimeRecordSet,
    ) -> MatchOutcome {
        // After end_frame, next_frame_time holds this frame's end.
        self.latency_tracker.save_draw_color(
            color,
            self.frame_timing.next_frame_time,
            self.render_imu_time,
            self.timewarp_imu_time,
        );
        let outcome = self.latency_tracker.match_record(records);

        let screen_delay = self.calc_screen_delay();
        if screen_delay != self.frame_timing.inputs.screen_delay {
            self.frame_timing.inputs.screen_delay = screen_delay;
            self.publish();
        }
        outcome
    }

    /// Latest measured latencies, zero when stale.
    #[must_use]
    pub fn latency_timings(&self) -> LatencyTimings {
        self.latency_tracker
            .latency_timings(self.clock.now_seconds())
    }

    /// Color to draw into the next frame's latency patch.
    #[must_use]
    pub fn next_draw_color(&self) -> u8 {
        self.latency_tracker.next_draw_color()
    }

    /// Render thread view of the current frame's timing.
    #[must_use]
    pub fn timing(&self) -> &Timing {
        &self.frame_timing
    }

    /// The latency tracker.
    #[must_use]
    pub fn latency_tracker(&self) -> &FrameLatencyTracker {
        &self.latency_tracker
    }

    /// Present to frame end samples.
    #[must_use]
    pub fn frame_time_deltas(&self) -> &TimeDeltaCollector {
        &self.frame_time_deltas
    }

    /// Pixel settle plus persistence contribution to the screen delay.
    #[must_use]
    pub fn screen_switching_delay(&self) -> f64 {
        self.screen_switching_delay
    }

    /// Is the session synchronized to vsync?
    #[must_use]
    pub fn vsync_enabled(&self) -> bool {
        self.vsync_enabled
    }

    /// Render pose sample time recorded for the current frame, or 0.
    #[must_use]
    pub fn render_imu_time(&self) -> f64 {
        self.render_imu_time
    }

    /// Time-warp pose sample time recorded for the current frame, or 0.
    #[must_use]
    pub fn timewarp_imu_time(&self) -> f64 {
        self.timewarp_imu_time
    }

    fn free_running_prediction(&self) -> f64 {
        self.clock.now_seconds() + self.screen_switching_delay + self.config.no_vsync_to_scanout_delay
    }

    fn publish(&mut self) {
        let published = Published {
            timing: self.frame_timing,
            shutter: self.shutter.shutter_type,
        };
        self.writer.publish(&published);
    }
}

impl<C: TimeSource + Clone> FrameTimeManager<C> {
    /// A thread-safe handle for querying frame timing.
    #[must_use]
    pub fn reader(&self) -> FrameTimingReader<C> {
        FrameTimingReader {
            reader: self.writer.reader(),
            clock: self.clock.clone(),
        }
    }
}

/// Converts a rotation from world axes (X right, Y up, Z backwards) to the
/// mesh's NDC axes (X right, Y down, Z forwards).
///
/// This is the similarity transform by `diag(1, -1, -1)`: the Y and Z rows
/// and columns flip, and flips on the YZ block cancel.
fn to_mesh_basis(mut m: Matrix4) -> Matrix4 {
    m.m[0][1] = -m.m[0][1];
    m.m[0][2] = -m.m[0][2];
    m.m[1][0] = -m.m[1][0];
    m.m[2][0] = -m.m[2][0];
    m
}

/// Lock-free, cloneable access to a [`FrameTimeManager`]'s published timing.
pub struct FrameTimingReader<C> {
    reader: LocklessReader<Published>,
    clock: C,
}

impl<C: Clone> Clone for FrameTimingReader<C> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<C> core::fmt::Debug for FrameTimingReader<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameTimingReader").finish_non_exhaustive()
    }
}

impl<C: TimeSource> FrameTimingReader<C> {
    /// Timing of `frame_index`, extrapolated from the latest snapshot.
    #[must_use]
    pub fn frame_timing(&self, frame_index: u32) -> Timing {
        let published = self.reader.load();
        published
            .timing
            .predict(published.shutter, self.clock.now_seconds(), frame_index)
    }

    /// The latest snapshot as published, without extrapolation.
    #[must_use]
    pub fn latest(&self) -> Timing {
        self.reader.load().timing
    }
}
