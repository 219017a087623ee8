// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the headset frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! frame-loop instrumentation calls at each stage. All method bodies default to
//! no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during a frame and
//! produces a [`FrameSummary`] at the end.
//!
//! All times are absolute seconds from the pipeline's [`TimeSource`].
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) — gates [`EyePrediction`] and
//!   [`DeltaSample`] events plus the corresponding `TraceSink` methods.
//!
//! [`TimeSource`]: crate::time::TimeSource

use crate::compositor::TimewarpTiming;
#[cfg(feature = "trace-rich")]
use crate::display::Eye;
use crate::frame_timing::Timing;
use crate::latency::LatencyTimings;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of the frame loop is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Application eye rendering.
    Render,
    /// Time-warp distortion draw.
    Distortion,
    /// Present, until the swap returns.
    Present,
}

impl PhaseKind {
    /// Every phase, in frame order.
    pub const ALL: [Self; 3] = [Self::Render, Self::Distortion, Self::Present];

    /// Position in [`ALL`](Self::ALL).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Render => 0,
            Self::Distortion => 1,
            Self::Present => 2,
        }
    }
}

/// Which measurement a [`DeltaSample`] fed.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaSource {
    /// Frame to frame interval.
    FrameDelta,
    /// Frame end to scanout, from a latency match.
    Scanout,
    /// Time-warp draw duration.
    Distortion,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after `begin_frame` with the predicted timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeginFrameEvent {
    /// Application frame index.
    pub frame_index: u32,
    /// When rendering started.
    pub this_frame_time: f64,
    /// Expected present.
    pub next_frame_time: f64,
    /// Middle of scanout.
    pub midpoint_time: f64,
    /// When time-warp should start, or 0.
    pub timewarp_point_time: f64,
}

impl From<&Timing> for BeginFrameEvent {
    fn from(t: &Timing) -> Self {
        Self {
            frame_index: t.frame_index,
            this_frame_time: t.this_frame_time,
            next_frame_time: t.next_frame_time,
            midpoint_time: t.midpoint_time,
            timewarp_point_time: t.timewarp_point_time,
        }
    }
}

/// Marks the beginning of a frame-loop phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u32,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Time at the start of the phase.
    pub timestamp: f64,
}

/// Marks the end of a frame-loop phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u32,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Time at the end of the phase.
    pub timestamp: f64,
}

/// Emitted when the time-warp thread computed its timing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimewarpEvent {
    /// Application frame the time-warp displays.
    pub app_frame_index: u32,
    /// Predicted scanout start.
    pub scanout_time: f64,
    /// Just-in-time start, or 0.
    pub jit_timewarp_time: f64,
    /// Vsync interval in use.
    pub frame_interval: f64,
}

impl TimewarpEvent {
    /// Creates an event from a [`TimewarpTiming`] plus the interval it was
    /// computed with (which the timing itself does not carry).
    #[must_use]
    pub fn new(app_frame_index: u32, timing: &TimewarpTiming, frame_interval: f64) -> Self {
        Self {
            app_frame_index,
            scanout_time: timing.scanout_time,
            jit_timewarp_time: timing.jit_timewarp_time,
            frame_interval,
        }
    }
}

/// Emitted when latency tracking matched readback data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencyEvent {
    /// Frame whose end triggered the match.
    pub frame_index: u32,
    /// Frames newly matched.
    pub newly_matched: usize,
    /// Measured latencies after the match.
    pub timings: LatencyTimings,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u32,
    /// When rendering started.
    pub this_frame_time: f64,
    /// Predicted present.
    pub next_frame_time: f64,
    /// Render phase duration (0 if not measured).
    pub render_seconds: f64,
    /// Distortion phase duration (0 if not measured).
    pub distortion_seconds: f64,
    /// Present phase duration (0 if not measured).
    pub present_seconds: f64,
    /// Present ended after the predicted present.
    pub missed_vsync: bool,
}

/// Prediction time of one eye (requires `trace-rich` feature).
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyePrediction {
    /// Which eye.
    pub eye: Eye,
    /// Render prediction time.
    pub render_time: f64,
    /// Time-warp window.
    pub timewarp_window: [f64; 2],
}

/// One time delta sample (requires `trace-rich` feature).
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeltaSample {
    /// What was measured.
    pub source: DeltaSource,
    /// Seconds.
    pub seconds: f64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a frame began.
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame-loop phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame-loop phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when time-warp timing is computed.
    fn on_timewarp(&mut self, e: &TimewarpEvent) {
        _ = e;
    }

    /// Called when readback data matched rendered frames.
    fn on_latency(&mut self, e: &LatencyEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with per-eye predictions (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_eye_predictions(&mut self, frame_index: u32, eyes: &[EyePrediction]) {
        _ = (frame_index, eyes);
    }

    /// Called with time delta samples (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_delta_samples(&mut self, frame_index: u32, samples: &[DeltaSample]) {
        _ = (frame_index, samples);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($(#[$doc:meta] $name:ident => $method:ident($ty:ty);)*) => {
        $(
            #[$doc]
            #[inline]
            pub fn $name(&mut self, e: &$ty) {
                #[cfg(feature = "trace")]
                if let Some(s) = &mut self.sink {
                    s.$method(e);
                }
                #[cfg(not(feature = "trace"))]
                {
                    _ = e;
                }
            }
        )*
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    dispatch! {
        /// Emits a [`BeginFrameEvent`].
        begin_frame => on_begin_frame(BeginFrameEvent);
        /// Emits a [`PhaseBeginEvent`].
        phase_begin => on_phase_begin(PhaseBeginEvent);
        /// Emits a [`PhaseEndEvent`].
        phase_end => on_phase_end(PhaseEndEvent);
        /// Emits a [`TimewarpEvent`].
        timewarp => on_timewarp(TimewarpEvent);
        /// Emits a [`LatencyEvent`].
        latency => on_latency(LatencyEvent);
        /// Emits a [`FrameSummary`].
        frame_summary => on_frame_summary(FrameSummary);
    }

    /// Emits eye predictions (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn eye_predictions(&mut self, frame_index: u32, eyes: &[EyePrediction]) {
        if let Some(s) = &mut self.sink {
            s.on_eye_predictions(frame_index, eyes);
        }
    }

    /// Emits time delta samples (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn delta_samples(&mut self, frame_index: u32, samples: &[DeltaSample]) {
        if let Some(s) = &mut self.sink {
            s.on_delta_samples(frame_index, samples);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame: BeginFrameEvent,
    phase_starts: [Option<f64>; 3],
    phase_ends: [Option<f64>; 3],
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given frame.
    #[must_use]
    pub fn new(frame: &BeginFrameEvent) -> Self {
        Self {
            frame: *frame,
            phase_starts: [None; 3],
            phase_ends: [None; 3],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: f64) {
        self.phase_starts[phase.index()] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: f64) {
        self.phase_ends[phase.index()] = Some(t);
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    ///
    /// The vsync counts as missed when present ended after the predicted
    /// present time.
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        let present_end = self.phase_ends[PhaseKind::Present.index()];
        FrameSummary {
            frame_index: self.frame.frame_index,
            this_frame_time: self.frame.this_frame_time,
            next_frame_time: self.frame.next_frame_time,
            render_seconds: self.phase_duration(PhaseKind::Render),
            distortion_seconds: self.phase_duration(PhaseKind::Distortion),
            present_seconds: self.phase_duration(PhaseKind::Present),
            missed_vsync: present_end.is_some_and(|t| t > self.frame.next_frame_time),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> f64 {
        let idx = phase.index();
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => (end - start).max(0.0),
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_timing::TimingInputs;

    fn sample_frame() -> BeginFrameEvent {
        BeginFrameEvent {
            frame_index: 42,
            this_frame_time: 10.0,
            next_frame_time: 10.0111,
            midpoint_time: 10.03,
            timewarp_point_time: 10.008,
        }
    }

    #[test]
    fn begin_frame_event_from_timing() {
        let timing = Timing {
            frame_index: 7,
            this_frame_time: 1.0,
            next_frame_time: 1.5,
            midpoint_time: 1.75,
            timewarp_point_time: 1.25,
            eye_render_times: [1.75, 1.75],
            timewarp_start_end_times: [[1.6, 1.9]; 2],
            inputs: TimingInputs::default(),
        };
        let evt = BeginFrameEvent::from(&timing);
        assert_eq!(evt.frame_index, 7, "frame index copied");
        assert_eq!(evt.next_frame_time, 1.5, "present copied");
        assert_eq!(evt.timewarp_point_time, 1.25, "time-warp point copied");
    }

    #[test]
    fn timewarp_event_new() {
        let timing = TimewarpTiming {
            scanout_time: 2.0,
            jit_timewarp_time: 1.99,
            eye_start_end_times: [[2.0, 2.01]; 2],
        };
        let evt = TimewarpEvent::new(5, &timing, 0.0111);
        assert_eq!(evt.app_frame_index, 5, "frame");
        assert_eq!(evt.jit_timewarp_time, 1.99, "JIT time");
        assert_eq!(evt.frame_interval, 0.0111, "interval");
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_begin_frame(&sample_frame());
        sink.on_latency(&LatencyEvent {
            frame_index: 0,
            newly_matched: 2,
            timings: LatencyTimings::default(),
        });
        sink.on_frame_summary(&FrameSummaryBuilder::new(&sample_frame()).finish());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.begin_frame(&sample_frame());
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: 42,
            phase: PhaseKind::Render,
            timestamp: 10.0,
        });
    }

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = FrameSummaryBuilder::new(&sample_frame());
        builder.phase_begin(PhaseKind::Render, 10.0);
        builder.phase_end(PhaseKind::Render, 10.005);
        builder.phase_begin(PhaseKind::Distortion, 10.008);
        builder.phase_end(PhaseKind::Distortion, 10.0095);
        builder.phase_begin(PhaseKind::Present, 10.0095);
        builder.phase_end(PhaseKind::Present, 10.0100);

        let summary = builder.finish();
        assert!((summary.render_seconds - 0.005).abs() < 1e-12, "render");
        assert!((summary.distortion_seconds - 0.0015).abs() < 1e-12, "distortion");
        assert!((summary.present_seconds - 0.0005).abs() < 1e-12, "present");
        assert!(!summary.missed_vsync, "present ended before the vsync");
        assert_eq!(summary.frame_index, 42, "frame index");
    }

    #[test]
    fn summary_builder_flags_late_present() {
        let mut builder = FrameSummaryBuilder::new(&sample_frame());
        builder.phase_begin(PhaseKind::Present, 10.010);
        builder.phase_end(PhaseKind::Present, 10.013);
        let summary = builder.finish();
        assert!(summary.missed_vsync, "present ended after the vsync");
        assert_eq!(summary.render_seconds, 0.0, "render not measured");
    }

    #[test]
    fn summary_builder_missing_phases_are_zero() {
        let summary = FrameSummaryBuilder::new(&sample_frame()).finish();
        for (name, v) in [
            ("render", summary.render_seconds),
            ("distortion", summary.distortion_seconds),
            ("present", summary.present_seconds),
        ] {
            assert_eq!(v, 0.0, "{name}");
        }
        assert!(!summary.missed_vsync, "no present measured");
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            frames: Vec<u32>,
        }
        impl TraceSink for RecordingSink {
            fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
                self.frames.push(e.frame_index);
            }
        }

        let mut sink = RecordingSink { frames: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.begin_frame(&sample_frame());
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.frames, &[42], "one frame recorded");
    }
}
