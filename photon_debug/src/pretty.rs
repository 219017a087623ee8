// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Absolute
//! times are printed in milliseconds relative to an origin, durations in
//! milliseconds.

use std::io::Write;

use photon_core::display::Eye;
use photon_core::trace::{
    BeginFrameEvent, DeltaSample, DeltaSource, EyePrediction, FrameSummary, LatencyEvent,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TimewarpEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    origin: f64,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    ///
    /// Times are printed relative to `origin`, in seconds.
    #[must_use]
    pub fn stderr(origin: f64) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            origin,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, origin: f64) -> Self {
        Self { writer, origin }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, origin: f64) -> Self {
        Self { writer, origin }
    }

    fn at_ms(&self, t: f64) -> f64 {
        (t - self.origin) * 1000.0
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Render => "render",
        PhaseKind::Distortion => "distortion",
        PhaseKind::Present => "present",
    }
}

fn eye_name(eye: Eye) -> &'static str {
    match eye {
        Eye::Left => "L",
        Eye::Right => "R",
    }
}

fn ms(seconds: f64) -> f64 {
    seconds * 1000.0
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let tw = if e.timewarp_point_time > 0.0 {
            format!("{:.3}ms", self.at_ms(e.timewarp_point_time))
        } else {
            "-".to_owned()
        };
        let _ = writeln!(
            self.writer,
            "[frame] frame={} start={:.3}ms present={:.3}ms mid={:.3}ms timewarp={tw}",
            e.frame_index,
            self.at_ms(e.this_frame_time),
            self.at_ms(e.next_frame_time),
            self.at_ms(e.midpoint_time),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.3}ms",
            e.frame_index,
            phase_name(e.phase),
            self.at_ms(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.3}ms",
            e.frame_index,
            phase_name(e.phase),
            self.at_ms(e.timestamp),
        );
    }

    fn on_timewarp(&mut self, e: &TimewarpEvent) {
        let jit = if e.jit_timewarp_time > 0.0 {
            format!("{:.3}ms", self.at_ms(e.jit_timewarp_time))
        } else {
            "off".to_owned()
        };
        let _ = writeln!(
            self.writer,
            "[timewarp] frame={} scanout={:.3}ms jit={jit} interval={:.3}ms",
            e.app_frame_index,
            self.at_ms(e.scanout_time),
            ms(e.frame_interval),
        );
    }

    fn on_latency(&mut self, e: &LatencyEvent) {
        let _ = writeln!(
            self.writer,
            "[latency] frame={} matched={} render={:.2}ms timewarp={:.2}ms scanout={:.2}ms",
            e.frame_index,
            e.newly_matched,
            ms(e.timings.render),
            ms(e.timings.timewarp),
            ms(e.timings.frame_to_scanout),
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let vsync = if s.missed_vsync { "MISSED" } else { "ok" };
        let _ = writeln!(
            self.writer,
            "[summary] frame={} render={:.3}ms distortion={:.3}ms present={:.3}ms vsync={vsync}",
            s.frame_index,
            ms(s.render_seconds),
            ms(s.distortion_seconds),
            ms(s.present_seconds),
        );
    }

    fn on_eye_predictions(&mut self, frame_index: u32, eyes: &[EyePrediction]) {
        for eye in eyes {
            let _ = writeln!(
                self.writer,
                "[eye] frame={frame_index} {} render={:.3}ms warp={:.3}..{:.3}ms",
                eye_name(eye.eye),
                self.at_ms(eye.render_time),
                self.at_ms(eye.timewarp_window[0]),
                self.at_ms(eye.timewarp_window[1]),
            );
        }
    }

    fn on_delta_samples(&mut self, frame_index: u32, samples: &[DeltaSample]) {
        for sample in samples {
            let source = match sample.source {
                DeltaSource::FrameDelta => "frame",
                DeltaSource::Scanout => "scanout",
                DeltaSource::Distortion => "distortion",
            };
            let _ = writeln!(
                self.writer,
                "[delta] frame={frame_index} {source}={:.3}ms",
                ms(sample.seconds),
            );
        }
    }
}
