// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated headset frame loop that exercises timing prediction, latency
//! tracking and the tracing pipeline.
//!
//! Runs 90 synthetic frames on a [`ManualClock`]: the render thread predicts
//! eye poses, the time-warp timer computes scanout and publishes the
//! application base record, and a simulated latency sensor reads back the
//! tagged frames two frames later. Events go to both a
//! [`PrettyPrintSink`](photon_debug::pretty::PrettyPrintSink) and a
//! [`RecorderSink`](photon_debug::recorder::RecorderSink), and the recording is
//! exported as a Chrome trace JSON file.
//!
//! Set `RUST_LOG=debug` to see the application-side predictions.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;

use photon_core::app_timing::{AppRenderTimer, LocklessAppTimingBase};
use photon_core::compositor::{CompositorTimingConfig, TimewarpTimer};
use photon_core::display::{DisplayInfo, Eye};
use photon_core::frame_timing::{FrameTimeManager, FrameTimingConfig, PoseOracle, PoseSample};
use photon_core::latency::MatchOutcome;
use photon_core::lockless::{LocklessReader, snapshot_channel};
use photon_core::pose::{Pose, Quat, Vec3};
use photon_core::time::{ManualClock, TimeSource};
use photon_core::trace::{
    BeginFrameEvent, DeltaSample, DeltaSource, EyePrediction, FrameSummary, FrameSummaryBuilder,
    LatencyEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TimewarpEvent, TraceSink, Tracer,
};

use photon_debug::pretty::PrettyPrintSink;
use photon_debug::recorder::RecorderSink;
use photon_host::{LatencyTester, PixelRead, TestResult};

const FRAME_COUNT: u32 = 90;
const START_TIME: f64 = 1.0;
const RENDER_SECONDS: f64 = 0.005;
const DISTORTION_SECONDS: f64 = 0.0012;
/// Frame 40 renders slowly and misses its vsync.
const SLOW_FRAME: u32 = 40;
/// The sensor reports a frame this many frames after it was drawn.
const SENSOR_DELAY_FRAMES: usize = 2;
/// Frame end to photons, as seen by the simulated sensor.
const SCANOUT_DELAY: f64 = 0.0125;

/// A head turning at a constant rate, sampled 2 ms before each request.
#[derive(Debug)]
struct TurningHead;

impl PoseOracle for TurningHead {
    fn pose_at(&self, time: f64) -> PoseSample {
        PoseSample {
            predicted: Pose::new(
                Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), time * 0.5),
                Vec3::new(0.0, 1.7, 0.0),
            ),
            sample_time: time - 0.002,
        }
    }
}

/// Forwards every event to both sinks.
#[derive(Debug)]
struct Sinks {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

impl TraceSink for Sinks {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.pretty.on_begin_frame(e);
        self.recorder.on_begin_frame(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.pretty.on_phase_begin(e);
        self.recorder.on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.pretty.on_phase_end(e);
        self.recorder.on_phase_end(e);
    }

    fn on_timewarp(&mut self, e: &TimewarpEvent) {
        self.pretty.on_timewarp(e);
        self.recorder.on_timewarp(e);
    }

    fn on_latency(&mut self, e: &LatencyEvent) {
        self.pretty.on_latency(e);
        self.recorder.on_latency(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.pretty.on_frame_summary(s);
        self.recorder.on_frame_summary(s);
    }

    fn on_eye_predictions(&mut self, frame_index: u32, eyes: &[EyePrediction]) {
        self.pretty.on_eye_predictions(frame_index, eyes);
        self.recorder.on_eye_predictions(frame_index, eyes);
    }

    fn on_delta_samples(&mut self, frame_index: u32, samples: &[DeltaSample]) {
        self.pretty.on_delta_samples(frame_index, samples);
        self.recorder.on_delta_samples(frame_index, samples);
    }
}

fn main() {
    env_logger::init();

    let clock = ManualClock::new(START_TIME);
    let display = DisplayInfo::default();
    let interval = display.shutter.vsync_to_next_vsync;
    let head = TurningHead;

    // -- sinks -------------------------------------------------------------
    let mut sinks = Sinks {
        pretty: PrettyPrintSink::new(Box::new(std::io::stdout()), START_TIME),
        recorder: RecorderSink::new(),
    };

    // -- render side ---------------------------------------------------------
    let mut timing = FrameTimeManager::new(FrameTimingConfig::dk2(), clock.clone());
    timing.init(&display);

    // -- time-warp side and the application's view of it ---------------------
    let (base_writer, base_reader) = snapshot_channel::<LocklessAppTimingBase>();
    let mut timewarp = TimewarpTimer::new(
        CompositorTimingConfig::linux(),
        &display,
        clock.clone(),
        base_writer,
    );
    let app_timer: AppRenderTimer<LocklessReader<LocklessAppTimingBase>, _> =
        AppRenderTimer::with_source(base_reader, clock.clone());

    // -- latency sensor ------------------------------------------------------
    let tester = LatencyTester::new(clock.clone());
    let records = tester.record_reader();
    let mut in_flight: VecDeque<(u8, f64)> = VecDeque::new();

    // -- simulated loop ------------------------------------------------------
    let mut tracer = Tracer::new(&mut sinks);
    for frame_index in 0..FRAME_COUNT {
        // 1. Begin frame
        let frame_start = timing.begin_frame(frame_index);
        let begin = BeginFrameEvent::from(timing.timing());
        tracer.begin_frame(&begin);
        let mut builder = FrameSummaryBuilder::new(&begin);

        let app = app_timer.app_timing_for_index(true, frame_index);
        log::debug!(
            "frame {frame_index}: application predicts scanout at {:.4}s (display frame {})",
            app.scanout_start_time,
            app.display_frame_index
        );

        // 2. Render both eyes
        let render_start = clock.now_seconds();
        emit_phase_begin(&mut tracer, &mut builder, frame_index, PhaseKind::Render, render_start);
        let poses = Eye::BOTH.map(|eye| timing.eye_prediction_pose(&head, eye));
        let eyes = Eye::BOTH.map(|eye| EyePrediction {
            eye,
            render_time: timing.eye_prediction_time(eye),
            timewarp_window: timing.timewarp_predictions(eye),
        });
        tracer.eye_predictions(frame_index, &eyes);
        let render_seconds = if frame_index == SLOW_FRAME {
            interval * 1.5
        } else {
            RENDER_SECONDS
        };
        clock.advance(render_seconds);
        emit_phase_end(
            &mut tracer,
            &mut builder,
            frame_index,
            PhaseKind::Render,
            clock.now_seconds(),
        );

        // 3. Time-warp distortion
        let distortion_start = clock.now_seconds();
        emit_phase_begin(
            &mut tracer,
            &mut builder,
            frame_index,
            PhaseKind::Distortion,
            distortion_start,
        );
        let warp = timewarp.calculate_timewarp_timing(frame_index, None, None);
        tracer.timewarp(&TimewarpEvent::new(frame_index, &warp, interval));
        for (eye, pose) in Eye::BOTH.into_iter().zip(&poses) {
            let matrices = timing.timewarp_matrices(Some(&head as &dyn PoseOracle), eye, pose);
            debug_assert!(matrices.iter().all(|m| m.is_finite()), "time-warp matrices finite");
        }
        clock.advance(DISTORTION_SECONDS);
        if timing.need_distortion_time_measurement() {
            timing.add_distortion_time_measurement(DISTORTION_SECONDS);
        }
        if timewarp.need_distortion_time_measurement() {
            timewarp.add_distortion_time_measurement(DISTORTION_SECONDS);
        }
        emit_phase_end(
            &mut tracer,
            &mut builder,
            frame_index,
            PhaseKind::Distortion,
            clock.now_seconds(),
        );

        // 4. Present: the swap returns at the next vsync
        let present_start = clock.now_seconds();
        emit_phase_begin(
            &mut tracer,
            &mut builder,
            frame_index,
            PhaseKind::Present,
            present_start,
        );
        clock.set(next_vsync(frame_start, present_start, interval));
        timewarp.set_last_present_time();
        timing.end_frame();
        let present_end = clock.now_seconds();
        emit_phase_end(
            &mut tracer,
            &mut builder,
            frame_index,
            PhaseKind::Present,
            present_end,
        );
        tracer.delta_samples(
            frame_index,
            &[DeltaSample {
                source: DeltaSource::FrameDelta,
                seconds: present_end - frame_start,
            }],
        );

        // 5. Latency: the sensor sees frames drawn a couple of frames ago
        let color = timing.next_draw_color();
        in_flight.push_back((color, present_end));
        if in_flight.len() > SENSOR_DELAY_FRAMES
            && let Some((seen, drawn_at)) = in_flight.pop_front()
        {
            tester.handle_pixel_read(&PixelRead {
                pixel_read_value: seen,
                frame_time_seconds: drawn_at + SCANOUT_DELAY,
                ..PixelRead::default()
            });
        }
        match timing.update_frame_latency_tracking_after_end_frame(color, &records.load()) {
            MatchOutcome::Matched { newly_matched } | MatchOutcome::Completed { newly_matched } => {
                tracer.latency(&LatencyEvent {
                    frame_index,
                    newly_matched,
                    timings: timing.latency_timings(),
                });
            }
            MatchOutcome::Armed => log::debug!("frame {frame_index}: latency tracking armed"),
            MatchOutcome::Nothing => {}
        }

        // 6. Summary
        tracer.frame_summary(&builder.finish());
    }
    drop(tracer);

    // -- one manual photon-to-photon test ------------------------------------
    tester.begin_test(None);
    let (test_color, _) = tester.display_screen_color();
    clock.advance(interval + SCANOUT_DELAY);
    tester.handle_pixel_read(&PixelRead {
        pixel_read_value: test_color,
        frame_time_seconds: clock.now_seconds(),
        ..PixelRead::default()
    });
    match tester.result() {
        TestResult::Measured(seconds) => {
            log::info!("manual latency test: {:.2} ms", seconds * 1000.0);
        }
        other => log::warn!("manual latency test did not complete: {other:?}"),
    }

    // -- export Chrome trace -------------------------------------------------
    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    photon_debug::chrome::export(sinks.recorder.as_bytes(), &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({FRAME_COUNT} frames)");
}

/// The first vsync at or after `now`, on the grid starting at `frame_start`.
fn next_vsync(frame_start: f64, now: f64, interval: f64) -> f64 {
    let elapsed = (now - frame_start).max(0.0);
    frame_start + (elapsed / interval).ceil().max(1.0) * interval
}

fn emit_phase_begin(
    tracer: &mut Tracer<'_>,
    builder: &mut FrameSummaryBuilder,
    frame_index: u32,
    phase: PhaseKind,
    timestamp: f64,
) {
    builder.phase_begin(phase, timestamp);
    tracer.phase_begin(&PhaseBeginEvent {
        frame_index,
        phase,
        timestamp,
    });
}

fn emit_phase_end(
    tracer: &mut Tracer<'_>,
    builder: &mut FrameSummaryBuilder,
    frame_index: u32,
    phase: PhaseKind,
    timestamp: f64,
) {
    builder.phase_end(phase, timestamp);
    tracer.phase_end(&PhaseEndEvent {
        frame_index,
        phase,
        timestamp,
    });
}
