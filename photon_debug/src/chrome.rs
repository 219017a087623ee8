// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

// Render-side events go on thread 0, the time-warp thread on 1.
const RENDER_TID: u32 = 0;
const TIMEWARP_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Recorded times are seconds; they are written as microseconds.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    // Rich events carry no time of their own; they are placed at the start of
    // the most recent frame.
    let mut frame_start = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::BeginFrame(e) => {
                frame_start = e.this_frame_time;
                events.push(json!({
                    "ph": "i",
                    "name": "BeginFrame",
                    "cat": "Frame",
                    "ts": seconds_to_us(e.this_frame_time),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                        "next_frame_us": seconds_to_us(e.next_frame_time),
                        "midpoint_us": seconds_to_us(e.midpoint_time),
                        "timewarp_point_us": seconds_to_us(e.timewarp_point_time),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": seconds_to_us(e.timestamp),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": seconds_to_us(e.timestamp),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::Timewarp(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Scanout",
                    "cat": "Timewarp",
                    "ts": seconds_to_us(e.scanout_time),
                    "pid": 0,
                    "tid": TIMEWARP_TID,
                    "s": "t",
                    "args": {
                        "app_frame_index": e.app_frame_index,
                        "jit_timewarp_us": seconds_to_us(e.jit_timewarp_time),
                        "frame_interval_us": seconds_to_us(e.frame_interval),
                    }
                }));
            }
            RecordedEvent::Latency(e) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Latency",
                    "cat": "Latency",
                    "ts": seconds_to_us(frame_start),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "render_ms": e.timings.render * 1000.0,
                        "timewarp_ms": e.timings.timewarp * 1000.0,
                        "scanout_ms": e.timings.frame_to_scanout * 1000.0,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": seconds_to_us(s.next_frame_time),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "render_us": seconds_to_us(s.render_seconds),
                        "distortion_us": seconds_to_us(s.distortion_seconds),
                        "present_us": seconds_to_us(s.present_seconds),
                        "missed_vsync": s.missed_vsync,
                    }
                }));
            }
            RecordedEvent::EyePredictions { frame_index, eyes } => {
                for eye in eyes {
                    events.push(json!({
                        "ph": "X",
                        "name": format!("Timewarp{:?}", eye.eye),
                        "cat": "Rich",
                        "ts": seconds_to_us(eye.timewarp_window[0]),
                        "dur": seconds_to_us(eye.timewarp_window[1] - eye.timewarp_window[0]),
                        "pid": 0,
                        "tid": TIMEWARP_TID,
                        "args": {
                            "frame_index": frame_index,
                            "render_us": seconds_to_us(eye.render_time),
                        }
                    }));
                }
            }
            RecordedEvent::DeltaSamples {
                frame_index,
                samples,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "DeltaSamples",
                    "cat": "Rich",
                    "ts": seconds_to_us(frame_start),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "s": "p",
                    "args": {
                        "frame_index": frame_index,
                        "count": samples.len(),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn seconds_to_us(seconds: f64) -> f64 {
    seconds * 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use photon_core::display::Eye;
    use photon_core::trace::{
        BeginFrameEvent, EyePrediction, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_begin_frame(&BeginFrameEvent {
            frame_index: 0,
            this_frame_time: 1.0,
            next_frame_time: 1.0111,
            midpoint_time: 1.03,
            timewarp_point_time: 0.0,
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Render,
            timestamp: 1.0,
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Render,
            timestamp: 1.005,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        // Should parse as a JSON array.
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 3, "one object per event");

        assert_eq!(parsed[0]["ph"], "i", "frame start is an instant");
        assert_eq!(parsed[0]["name"], "BeginFrame", "frame start name");
        assert_eq!(parsed[0]["ts"], 1_000_000.0, "seconds become microseconds");

        assert_eq!(parsed[1]["ph"], "B", "phase begin");
        assert_eq!(parsed[1]["name"], "Render", "phase name");

        assert_eq!(parsed[2]["ph"], "E", "phase end");
        assert_eq!(parsed[2]["name"], "Render", "phase name");
    }

    #[test]
    fn eye_windows_become_complete_events() {
        let mut rec = RecorderSink::new();
        rec.on_eye_predictions(
            2,
            &[EyePrediction {
                eye: Eye::Left,
                render_time: 2.0,
                timewarp_window: [2.0, 2.5],
            }],
        );
        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["ph"], "X", "duration event");
        assert_eq!(parsed[0]["name"], "TimewarpLeft", "per-eye name");
        assert_eq!(parsed[0]["dur"], 500_000.0, "window length");
        assert_eq!(parsed[0]["tid"], TIMEWARP_TID, "time-warp thread");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty(), "no events");
    }
}
