// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, one tag byte followed by the event's
//! fields; times are stored as `f64` bit patterns. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use photon_core::display::Eye;
use photon_core::latency::LatencyTimings;
use photon_core::trace::{
    BeginFrameEvent, DeltaSample, DeltaSource, EyePrediction, FrameSummary, LatencyEvent,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TimewarpEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_BEGIN_FRAME: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_TIMEWARP: u8 = 4;
const TAG_LATENCY: u8 = 5;
const TAG_FRAME_SUMMARY: u8 = 6;
const TAG_EYE_PREDICTIONS: u8 = 7;
const TAG_DELTA_SAMPLES: u8 = 8;

// Encoded sizes of one list element, for bounding decode allocations.
const EYE_PREDICTION_SIZE: usize = 1 + 3 * 8;
const DELTA_SAMPLE_SIZE: usize = 1 + 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    fn write_count(&mut self, len: usize) {
        self.write_u32(u32::try_from(len).unwrap_or(u32::MAX));
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Render => 0,
            PhaseKind::Distortion => 1,
            PhaseKind::Present => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.write_u8(TAG_BEGIN_FRAME);
        self.write_u32(e.frame_index);
        self.write_f64(e.this_frame_time);
        self.write_f64(e.next_frame_time);
        self.write_f64(e.midpoint_time);
        self.write_f64(e.timewarp_point_time);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u32(e.frame_index);
        self.write_phase(e.phase);
        self.write_f64(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u32(e.frame_index);
        self.write_phase(e.phase);
        self.write_f64(e.timestamp);
    }

    fn on_timewarp(&mut self, e: &TimewarpEvent) {
        self.write_u8(TAG_TIMEWARP);
        self.write_u32(e.app_frame_index);
        self.write_f64(e.scanout_time);
        self.write_f64(e.jit_timewarp_time);
        self.write_f64(e.frame_interval);
    }

    fn on_latency(&mut self, e: &LatencyEvent) {
        self.write_u8(TAG_LATENCY);
        self.write_u32(e.frame_index);
        self.write_count(e.newly_matched);
        self.write_f64(e.timings.render);
        self.write_f64(e.timings.timewarp);
        self.write_f64(e.timings.frame_to_scanout);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u32(s.frame_index);
        self.write_f64(s.this_frame_time);
        self.write_f64(s.next_frame_time);
        self.write_f64(s.render_seconds);
        self.write_f64(s.distortion_seconds);
        self.write_f64(s.present_seconds);
        self.write_u8(u8::from(s.missed_vsync));
    }

    fn on_eye_predictions(&mut self, frame_index: u32, eyes: &[EyePrediction]) {
        self.write_u8(TAG_EYE_PREDICTIONS);
        self.write_u32(frame_index);
        self.write_count(eyes.len());
        for eye in eyes {
            self.write_u8(match eye.eye {
                Eye::Left => 0,
                Eye::Right => 1,
            });
            self.write_f64(eye.render_time);
            self.write_f64(eye.timewarp_window[0]);
            self.write_f64(eye.timewarp_window[1]);
        }
    }

    fn on_delta_samples(&mut self, frame_index: u32, samples: &[DeltaSample]) {
        self.write_u8(TAG_DELTA_SAMPLES);
        self.write_u32(frame_index);
        self.write_count(samples.len());
        for sample in samples {
            self.write_u8(match sample.source {
                DeltaSource::FrameDelta => 0,
                DeltaSource::Scanout => 1,
                DeltaSource::Distortion => 2,
            });
            self.write_f64(sample.seconds);
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`BeginFrameEvent`].
    BeginFrame(BeginFrameEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`TimewarpEvent`].
    Timewarp(TimewarpEvent),
    /// A [`LatencyEvent`].
    Latency(LatencyEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
    /// Per-eye predictions for a frame.
    EyePredictions {
        /// Frame counter.
        frame_index: u32,
        /// Predictions, in recorded order.
        eyes: Vec<EyePrediction>,
    },
    /// Time delta samples for a frame.
    DeltaSamples {
        /// Frame counter.
        frame_index: u32,
        /// Samples, in recorded order.
        samples: Vec<DeltaSample>,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        let v = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn read_f64(&mut self) -> Option<f64> {
        let bytes = self.data.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(f64::from_bits(u64::from_le_bytes(bytes.try_into().ok()?)))
    }

    /// Reads a list length, bounded by the bytes left.
    fn read_count(&mut self, element_size: usize) -> Option<usize> {
        let count = usize::try_from(self.read_u32()?).ok()?;
        (count.checked_mul(element_size)? <= self.remaining()).then_some(count)
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Render,
            1 => PhaseKind::Distortion,
            _ => PhaseKind::Present,
        })
    }

    fn decode_begin_frame(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BeginFrame(BeginFrameEvent {
            frame_index: self.read_u32()?,
            this_frame_time: self.read_f64()?,
            next_frame_time: self.read_f64()?,
            midpoint_time: self.read_f64()?,
            timewarp_point_time: self.read_f64()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u32()?,
            phase: self.read_phase()?,
            timestamp: self.read_f64()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u32()?,
            phase: self.read_phase()?,
            timestamp: self.read_f64()?,
        }))
    }

    fn decode_timewarp(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Timewarp(TimewarpEvent {
            app_frame_index: self.read_u32()?,
            scanout_time: self.read_f64()?,
            jit_timewarp_time: self.read_f64()?,
            frame_interval: self.read_f64()?,
        }))
    }

    fn decode_latency(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Latency(LatencyEvent {
            frame_index: self.read_u32()?,
            newly_matched: usize::try_from(self.read_u32()?).ok()?,
            timings: LatencyTimings {
                render: self.read_f64()?,
                timewarp: self.read_f64()?,
                frame_to_scanout: self.read_f64()?,
            },
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u32()?,
            this_frame_time: self.read_f64()?,
            next_frame_time: self.read_f64()?,
            render_seconds: self.read_f64()?,
            distortion_seconds: self.read_f64()?,
            present_seconds: self.read_f64()?,
            missed_vsync: self.read_u8()? != 0,
        }))
    }

    fn decode_eye_predictions(&mut self) -> Option<RecordedEvent> {
        let frame_index = self.read_u32()?;
        let count = self.read_count(EYE_PREDICTION_SIZE)?;
        let mut eyes = Vec::with_capacity(count);
        for _ in 0..count {
            let eye = if self.read_u8()? == 0 { Eye::Left } else { Eye::Right };
            eyes.push(EyePrediction {
                eye,
                render_time: self.read_f64()?,
                timewarp_window: [self.read_f64()?, self.read_f64()?],
            });
        }
        Some(RecordedEvent::EyePredictions { frame_index, eyes })
    }

    fn decode_delta_samples(&mut self) -> Option<RecordedEvent> {
        let frame_index = self.read_u32()?;
        let count = self.read_count(DELTA_SAMPLE_SIZE)?;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let source = match self.read_u8()? {
                0 => DeltaSource::FrameDelta,
                1 => DeltaSource::Scanout,
                _ => DeltaSource::Distortion,
            };
            samples.push(DeltaSample {
                source,
                seconds: self.read_f64()?,
            });
        }
        Some(RecordedEvent::DeltaSamples {
            frame_index,
            samples,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_BEGIN_FRAME => self.decode_begin_frame(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_TIMEWARP => self.decode_timewarp(),
            TAG_LATENCY => self.decode_latency(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            TAG_EYE_PREDICTIONS => self.decode_eye_predictions(),
            TAG_DELTA_SAMPLES => self.decode_delta_samples(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
