// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Processing of pixel readbacks from the headset's latency sensor.
//!
//! The sensor reports the gray level under it together with the scanout time.
//! [`LatencyTester`] turns valid readbacks into the short
//! [`FrameTimeRecordSet`] history consumed by frame timing, and runs manual
//! photon-to-photon tests: [`begin_test`](LatencyTester::begin_test) switches
//! the test patch to a new gray level and the test completes when the sensor
//! sees it.
//!
//! Readbacks arrive on the device thread while the render thread asks for the
//! patch color, so all state sits behind a mutex. Frame timing reads the
//! record set through a lock-free [`LocklessReader`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use photon_core::lockless::{LocklessReader, LocklessWriter, snapshot_channel};
use photon_core::record::{
    COLOR_INCREMENT, FrameTimeRecord, FrameTimeRecordSet, PIXEL_TEST_THRESHOLD,
};
use photon_core::time::TimeSource;

/// A test with no matching readback for more than this many milliseconds of
/// sensor time is abandoned.
pub const TIMEOUT_WAITING_FOR_COLOR_MS: i32 = 1_000;

/// One report from the latency sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelRead {
    /// Gray level seen by the sensor.
    pub pixel_read_value: u8,
    /// Scanout time of the observed frame, in pipeline seconds.
    pub frame_time_seconds: f64,
    /// Scanout time on the sensor's own microsecond counter.
    pub raw_frame_time: u32,
    /// Sensor counter when the report was produced, in microseconds.
    pub raw_sensor_time: u32,
}

/// Outcome of the most recent manual test.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TestResult {
    /// No test has finished yet.
    #[default]
    None,
    /// The sensor saw the test color this many seconds after the test began.
    Measured(f64),
    /// The test color was not seen within a second.
    TimedOut,
}

#[derive(Debug)]
struct TesterState {
    test_active: bool,
    render_color: u8,
    last_read: PixelRead,
    start_time: f64,
    raw_start_time: u32,
    raw_latency: u32,
    result: TestResult,
    reads_before_settle: u32,
    tests_successful: u32,
    recent: FrameTimeRecordSet,
    records: LocklessWriter<FrameTimeRecordSet>,
}

/// Latency sensor readback processing and manual latency tests.
#[derive(Debug)]
pub struct LatencyTester<C> {
    state: Mutex<TesterState>,
    reader: LocklessReader<FrameTimeRecordSet>,
    clock: C,
}

impl<C: TimeSource> LatencyTester<C> {
    /// Creates an idle tester.
    pub fn new(clock: C) -> Self {
        let (records, reader) = snapshot_channel();
        Self {
            state: Mutex::new(TesterState {
                test_active: false,
                render_color: 0,
                last_read: PixelRead::default(),
                start_time: -1.0,
                raw_start_time: 0,
                raw_latency: 0,
                result: TestResult::None,
                reads_before_settle: 0,
                tests_successful: 0,
                recent: FrameTimeRecordSet::new(),
                records,
            }),
            reader,
            clock,
        }
    }

    fn locked(&self) -> MutexGuard<'_, TesterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Processes one sensor report.
    pub fn handle_pixel_read(&self, read: &PixelRead) {
        let mut state = self.locked();
        state.last_read = *read;

        if let Some(readback_index) = FrameTimeRecord::color_to_readback_index(read.pixel_read_value)
        {
            state.recent.add_value(readback_index, read.frame_time_seconds);
            let recent = state.recent;
            state.records.publish(&recent);
        }
        state.reads_before_settle += 1;

        if !state.test_active {
            return;
        }
        let pixel_diff = i32::from(state.render_color) - i32::from(read.pixel_read_value);
        // The scanout of a later report may precede the anchor, which is when
        // the previous report was produced.
        let raw_diff = read.raw_frame_time.wrapping_sub(state.raw_start_time).cast_signed();
        if pixel_diff < PIXEL_TEST_THRESHOLD && pixel_diff > -PIXEL_TEST_THRESHOLD {
            state.test_active = false;
            let latency = read.frame_time_seconds - state.start_time;
            state.result = TestResult::Measured(latency);
            state.raw_latency = raw_diff.max(0).unsigned_abs();
            state.tests_successful += 1;
            log::debug!(
                "latency test {} measured {:.2} ms after {} reads",
                state.tests_successful,
                latency * 1000.0,
                state.reads_before_settle
            );
        } else if raw_diff / 1000 > TIMEOUT_WAITING_FOR_COLOR_MS {
            state.test_active = false;
            state.result = TestResult::TimedOut;
            log::warn!(
                "latency test timed out waiting for color {}",
                state.render_color
            );
        }
    }

    /// Starts a test: the patch switches to the next gray level.
    ///
    /// `start_time` defaults to now. Ignored while a test is running.
    pub fn begin_test(&self, start_time: Option<f64>) {
        let now = self.clock.now_seconds();
        let mut state = self.locked();
        if state.test_active {
            return;
        }
        state.test_active = true;
        state.reads_before_settle = 0;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the increment is below 256, so the step wraps within a byte"
        )]
        let step = COLOR_INCREMENT as u8;
        state.render_color = state.render_color.wrapping_add(step);
        state.raw_start_time = state.last_read.raw_sensor_time;
        state.start_time = start_time.filter(|&t| t > 0.0).unwrap_or(now);
    }

    /// Gray level to draw into the test patch, and whether a test is running.
    #[must_use]
    pub fn display_screen_color(&self) -> (u8, bool) {
        let state = self.locked();
        (state.render_color, state.test_active)
    }

    /// Is a test running?
    #[must_use]
    pub fn is_measuring(&self) -> bool {
        self.locked().test_active
    }

    /// Result of the last finished test.
    #[must_use]
    pub fn result(&self) -> TestResult {
        self.locked().result
    }

    /// Last measured latency on the sensor's clock, in microseconds.
    #[must_use]
    pub fn raw_latency_us(&self) -> u32 {
        self.locked().raw_latency
    }

    /// A lock-free reader of the recent readback records.
    #[must_use]
    pub fn record_reader(&self) -> LocklessReader<FrameTimeRecordSet> {
        self.reader.clone()
    }
}
