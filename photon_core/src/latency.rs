// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Measured display latency from tagged frame colors.
//!
//! [`FrameLatencyTracker`] drives the latency-sensing hardware: the renderer
//! draws [`next_draw_color`](FrameLatencyTracker::next_draw_color) into a
//! corner of each frame, the tracker remembers when each tagged frame ended,
//! and when the sensor's [`FrameTimeRecordSet`] reports the same sequence of
//! tags the difference between scanout and frame end becomes a latency sample.
//!
//! ```text
//!   WaitZeroes ──(sensor set all neutral)──► WaitMatch
//!       ▲                                       │
//!       ├───────(all 7 tags matched)────────────┤
//!       └───────(oldest tag timed out)──────────┘
//! ```
//!
//! The neutral phase guarantees that any tag seen afterwards belongs to the
//! current cycle. A match needs a run of consecutive tags so that a single
//! stray color cannot be mistaken for a frame.

use crate::delta::TimeDeltaCollector;
use crate::record::{FrameTimeRecord, FrameTimeRecordSet, INCREMENT_COUNT};

/// Number of tagged frames in flight per cycle (every tag except neutral).
pub const FRAMES_TRACKED: usize = INCREMENT_COUNT.unsigned_abs() as usize - 1;

/// Tunable thresholds of the matching state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencyTrackerConfig {
    /// Once every tag is in flight, restart the cycle if a frame ends this long
    /// after the newest tagged frame without the cycle completing.
    pub match_timeout: f64,
    /// Shortest run of consecutive tags accepted as a match.
    pub min_consecutive_matches: usize,
    /// Latency readings older than this are reported as zero.
    pub stale_after: f64,
}

impl LatencyTrackerConfig {
    /// 150 ms timeout, runs of two, 2 s staleness.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            match_timeout: 0.150,
            min_consecutive_matches: 2,
            stale_after: 2.0,
        }
    }
}

impl Default for LatencyTrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Phase of the matching cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackerState {
    /// Drawing neutral frames until the sensor reports only neutral tags.
    #[default]
    WaitZeroes,
    /// Drawing tagged frames and matching them against sensor readbacks.
    WaitMatch,
}

/// A tagged frame awaiting its scanout readback.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTimeRecordEx {
    /// Tag and frame end time.
    pub record: FrameTimeRecord,
    /// When the head pose used for rendering was sampled, or 0.
    pub render_imu_time: f64,
    /// When the head pose used for time-warp was sampled, or 0.
    pub timewarp_imu_time: f64,
    /// Set once a latency sample has been taken for this frame.
    pub matched: bool,
}

/// Result of feeding one sensor readback set to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Nothing changed.
    Nothing,
    /// The sensor went neutral; tagged frames start with the next draw.
    Armed,
    /// A run of tags matched and `newly_matched` frames produced samples.
    Matched {
        /// Frames matched for the first time by this readback.
        newly_matched: usize,
    },
    /// The final tags of the cycle matched; the tracker is waiting for zeroes
    /// again.
    Completed {
        /// Frames matched for the first time by this readback.
        newly_matched: usize,
    },
}

/// Latest latency readings, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencyTimings {
    /// Render pose sample to scanout.
    pub render: f64,
    /// Time-warp pose sample to scanout, 0 when no time-warp ran.
    pub timewarp: f64,
    /// Median of frame end to scanout deltas.
    pub frame_to_scanout: f64,
}

/// Matching state machine over tagged frame colors.
#[derive(Clone, Debug)]
pub struct FrameLatencyTracker {
    config: LatencyTrackerConfig,
    enabled: bool,
    state: TrackerState,
    frame_index: usize,
    match_count: usize,
    frame_end_times: [FrameTimeRecordEx; FRAMES_TRACKED],
    frame_deltas: TimeDeltaCollector,
    latency_record_time: f64,
    render_latency: f64,
    timewarp_latency: f64,
}

impl Default for FrameLatencyTracker {
    fn default() -> Self {
        Self::new(LatencyTrackerConfig::new())
    }
}

impl FrameLatencyTracker {
    /// Creates an enabled tracker waiting for zeroes.
    #[must_use]
    pub fn new(config: LatencyTrackerConfig) -> Self {
        Self {
            config,
            enabled: true,
            state: TrackerState::WaitZeroes,
            frame_index: 0,
            match_count: 0,
            frame_end_times: [FrameTimeRecordEx::default(); FRAMES_TRACKED],
            frame_deltas: TimeDeltaCollector::new(),
            latency_record_time: 0.0,
            render_latency: 0.0,
            timewarp_latency: 0.0,
        }
    }

    /// Returns to the initial state and discards every sample.
    ///
    /// The tracker is re-enabled.
    pub fn reset(&mut self) {
        self.enabled = true;
        self.state = TrackerState::WaitZeroes;
        self.frame_index = 0;
        self.match_count = 0;
        self.render_latency = 0.0;
        self.timewarp_latency = 0.0;
        self.frame_deltas.clear();
    }

    /// Enables or disables tagging. A disabled tracker only draws neutral.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Is tagging enabled?
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Frames matched in the current cycle.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Tagged frames issued in the current cycle.
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.frame_index
    }

    /// Tagged frames of the current cycle, oldest first.
    #[must_use]
    pub fn in_flight(&self) -> &[FrameTimeRecordEx] {
        &self.frame_end_times[..self.frame_index]
    }

    /// Frame end to scanout samples.
    #[must_use]
    pub fn frame_deltas(&self) -> &TimeDeltaCollector {
        &self.frame_deltas
    }

    /// Color to draw into the next frame's latency patch.
    #[must_use]
    pub fn next_draw_color(&self) -> u8 {
        if !self.enabled
            || self.state == TrackerState::WaitZeroes
            || self.frame_index >= FRAMES_TRACKED
        {
            return FrameTimeRecord::readback_index_to_color(0);
        }
        FrameTimeRecord::readback_index_to_color(Self::tag_for(self.frame_index))
    }

    /// Remembers that the frame drawn with `color` ended at `frame_end_time`.
    pub fn save_draw_color(
        &mut self,
        color: u8,
        frame_end_time: f64,
        render_imu_time: f64,
        timewarp_imu_time: f64,
    ) {
        if !self.enabled || self.state == TrackerState::WaitZeroes {
            return;
        }

        if self.frame_index < FRAMES_TRACKED {
            let readback_index = Self::tag_for(self.frame_index);
            debug_assert_eq!(
                FrameTimeRecord::readback_index_to_color(readback_index),
                color,
                "drawn color does not match the tracker's tag"
            );
            self.frame_end_times[self.frame_index] = FrameTimeRecordEx {
                record: FrameTimeRecord {
                    readback_index,
                    time_seconds: frame_end_time,
                },
                render_imu_time,
                timewarp_imu_time,
                matched: false,
            };
            self.frame_index += 1;
            return;
        }

        let newest = self.frame_end_times[self.frame_index - 1].record.time_seconds;
        if frame_end_time > newest + self.config.match_timeout {
            if self.match_count == 0 {
                self.render_latency = 0.0;
                self.timewarp_latency = 0.0;
            }
            self.restart_cycle();
        }
    }

    /// Matches the in-flight tags against a sensor readback set.
    pub fn match_record(&mut self, set: &FrameTimeRecordSet) -> MatchOutcome {
        if !self.enabled {
            return MatchOutcome::Nothing;
        }

        if self.state == TrackerState::WaitZeroes {
            if set.is_all_zeroes() {
                debug_assert_eq!(self.frame_index, 0, "tagged frames left over while waiting");
                self.state = TrackerState::WaitMatch;
                self.match_count = 0;
                return MatchOutcome::Armed;
            }
            return MatchOutcome::Nothing;
        }

        let mut newly_matched = 0;
        let mut accepted = false;
        for i in 0..self.frame_index {
            let tag = self.frame_end_times[i].record.readback_index;
            debug_assert_ne!(tag, 0, "in-flight frames carry non-neutral tags");
            let Some(first) = set.find_readback_index(0, tag) else {
                continue;
            };

            let run = 1 + (i + 1..self.frame_index)
                .zip(first + 1..FrameTimeRecordSet::RECORD_COUNT)
                .take_while(|&(j, r)| {
                    set[r].readback_index == self.frame_end_times[j].record.readback_index
                })
                .count();
            if run < self.config.min_consecutive_matches {
                continue;
            }

            for q in 0..run {
                let scanout = set[first + q];
                let frame = &mut self.frame_end_times[i + q];
                if frame.matched {
                    continue;
                }
                let delta = scanout.time_seconds - frame.record.time_seconds;
                if delta > 0.0 {
                    self.frame_deltas.add_time_delta(delta);
                    self.latency_record_time = scanout.time_seconds;
                    self.render_latency = scanout.time_seconds - frame.render_imu_time;
                    self.timewarp_latency = if frame.timewarp_imu_time == 0.0 {
                        0.0
                    } else {
                        scanout.time_seconds - frame.timewarp_imu_time
                    };
                }
                frame.matched = true;
                self.match_count += 1;
                newly_matched += 1;
            }
            accepted = true;
            break;
        }

        if self.match_count == FRAMES_TRACKED {
            self.restart_cycle();
            return MatchOutcome::Completed { newly_matched };
        }
        if accepted {
            MatchOutcome::Matched { newly_matched }
        } else {
            MatchOutcome::Nothing
        }
    }

    /// Latest readings, or zeros once they are older than the stale limit.
    #[must_use]
    pub fn latency_timings(&self, now: f64) -> LatencyTimings {
        if now > self.latency_record_time + self.config.stale_after {
            return LatencyTimings::default();
        }
        LatencyTimings {
            render: self.render_latency,
            timewarp: self.timewarp_latency,
            frame_to_scanout: self.frame_deltas.median(),
        }
    }

    /// Measured vsync to scanout delay, when enough plausible samples exist.
    #[must_use]
    pub fn vsync_to_scanout(&self) -> Option<f64> {
        if self.frame_deltas.count() <= 3 {
            return None;
        }
        let median = self.frame_deltas.median();
        (-0.002..=0.06).contains(&median).then_some(median)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot indices are below FRAMES_TRACKED"
    )]
    const fn tag_for(slot: usize) -> i32 {
        slot as i32 + 1
    }

    fn restart_cycle(&mut self) {
        self.state = TrackerState::WaitZeroes;
        self.match_count = 0;
        self.frame_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(tag: i32) -> u8 {
        FrameTimeRecord::readback_index_to_color(tag)
    }

    /// Tracker that has seen neutral readbacks and issued `frames` tags, frame
    /// `k` ending at `1.0 + 0.01 * k`.
    fn armed_with_frames(frames: usize) -> FrameLatencyTracker {
        let mut tracker = FrameLatencyTracker::default();
        assert_eq!(
            tracker.match_record(&FrameTimeRecordSet::new()),
            MatchOutcome::Armed,
            "neutral set arms the tracker"
        );
        for k in 0..frames {
            let c = tracker.next_draw_color();
            let t = 1.0 + 0.01 * k as f64;
            tracker.save_draw_color(c, t, t - 0.02, t - 0.005);
        }
        tracker
    }

    #[test]
    fn waits_for_zeroes_first() {
        let mut tracker = FrameLatencyTracker::default();
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "initial state");
        assert_eq!(tracker.next_draw_color(), color(0), "neutral while waiting");

        let mut set = FrameTimeRecordSet::new();
        set.add_value(3, 0.5);
        assert_eq!(tracker.match_record(&set), MatchOutcome::Nothing, "tag still visible");
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "not armed");

        for _ in 0..4 {
            set.add_value(0, 0.6);
        }
        assert_eq!(tracker.match_record(&set), MatchOutcome::Armed, "all neutral");
        assert_eq!(tracker.state(), TrackerState::WaitMatch, "armed");
        assert_eq!(tracker.next_draw_color(), color(1), "first tag");
    }

    #[test]
    fn save_is_ignored_while_waiting_for_zeroes() {
        let mut tracker = FrameLatencyTracker::default();
        tracker.save_draw_color(color(0), 1.0, 0.9, 0.0);
        assert_eq!(tracker.frames_in_flight(), 0, "nothing recorded");
    }

    #[test]
    fn tags_advance_per_saved_frame() {
        let tracker = armed_with_frames(3);
        let tags: std::vec::Vec<i32> = tracker
            .in_flight()
            .iter()
            .map(|f| f.record.readback_index)
            .collect();
        assert_eq!(tags, [1, 2, 3], "tags follow the in-flight count");
        assert_eq!(tracker.next_draw_color(), color(4), "next tag");
    }

    #[test]
    fn single_match_is_not_accepted() {
        let mut tracker = armed_with_frames(3);
        let mut set = FrameTimeRecordSet::new();
        set.add_value(0, 1.0);
        set.add_value(0, 1.0);
        set.add_value(0, 1.0);
        set.add_value(1, 1.05);
        assert_eq!(tracker.match_record(&set), MatchOutcome::Nothing, "run of one");
        assert_eq!(tracker.match_count(), 0, "unchanged");
        assert_eq!(tracker.frame_deltas().count(), 0, "no samples");
    }

    #[test]
    fn run_of_two_records_latency() {
        let mut tracker = armed_with_frames(3);
        let mut set = FrameTimeRecordSet::new();
        set.add_value(0, 0.0);
        set.add_value(0, 0.0);
        set.add_value(1, 1.015);
        set.add_value(2, 1.025);

        assert_eq!(
            tracker.match_record(&set),
            MatchOutcome::Matched { newly_matched: 2 },
            "tags 1 and 2 in a row"
        );
        assert_eq!(tracker.match_count(), 2, "both frames matched");
        assert_eq!(tracker.frame_deltas().count(), 2, "two samples");

        // Frame 2 ended at 1.01 with its render pose sampled at 0.99 and the
        // time-warp pose at 1.005.
        let timings = tracker.latency_timings(1.1);
        assert!((timings.render - (1.025 - 0.99)).abs() < 1e-12, "render latency: {timings:?}");
        assert!((timings.timewarp - (1.025 - 1.005)).abs() < 1e-12, "timewarp latency");
        assert!((timings.frame_to_scanout - 0.015).abs() < 1e-12, "median of 0.015, 0.015");

        assert_eq!(
            tracker.match_record(&set),
            MatchOutcome::Matched { newly_matched: 0 },
            "same readback again adds nothing"
        );
        assert_eq!(tracker.match_count(), 2, "already matched frames are not recounted");
    }

    #[test]
    fn non_positive_delta_marks_matched_without_sample() {
        let mut tracker = armed_with_frames(2);
        let mut set = FrameTimeRecordSet::new();
        set.add_value(1, 0.5);
        set.add_value(2, 1.02);
        assert_eq!(
            tracker.match_record(&set),
            MatchOutcome::Matched { newly_matched: 2 },
            "run accepted"
        );
        assert_eq!(tracker.frame_deltas().count(), 1, "scanout before frame end is skipped");
    }

    #[test]
    fn completing_all_tags_restarts_cycle() {
        let mut tracker = armed_with_frames(FRAMES_TRACKED);
        assert_eq!(tracker.next_draw_color(), color(0), "all tags in flight");

        let mut total = 0;
        let mut outcome = MatchOutcome::Nothing;
        for start in [1, 5] {
            let mut set = FrameTimeRecordSet::new();
            for tag in start..start + 4 {
                if tag <= 7 {
                    set.add_value(tag, 2.0 + 0.01 * f64::from(tag));
                }
            }
            outcome = tracker.match_record(&set);
            if let MatchOutcome::Matched { newly_matched } | MatchOutcome::Completed { newly_matched } =
                outcome
            {
                total += newly_matched;
            }
        }
        assert_eq!(total, FRAMES_TRACKED, "every frame matched once");
        assert_eq!(
            outcome,
            MatchOutcome::Completed { newly_matched: 3 },
            "last readback completes the cycle"
        );
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "back to neutral");
        assert_eq!(tracker.match_count(), 0, "count reset");
        assert_eq!(tracker.frames_in_flight(), 0, "in-flight reset");
        assert_eq!(tracker.frame_deltas().count(), FRAMES_TRACKED, "samples survive the restart");
    }

    #[test]
    fn timeout_without_matches_zeroes_latency() {
        let mut tracker = armed_with_frames(FRAMES_TRACKED);
        // Newest frame ended at 1.06; 1.2 is within the timeout.
        tracker.save_draw_color(color(0), 1.2, 0.0, 0.0);
        assert_eq!(tracker.state(), TrackerState::WaitMatch, "still waiting");

        tracker.save_draw_color(color(0), 1.25, 0.0, 0.0);
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "timed out");
        assert_eq!(tracker.frames_in_flight(), 0, "cycle restarted");
        assert_eq!(tracker.latency_timings(1.25).render, 0.0, "no reading");
    }

    #[test]
    fn timeout_after_partial_match_keeps_latency() {
        let mut tracker = armed_with_frames(FRAMES_TRACKED);
        let mut set = FrameTimeRecordSet::new();
        set.add_value(1, 1.02);
        set.add_value(2, 1.03);
        assert!(
            matches!(tracker.match_record(&set), MatchOutcome::Matched { .. }),
            "partial match"
        );
        tracker.save_draw_color(color(0), 5.0, 0.0, 0.0);
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "timed out");
        let timings = tracker.latency_timings(1.5);
        assert!(timings.render > 0.0, "reading kept: {timings:?}");
    }

    #[test]
    fn stale_readings_are_zero() {
        let mut tracker = armed_with_frames(2);
        let mut set = FrameTimeRecordSet::new();
        set.add_value(1, 1.02);
        set.add_value(2, 1.03);
        let _ = tracker.match_record(&set);
        assert!(tracker.latency_timings(3.0).render > 0.0, "within 2 s of 1.03");
        assert_eq!(
            tracker.latency_timings(3.04),
            LatencyTimings::default(),
            "more than 2 s after the last reading"
        );
    }

    #[test]
    fn disabled_tracker_draws_neutral_and_ignores_input() {
        let mut tracker = armed_with_frames(1);
        tracker.set_enabled(false);
        assert_eq!(tracker.next_draw_color(), color(0), "neutral while disabled");
        tracker.save_draw_color(color(2), 1.5, 0.0, 0.0);
        assert_eq!(tracker.frames_in_flight(), 1, "save ignored");
        assert_eq!(
            tracker.match_record(&FrameTimeRecordSet::new()),
            MatchOutcome::Nothing,
            "match ignored"
        );
        tracker.reset();
        assert!(tracker.is_enabled(), "reset re-enables");
        assert_eq!(tracker.state(), TrackerState::WaitZeroes, "reset state");
    }

    #[test]
    fn vsync_to_scanout_needs_four_plausible_samples() {
        let mut tracker = armed_with_frames(FRAMES_TRACKED);
        let mut set = FrameTimeRecordSet::new();
        for tag in 1..=3 {
            set.add_value(tag, 1.0 + 0.01 * f64::from(tag - 1) + 0.012);
        }
        let _ = tracker.match_record(&set);
        assert_eq!(tracker.frame_deltas().count(), 3, "three samples");
        assert_eq!(tracker.vsync_to_scanout(), None, "not enough samples");

        let mut set = FrameTimeRecordSet::new();
        for tag in 3..=6 {
            set.add_value(tag, 1.0 + 0.01 * f64::from(tag - 1) + 0.012);
        }
        let _ = tracker.match_record(&set);
        let measured = tracker.vsync_to_scanout().unwrap();
        assert!((measured - 0.012).abs() < 1e-9, "median delta: {measured}");
    }

    #[test]
    fn implausible_vsync_to_scanout_is_rejected() {
        let mut tracker = armed_with_frames(FRAMES_TRACKED);
        let mut set = FrameTimeRecordSet::new();
        for tag in 1..=4 {
            set.add_value(tag, 1.5 + 0.01 * f64::from(tag));
        }
        let _ = tracker.match_record(&set);
        assert_eq!(tracker.frame_deltas().count(), 4, "four samples");
        assert_eq!(tracker.vsync_to_scanout(), None, "half a second is not plausible");
    }
}
