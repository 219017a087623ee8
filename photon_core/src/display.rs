// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Static display geometry and scan-out timing helpers.
//!
//! A head-mounted display panel lights its pixels in a fixed physical order.
//! Rolling shutters scan rows (or columns) over the whole frame interval, so
//! each eye's image becomes visible at a different fraction of the frame. A
//! global shutter flashes the whole panel at once. The mapping here must match
//! the physical scan order exactly; getting it wrong makes time-warp correct
//! in the wrong direction.

/// Left or right eye.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    /// Left eye.
    Left,
    /// Right eye.
    Right,
}

impl Eye {
    /// Both eyes in index order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// Array index for per-eye storage.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// Physical pattern in which the panel illuminates pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShutterType {
    /// Rows scan from top to bottom; both eyes are visible mid-frame.
    #[default]
    RollingTopToBottom,
    /// Columns scan from left to right across both eyes.
    RollingLeftToRight,
    /// Columns scan from right to left across both eyes.
    RollingRightToLeft,
    /// The whole panel lights at once.
    Global,
}

/// Panel timing constants, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShutterInfo {
    /// Scan pattern.
    pub shutter_type: ShutterType,
    /// Nominal vsync interval (1 / refresh rate).
    pub vsync_to_next_vsync: f64,
    /// Time from vsync to the first scanline being lit.
    pub vsync_to_first_scanline: f64,
    /// Time from the first to the last scanline.
    pub first_scanline_to_last_scanline: f64,
    /// Time for a pixel to settle to its new value.
    pub pixel_settle_time: f64,
    /// Time a pixel stays lit (low-persistence panels keep this short).
    pub pixel_persistence: f64,
}

impl ShutterInfo {
    /// 75 Hz low-persistence OLED with a right-to-left rolling shutter.
    #[must_use]
    pub const fn dk2() -> Self {
        Self {
            shutter_type: ShutterType::RollingRightToLeft,
            vsync_to_next_vsync: 1.0 / 75.0,
            vsync_to_first_scanline: 0.000_052,
            first_scanline_to_last_scanline: 0.013_2,
            pixel_settle_time: 0.0,
            pixel_persistence: 0.002,
        }
    }

    /// 90 Hz global-shutter panel.
    #[must_use]
    pub const fn global_90hz() -> Self {
        Self {
            shutter_type: ShutterType::Global,
            vsync_to_next_vsync: 1.0 / 90.0,
            vsync_to_first_scanline: 0.0,
            first_scanline_to_last_scanline: 0.0,
            pixel_settle_time: 0.0,
            pixel_persistence: 0.002,
        }
    }

    /// Delay between a scanline being driven and it being perceived: the
    /// average of settle and persistence time.
    #[inline]
    #[must_use]
    pub fn screen_switching_delay(&self) -> f64 {
        self.pixel_settle_time * 0.5 + self.pixel_persistence * 0.5
    }
}

impl Default for ShutterInfo {
    fn default() -> Self {
        Self::dk2()
    }
}

/// Static per-display description consumed by the timing pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayInfo {
    /// Panel timing.
    pub shutter: ShutterInfo,
}

impl DisplayInfo {
    /// Creates display info from shutter timing.
    #[must_use]
    pub const fn new(shutter: ShutterInfo) -> Self {
        Self { shutter }
    }
}

/// Times at which each eye's image is effectively visible, given the scanout
/// start and duration.
#[must_use]
pub fn eye_render_times(
    scanout_start: f64,
    scanout_duration: f64,
    shutter: ShutterType,
) -> [f64; 2] {
    match shutter {
        ShutterType::RollingTopToBottom | ShutterType::Global => {
            let mid = scanout_start + scanout_duration * 0.5;
            [mid, mid]
        }
        ShutterType::RollingLeftToRight => [
            scanout_start + scanout_duration * 0.25,
            scanout_start + scanout_duration * 0.75,
        ],
        ShutterType::RollingRightToLeft => [
            scanout_start + scanout_duration * 0.75,
            scanout_start + scanout_duration * 0.25,
        ],
    }
}

/// Per-eye `[start, end]` times spanned by the time-warp mesh.
///
/// The distortion mesh varies from one screen edge to the other across both
/// eyes, so every rolling shutter uses the full scanout window for each eye.
/// A global shutter collapses the window to its midpoint.
#[must_use]
pub fn eye_timewarp_times(
    scanout_start: f64,
    scanout_duration: f64,
    shutter: ShutterType,
) -> [[f64; 2]; 2] {
    match shutter {
        ShutterType::RollingTopToBottom
        | ShutterType::RollingLeftToRight
        | ShutterType::RollingRightToLeft => {
            let window = [scanout_start, scanout_start + scanout_duration];
            [window, window]
        }
        ShutterType::Global => {
            let mid = scanout_start + scanout_duration * 0.5;
            [[mid, mid], [mid, mid]]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64], what: &str) {
        assert_eq!(actual.len(), expected.len(), "{what}: length");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{what}: expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn screen_switching_delay_averages_settle_and_persistence() {
        let shutter = ShutterInfo {
            pixel_settle_time: 0.004,
            pixel_persistence: 0.002,
            ..ShutterInfo::dk2()
        };
        assert_close(&[shutter.screen_switching_delay()], &[0.003], "half of each");
    }

    #[test]
    fn rolling_eye_render_times_follow_scan_order() {
        assert_close(
            &eye_render_times(1.0, 0.01, ShutterType::RollingLeftToRight),
            &[1.0025, 1.0075],
            "left eye scans first",
        );
        assert_close(
            &eye_render_times(1.0, 0.01, ShutterType::RollingRightToLeft),
            &[1.0075, 1.0025],
            "right eye scans first",
        );
        assert_close(
            &eye_render_times(1.0, 0.01, ShutterType::RollingTopToBottom),
            &[1.005, 1.005],
            "both eyes mid-frame",
        );
    }

    #[test]
    fn global_shutter_collapses_timewarp_window() {
        let [left, right] = eye_timewarp_times(2.0, 0.02, ShutterType::Global);
        assert_close(&left, &[2.01, 2.01], "left midpoint only");
        assert_close(&right, &[2.01, 2.01], "right midpoint only");

        let [left, right] = eye_timewarp_times(2.0, 0.02, ShutterType::RollingRightToLeft);
        assert_close(&left, &[2.0, 2.02], "left full window");
        assert_close(&right, &[2.0, 2.02], "right full window");
    }

    #[test]
    fn eye_indices() {
        assert_eq!(Eye::BOTH.map(Eye::index), [0, 1], "left then right");
    }
}
