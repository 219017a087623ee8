// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scanout readback records from the latency-sensing hardware.
//!
//! The renderer draws a small patch in a gray level chosen from eight evenly
//! spaced bands. A photo sensor on the display reports the gray level it saw
//! and when the scanout happened. Each band is identified by a small integer
//! *readback index* (tag); tag 0 is the neutral "no frame in flight" band.
//!
//! ```text
//!   color:   0 ........ 16 ........ 32 ........ 48 ... 240 ........ 255
//!   tag:     |--- 0 ----|           |--- 1 ----|       |--- 7 ----|
//!                 ^ representative color = tag * 32 + 16
//! ```
//!
//! [`FrameTimeRecordSet`] is the sensor side's short history of the last four
//! readbacks, published lock-free to the frame timing manager.

use core::ops::Index;

use crate::lockless::Snapshot;

/// Distance between the representative colors of two adjacent tags.
pub const COLOR_INCREMENT: i32 = 32;

/// A readback matches a tag when it lies strictly within this distance of the
/// tag's representative color.
pub const PIXEL_TEST_THRESHOLD: i32 = COLOR_INCREMENT / 3;

/// Number of distinct tags, including the neutral tag 0.
pub const INCREMENT_COUNT: i32 = 256 / COLOR_INCREMENT;

/// One scanout observation: which tag was seen, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTimeRecord {
    /// Tag decoded from the observed color; 0 is neutral.
    pub readback_index: i32,
    /// Absolute scanout time in seconds.
    pub time_seconds: f64,
}

impl FrameTimeRecord {
    /// Maps an observed color to its tag.
    ///
    /// Returns `None` when the color falls between bands, which happens while
    /// the panel is transitioning.
    #[must_use]
    pub const fn color_to_readback_index(color: u8) -> Option<i32> {
        let color = color as i32;
        let compare = color - COLOR_INCREMENT / 2;
        // Index from the raw color, not `compare`, so rounding lands in the
        // band whose representative color is nearest.
        let index = color / COLOR_INCREMENT;
        let delta = compare - index * COLOR_INCREMENT;
        if delta < PIXEL_TEST_THRESHOLD && delta > -PIXEL_TEST_THRESHOLD {
            Some(index)
        } else {
            None
        }
    }

    /// Returns the representative color for a tag.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "tags are below INCREMENT_COUNT, so the color fits in a byte"
    )]
    pub const fn readback_index_to_color(readback_index: i32) -> u8 {
        debug_assert!(
            readback_index >= 0 && readback_index < INCREMENT_COUNT,
            "readback index out of range"
        );
        (readback_index * COLOR_INCREMENT + COLOR_INCREMENT / 2) as u8
    }
}

/// Circular buffer of the last [`RECORD_COUNT`](Self::RECORD_COUNT) scanout
/// records.
///
/// Indexing is relative to the write cursor: `set[0]` is the oldest record and
/// `set[RECORD_COUNT - 1]` the newest.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTimeRecordSet {
    records: [FrameTimeRecord; Self::RECORD_COUNT],
    next_write_index: usize,
}

impl FrameTimeRecordSet {
    /// Number of records held.
    pub const RECORD_COUNT: usize = 4;
    const RECORD_MASK: usize = Self::RECORD_COUNT - 1;

    /// Creates a set holding only neutral records.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [FrameTimeRecord {
                readback_index: 0,
                time_seconds: 0.0,
            }; Self::RECORD_COUNT],
            next_write_index: 0,
        }
    }

    /// Overwrites the oldest record.
    pub fn add_value(&mut self, readback_index: i32, time_seconds: f64) {
        self.records[self.next_write_index] = FrameTimeRecord {
            readback_index,
            time_seconds,
        };
        self.next_write_index = (self.next_write_index + 1) & Self::RECORD_MASK;
    }

    /// Returns the `i`-th record counting from the oldest.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: usize) -> &FrameTimeRecord {
        &self.records[(self.next_write_index + i) & Self::RECORD_MASK]
    }

    /// Returns the most recently written record.
    #[inline]
    #[must_use]
    pub const fn most_recent(&self) -> &FrameTimeRecord {
        &self.records[(self.next_write_index + Self::RECORD_MASK) & Self::RECORD_MASK]
    }

    /// Scans forward from relative position `start` for a record carrying
    /// `readback_index`, returning its relative position.
    #[must_use]
    pub fn find_readback_index(&self, start: usize, readback_index: i32) -> Option<usize> {
        (start..Self::RECORD_COUNT).find(|&i| self.get(i).readback_index == readback_index)
    }

    /// Returns `true` when every record carries the neutral tag.
    #[must_use]
    pub fn is_all_zeroes(&self) -> bool {
        self.records.iter().all(|r| r.readback_index == 0)
    }

    /// Position of the next write in the underlying storage.
    #[inline]
    #[must_use]
    pub const fn next_write_index(&self) -> usize {
        self.next_write_index
    }
}

impl Index<usize> for FrameTimeRecordSet {
    type Output = FrameTimeRecord;

    #[inline]
    fn index(&self, i: usize) -> &FrameTimeRecord {
        self.get(i)
    }
}

impl Snapshot for FrameTimeRecordSet {
    // Four (tag, time) pairs plus the cursor.
    const WORDS: usize = Self::RECORD_COUNT * 2 + 1;

    fn encode(&self, words: &mut [u64]) {
        for (pair, record) in words.chunks_exact_mut(2).zip(&self.records) {
            pair[0] = u64::from(record.readback_index.cast_unsigned());
            pair[1] = record.time_seconds.to_bits();
        }
        words[Self::RECORD_COUNT * 2] = self.next_write_index as u64;
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "words were produced by encode, which widened 32-bit tags and a small cursor"
    )]
    fn decode(words: &[u64]) -> Self {
        let mut set = Self::new();
        for (pair, record) in words.chunks_exact(2).zip(&mut set.records) {
            record.readback_index = (pair[0] as u32).cast_signed();
            record.time_seconds = f64::from_bits(pair[1]);
        }
        set.next_write_index = words[Self::RECORD_COUNT * 2] as usize & Self::RECORD_MASK;
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_band_layout() {
        assert_eq!(PIXEL_TEST_THRESHOLD, 10, "32 / 3 truncates to 10");
        assert_eq!(INCREMENT_COUNT, 8, "eight bands");
    }

    #[test]
    fn representative_colors_map_back_to_their_tag() {
        for tag in 0..INCREMENT_COUNT {
            let color = FrameTimeRecord::readback_index_to_color(tag);
            assert_eq!(
                FrameTimeRecord::color_to_readback_index(color),
                Some(tag),
                "tag {tag} via color {color}"
            );
        }
    }

    #[test]
    fn tolerance_band_is_exclusive() {
        // Tag 1 is centered on 48.
        assert_eq!(FrameTimeRecord::color_to_readback_index(57), Some(1), "+9 accepted");
        assert_eq!(FrameTimeRecord::color_to_readback_index(39), Some(1), "-9 accepted");
        assert_eq!(FrameTimeRecord::color_to_readback_index(58), None, "+10 rejected");
        assert_eq!(FrameTimeRecord::color_to_readback_index(38), None, "-10 rejected");
        assert_eq!(FrameTimeRecord::color_to_readback_index(0), None, "black is between bands");
    }

    #[test]
    fn new_set_is_all_zeroes() {
        assert!(FrameTimeRecordSet::new().is_all_zeroes(), "fresh set is neutral");
    }

    #[test]
    fn any_non_zero_tag_clears_all_zeroes() {
        let mut set = FrameTimeRecordSet::new();
        set.add_value(0, 1.0);
        set.add_value(0, 2.0);
        set.add_value(3, 3.0);
        set.add_value(0, 4.0);
        assert!(!set.is_all_zeroes(), "one live tag is enough");

        for t in 5..9 {
            set.add_value(0, f64::from(t));
        }
        assert!(set.is_all_zeroes(), "overwritten with neutral tags again");
    }

    #[test]
    fn indexing_is_oldest_to_newest() {
        let mut set = FrameTimeRecordSet::new();
        for (tag, t) in [(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0), (6, 6.0)] {
            set.add_value(tag, t);
        }
        let tags: [i32; 4] = core::array::from_fn(|i| set[i].readback_index);
        assert_eq!(tags, [3, 4, 5, 6], "relative to the write cursor");
        assert_eq!(set.most_recent().readback_index, 6, "newest record");
        assert_eq!(set.next_write_index(), 2, "cursor wrapped");
    }

    #[test]
    fn find_readback_index_scans_forward() {
        let mut set = FrameTimeRecordSet::new();
        for tag in [2, 5, 2, 7] {
            set.add_value(tag, 0.0);
        }
        assert_eq!(set.find_readback_index(0, 2), Some(0), "first hit");
        assert_eq!(set.find_readback_index(1, 2), Some(2), "skips earlier slots");
        assert_eq!(set.find_readback_index(0, 4), None, "absent tag");
        assert_eq!(set.find_readback_index(4, 7), None, "start past the end");
    }

    #[test]
    fn snapshot_words_preserve_every_field() {
        let mut set = FrameTimeRecordSet::new();
        for (tag, t) in [(1, 0.5), (2, 0.75), (7, 1.125)] {
            set.add_value(tag, t);
        }
        let mut words = [0_u64; FrameTimeRecordSet::WORDS];
        set.encode(&mut words);
        assert_eq!(FrameTimeRecordSet::decode(&words), set, "identical after decode");
    }
}
