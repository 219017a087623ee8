// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-process publication of the application timing base record.
//!
//! The compositor creates a small memory-mapped file and publishes
//! [`LocklessAppTimingBase`] into it; application processes open the same file
//! and read it lock-free. The file holds one header word followed by a
//! [`SeqlockRegion`]:
//!
//! ```text
//!   word 0       "PHTN" magic (4 bytes) | schema version (u32)
//!   word 1       generation
//!   words 2..    3 slots of [sequence | 7 payload words (the 56-byte record)]
//! ```
//!
//! Words are stored in host byte order; both ends must run on the same
//! machine.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{MmapOptions, MmapRaw};
use photon_core::app_timing::{AppTimingSource, LocklessAppTimingBase, SCHEMA_VERSION};
use photon_core::compositor::AppTimingPublisher;
use photon_core::lockless::{SeqlockRegion, Snapshot};
use thiserror::Error;

/// File magic.
pub const MAGIC: [u8; 4] = *b"PHTN";

const PAYLOAD_WORDS: usize = <LocklessAppTimingBase as Snapshot>::WORDS;
const REGION_WORDS: usize = 1 + SeqlockRegion::region_words(PAYLOAD_WORDS);

/// Size in bytes of a shared timing file.
pub const REGION_SIZE: usize = REGION_WORDS * 8;

const fn header_word() -> u64 {
    let v = SCHEMA_VERSION.to_le_bytes();
    u64::from_le_bytes([MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], v[0], v[1], v[2], v[3]])
}

/// Errors creating or opening a shared timing region.
#[derive(Debug, Error)]
pub enum SharedTimingError {
    /// The file could not be created, opened or mapped.
    #[error("I/O error on shared timing region: {0}")]
    Io(#[from] io::Error),
    /// The file is smaller than a region.
    #[error("shared timing region is {found} bytes, expected {expected}")]
    Truncated {
        /// Bytes found.
        found: u64,
        /// Bytes required.
        expected: usize,
    },
    /// The file does not start with [`MAGIC`].
    #[error("not a shared timing region (magic {0:?})")]
    BadMagic([u8; 4]),
    /// The file was written with another schema.
    #[error("shared timing schema version {found}, expected {expected}")]
    Version {
        /// Version in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

/// Owned mapping of a region file.
#[derive(Debug)]
struct Mapping {
    map: MmapRaw,
}

impl Mapping {
    fn map(file: &File) -> Result<Self, SharedTimingError> {
        let map = MmapOptions::new().len(REGION_SIZE).map_raw(file)?;
        Ok(Self { map })
    }

    #[expect(
        unsafe_code,
        reason = "the only view of the mapped file; all access goes through atomics"
    )]
    fn words(&self) -> &[AtomicU64] {
        debug_assert!(self.map.len() >= REGION_SIZE, "mapping shorter than a region");
        // SAFETY: the mapping is page aligned, which satisfies AtomicU64's
        // alignment, and at least REGION_SIZE bytes long. AtomicU64 has the
        // same size as u64. The pointer comes from a shared (raw) mapping and
        // is only ever accessed atomically, by this and other processes, for
        // as long as `self.map` keeps it mapped.
        unsafe {
            std::slice::from_raw_parts(self.map.as_mut_ptr().cast::<AtomicU64>(), REGION_WORDS)
        }
    }

    fn region(&self) -> Option<SeqlockRegion<'_>> {
        SeqlockRegion::new(&self.words()[1..], PAYLOAD_WORDS)
    }

    fn check_header(&self) -> Result<(), SharedTimingError> {
        let bytes = self.words()[0].load(Ordering::Acquire).to_le_bytes();
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != MAGIC {
            return Err(SharedTimingError::BadMagic(magic));
        }
        let found = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if found != SCHEMA_VERSION {
            return Err(SharedTimingError::Version {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(())
    }
}

/// The compositor's end: creates the region and publishes base records.
#[derive(Debug)]
pub struct SharedTimingWriter {
    mapping: Mapping,
}

impl SharedTimingWriter {
    /// Creates (or truncates) the region file at `path`.
    ///
    /// Readers that opened an earlier file at the same path keep their old
    /// mapping and see no further updates.
    pub fn create(path: &Path) -> Result<Self, SharedTimingError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;
        let mapping = Mapping::map(&file)?;
        mapping.words()[0].store(header_word(), Ordering::Release);
        log::info!(
            "created shared timing region at {} ({REGION_SIZE} bytes, schema v{SCHEMA_VERSION})",
            path.display()
        );
        Ok(Self { mapping })
    }

    /// Publishes `base` as the newest record.
    pub fn publish(&mut self, base: &LocklessAppTimingBase) {
        let mut words = [0_u64; PAYLOAD_WORDS];
        base.encode(&mut words);
        if let Some(region) = self.mapping.region() {
            region.publish(&words);
        }
    }

    /// Number of records published.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.mapping.region().map_or(0, |r| r.generation())
    }
}

impl AppTimingPublisher for SharedTimingWriter {
    fn publish_base(&mut self, base: &LocklessAppTimingBase) {
        self.publish(base);
    }
}

/// An application's end: reads the newest base record.
#[derive(Debug)]
pub struct SharedTimingReader {
    mapping: Mapping,
}

impl SharedTimingReader {
    /// Opens the region file at `path`, validating its header.
    pub fn open(path: &Path) -> Result<Self, SharedTimingError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let found = file.metadata()?.len();
        if found < REGION_SIZE as u64 {
            return Err(SharedTimingError::Truncated {
                found,
                expected: REGION_SIZE,
            });
        }
        let mapping = Mapping::map(&file)?;
        mapping.check_header()?;
        log::info!("opened shared timing region at {}", path.display());
        Ok(Self { mapping })
    }

    /// Copies the newest record, or `None` before the first publication.
    #[must_use]
    pub fn load(&self) -> Option<LocklessAppTimingBase> {
        let region = self.mapping.region()?;
        let mut words = [0_u64; PAYLOAD_WORDS];
        region
            .read(&mut words)
            .then(|| LocklessAppTimingBase::decode(&words))
    }

    /// Number of records published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.mapping.region().map_or(0, |r| r.generation())
    }
}

impl AppTimingSource for SharedTimingReader {
    fn load_base(&self) -> Option<LocklessAppTimingBase> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photon_core::app_timing::AppRenderTimer;
    use photon_core::time::ManualClock;
    use std::io::Write;

    fn sample_base() -> LocklessAppTimingBase {
        LocklessAppTimingBase {
            is_valid: true,
            last_end_frame_index: 42,
            last_start_frame_time: 100.0,
            last_known_vsync_time: 100.0,
            vsync_fuzz_factor: 0.001,
            frame_interval: 0.0111,
            scanout_delay: 0.0007,
            screen_switching_delay: 0.001,
        }
    }

    #[test]
    fn region_size_matches_layout() {
        assert_eq!(REGION_SIZE, 8 + 8 + 3 * (8 + 56), "header, generation, slots");
    }

    #[test]
    fn create_then_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing.phtn");
        let mut writer = SharedTimingWriter::create(&path).unwrap();
        let reader = SharedTimingReader::open(&path).unwrap();
        assert_eq!(reader.load(), None, "nothing published yet");

        writer.publish(&sample_base());
        assert_eq!(reader.load(), Some(sample_base()), "reader sees the record");
        assert_eq!(reader.generation(), 1, "one publication");

        let mut next = sample_base();
        next.last_end_frame_index = 43;
        writer.publish_base(&next);
        assert_eq!(reader.load_base(), Some(next), "newest record wins");
        assert_eq!(writer.generation(), 2, "writer counts too");
    }

    #[test]
    fn app_timer_reads_from_shared_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing.phtn");
        let mut writer = SharedTimingWriter::create(&path).unwrap();
        writer.publish(&sample_base());

        let timer = AppRenderTimer::with_source(
            SharedTimingReader::open(&path).unwrap(),
            ManualClock::new(100.002),
        );
        let timing = timer.app_timing_for_index(true, 42);
        assert!(
            (timing.scanout_start_time - (100.0 + 0.0111 + 0.0007)).abs() < 1e-9,
            "scanout at the base frame's vsync plus delay, got {}",
            timing.scanout_start_time
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0_u8; REGION_SIZE]).unwrap();
        file.flush().unwrap();
        let err = SharedTimingReader::open(file.path()).unwrap_err();
        assert!(matches!(err, SharedTimingError::BadMagic([0, 0, 0, 0])), "got {err}");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let v = (SCHEMA_VERSION + 1).to_le_bytes();
        let header = u64::from_le_bytes([
            MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], v[0], v[1], v[2], v[3],
        ]);
        let mut bytes = [0_u8; REGION_SIZE];
        // Words are stored in host byte order.
        bytes[..8].copy_from_slice(&header.to_ne_bytes());
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        let err = SharedTimingReader::open(file.path()).unwrap_err();
        assert!(
            matches!(err, SharedTimingError::Version { expected: SCHEMA_VERSION, .. }),
            "got {err}"
        );
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PHTN").unwrap();
        file.flush().unwrap();
        let err = SharedTimingReader::open(file.path()).unwrap_err();
        assert!(
            matches!(err, SharedTimingError::Truncated { found: 4, expected: REGION_SIZE }),
            "got {err}"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SharedTimingReader::open(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SharedTimingError::Io(_)), "got {err}");
    }
}
