// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-writer, multi-reader lock-free snapshots.
//!
//! Timing state is published by one producer thread (or process) and copied
//! out by any number of readers. The state is larger than a machine word, so
//! publication uses a sequence lock over several slots instead of a single
//! atomic store:
//!
//! ```text
//!   word 0            generation G of the newest complete snapshot
//!   slot k (k = 0..3) [sequence | payload words ...]
//!
//!   writer:  G' = G + 1, slot = G' % 3
//!            sequence = 2G' - 1 (odd: write in progress)
//!            payload  = encoded value
//!            sequence = 2G'     (even: complete)
//!            generation = G'
//!
//!   reader:  G = generation, slot = G % 3
//!            accept the copy only if sequence == 2G before and after it
//! ```
//!
//! The writer never waits. A reader retries only when the writer laps it by a
//! full ring of slots during a single copy; it never observes a partially
//! written value. Values are always copied by value in both directions.
//!
//! [`SeqlockRegion`] implements the protocol over any slice of `AtomicU64`, so
//! the same layout works in process memory ([`snapshot_channel`]) and in a
//! memory-mapped file shared between processes.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering, fence};

/// Number of buffer slots in every region.
pub const SLOT_COUNT: usize = 3;

/// Largest payload, in words, that a [`Snapshot`] may encode to.
pub const MAX_SNAPSHOT_WORDS: usize = 32;

/// A plain value that can be published through a [`SeqlockRegion`].
///
/// Implementations encode to and decode from exactly [`WORDS`](Self::WORDS)
/// 64-bit words. `decode` must accept anything `encode` produced.
pub trait Snapshot: Copy + Default {
    /// Number of words in the encoded form (at most [`MAX_SNAPSHOT_WORDS`]).
    const WORDS: usize;

    /// Writes the encoded value into `words` (length [`WORDS`](Self::WORDS)).
    fn encode(&self, words: &mut [u64]);

    /// Reads a value back from `words` (length [`WORDS`](Self::WORDS)).
    fn decode(words: &[u64]) -> Self;
}

/// Seqlock protocol over a borrowed slice of atomic words.
///
/// The slice holds one generation word followed by [`SLOT_COUNT`] slots of
/// `1 + payload_words` words each; see the module docs for the layout.
#[derive(Clone, Copy)]
pub struct SeqlockRegion<'a> {
    cells: &'a [AtomicU64],
    payload_words: usize,
}

impl fmt::Debug for SeqlockRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqlockRegion")
            .field("payload_words", &self.payload_words)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl<'a> SeqlockRegion<'a> {
    /// Number of words a region with the given payload size occupies.
    #[inline]
    #[must_use]
    pub const fn region_words(payload_words: usize) -> usize {
        1 + SLOT_COUNT * (1 + payload_words)
    }

    /// Wraps `cells` as a region for `payload_words`-sized snapshots.
    ///
    /// Returns `None` if `cells` is too short or the payload exceeds
    /// [`MAX_SNAPSHOT_WORDS`].
    #[must_use]
    pub fn new(cells: &'a [AtomicU64], payload_words: usize) -> Option<Self> {
        if payload_words > MAX_SNAPSHOT_WORDS || cells.len() < Self::region_words(payload_words) {
            return None;
        }
        Some(Self {
            cells,
            payload_words,
        })
    }

    /// Generation of the newest complete snapshot, 0 if none was published.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.cells[0].load(Ordering::Acquire)
    }

    fn slot(&self, generation: u64) -> (&'a AtomicU64, &'a [AtomicU64]) {
        let stride = 1 + self.payload_words;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the remainder is below SLOT_COUNT"
        )]
        let index = (generation % SLOT_COUNT as u64) as usize;
        let start = 1 + index * stride;
        (
            &self.cells[start],
            &self.cells[start + 1..start + stride],
        )
    }

    /// Publishes `words` as the newest snapshot.
    ///
    /// Only one writer may publish into a region at a time; the typed
    /// [`LocklessWriter`] handle enforces this for in-process channels.
    pub fn publish(&self, words: &[u64]) {
        debug_assert_eq!(words.len(), self.payload_words, "payload size mismatch");
        let generation = self.cells[0].load(Ordering::Relaxed).wrapping_add(1);
        let (sequence, payload) = self.slot(generation);

        sequence.store(generation.wrapping_mul(2).wrapping_sub(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (cell, &word) in payload.iter().zip(words) {
            cell.store(word, Ordering::Relaxed);
        }
        sequence.store(generation.wrapping_mul(2), Ordering::Release);
        self.cells[0].store(generation, Ordering::Release);
    }

    /// Copies the newest complete snapshot into `out`.
    ///
    /// Returns `false` (leaving `out` untouched) if nothing was published yet.
    pub fn read(&self, out: &mut [u64]) -> bool {
        debug_assert_eq!(out.len(), self.payload_words, "payload size mismatch");
        loop {
            let generation = self.cells[0].load(Ordering::Acquire);
            if generation == 0 {
                return false;
            }
            let (sequence, payload) = self.slot(generation);
            let before = sequence.load(Ordering::Acquire);
            if before != generation.wrapping_mul(2) {
                // The writer already reused this slot for a newer generation.
                core::hint::spin_loop();
                continue;
            }
            for (word, cell) in out.iter_mut().zip(payload) {
                *word = cell.load(Ordering::Relaxed);
            }
            fence(Ordering::Acquire);
            if sequence.load(Ordering::Relaxed) == before {
                return true;
            }
            core::hint::spin_loop();
        }
    }
}

/// Backing storage of an in-process snapshot channel.
struct Shared<T> {
    cells: Box<[AtomicU64]>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Snapshot> Shared<T> {
    fn new() -> Self {
        const {
            assert!(T::WORDS <= MAX_SNAPSHOT_WORDS, "snapshot too large");
        }
        let cells = (0..SeqlockRegion::region_words(T::WORDS))
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            cells,
            _marker: PhantomData,
        }
    }

    fn region(&self) -> SeqlockRegion<'_> {
        SeqlockRegion {
            cells: &self.cells,
            payload_words: T::WORDS,
        }
    }
}

/// Creates a lock-free channel carrying the latest value of `T`.
///
/// There is exactly one writer. Readers are cheap to clone and may live on any
/// thread.
#[must_use]
pub fn snapshot_channel<T: Snapshot>() -> (LocklessWriter<T>, LocklessReader<T>) {
    let shared = Arc::new(Shared::new());
    (
        LocklessWriter {
            shared: Arc::clone(&shared),
        },
        LocklessReader { shared },
    )
}

/// The single publishing end of a [`snapshot_channel`].
pub struct LocklessWriter<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Snapshot> LocklessWriter<T> {
    /// Publishes a copy of `value`.
    pub fn publish(&mut self, value: &T) {
        let mut words = [0_u64; MAX_SNAPSHOT_WORDS];
        let words = &mut words[..T::WORDS];
        value.encode(words);
        self.shared.region().publish(words);
    }

    /// Creates another reader for this channel.
    #[must_use]
    pub fn reader(&self) -> LocklessReader<T> {
        LocklessReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for LocklessWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocklessWriter").finish_non_exhaustive()
    }
}

/// A reading end of a [`snapshot_channel`].
pub struct LocklessReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LocklessReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Snapshot> LocklessReader<T> {
    /// Returns a copy of the latest published value, if any.
    #[must_use]
    pub fn try_load(&self) -> Option<T> {
        let mut words = [0_u64; MAX_SNAPSHOT_WORDS];
        let words = &mut words[..T::WORDS];
        if self.shared.region().read(words) {
            Some(T::decode(words))
        } else {
            None
        }
    }

    /// Returns a copy of the latest published value, or `T::default()` before
    /// the first publication.
    #[must_use]
    pub fn load(&self) -> T {
        self.try_load().unwrap_or_default()
    }

    /// Number of values published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.region().generation()
    }
}

impl<T> fmt::Debug for LocklessReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocklessReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Every word carries the same value, so a torn read is easy to spot.
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Stripe([u64; 12]);

    impl Snapshot for Stripe {
        const WORDS: usize = 12;

        fn encode(&self, words: &mut [u64]) {
            words.copy_from_slice(&self.0);
        }

        fn decode(words: &[u64]) -> Self {
            let mut out = [0; 12];
            out.copy_from_slice(words);
            Self(out)
        }
    }

    #[test]
    fn unpublished_reader_sees_default() {
        let (_writer, reader) = snapshot_channel::<Stripe>();
        assert!(reader.try_load().is_none(), "nothing published yet");
        assert_eq!(reader.load(), Stripe::default(), "default before publish");
        assert_eq!(reader.generation(), 0, "generation starts at zero");
    }

    #[test]
    fn latest_value_wins() {
        let (mut writer, reader) = snapshot_channel::<Stripe>();
        for v in 1..=5 {
            writer.publish(&Stripe([v; 12]));
        }
        assert_eq!(reader.load(), Stripe([5; 12]), "newest snapshot");
        assert_eq!(reader.generation(), 5, "one generation per publish");
        assert_eq!(writer.reader().load(), Stripe([5; 12]), "late readers too");
    }

    #[test]
    fn region_rejects_short_storage() {
        let cells: [AtomicU64; 4] = core::array::from_fn(|_| AtomicU64::new(0));
        assert!(SeqlockRegion::new(&cells, 2).is_none(), "needs 10 words");
        assert!(SeqlockRegion::new(&cells, 1).is_none(), "needs 7 words");
        let cells: [AtomicU64; 7] = core::array::from_fn(|_| AtomicU64::new(0));
        assert!(SeqlockRegion::new(&cells, 1).is_some(), "exact fit");
    }

    #[test]
    fn region_over_borrowed_words() {
        let cells: [AtomicU64; 10] = core::array::from_fn(|_| AtomicU64::new(0));
        let region = SeqlockRegion::new(&cells, 2).unwrap();
        let mut out = [9, 9];
        assert!(!region.read(&mut out), "empty region");
        assert_eq!(out, [9, 9], "output untouched");
        region.publish(&[1, 2]);
        region.publish(&[3, 4]);
        assert!(region.read(&mut out), "published");
        assert_eq!(out, [3, 4], "latest payload");
    }

    #[test]
    fn concurrent_readers_never_observe_torn_values() {
        const PUBLISHES: u64 = 50_000;
        let (mut writer, reader) = snapshot_channel::<Stripe>();

        let readers: std::vec::Vec<_> = (0..3)
            .map(|_| {
                let reader = reader.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    let mut reads = 0_u64;
                    while last < PUBLISHES {
                        let Stripe(words) = reader.load();
                        let first = words[0];
                        assert!(
                            words.iter().all(|&w| w == first),
                            "torn snapshot: {words:?}"
                        );
                        assert!(first >= last, "snapshots went backwards");
                        last = first;
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for v in 1..=PUBLISHES {
            writer.publish(&Stripe([v; 12]));
        }

        for handle in readers {
            let reads = handle.join().unwrap();
            assert!(reads > 0, "reader made progress");
        }
        assert_eq!(reader.load(), Stripe([PUBLISHES; 12]), "final value visible");
    }
}
