// Chunk planning - partitions a byte range into per-pass, per-chunk
// sub-ranges and owns the adaptive chunk-size policy.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Chunk size bounds, in MiB. Sizes outside this band either lose too much
/// localization (large) or drown the run in syscalls (small).
pub const MIN_CHUNK_MB: u32 = 1;
pub const MAX_CHUNK_MB: u32 = 256;

pub const MIN_CHUNK_BYTES: u64 = (MIN_CHUNK_MB as u64) * 1024 * 1024;
pub const MAX_CHUNK_BYTES: u64 = (MAX_CHUNK_MB as u64) * 1024 * 1024;

/// A contiguous sub-range of the tested region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub offset_bytes: u64,
    pub len_bytes: u64,
}

impl ChunkRange {
    pub fn end(&self) -> u64 {
        self.offset_bytes + self.len_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.len_bytes == 0
    }
}

/// Slice `[0, total_bytes)` across test passes.
///
/// Every pass gets an even share; the final pass absorbs the rounding
/// remainder so the union of all passes covers the range exactly.
pub fn plan_pass(total_bytes: u64, pass_index: u32, pass_count: u32) -> ChunkRange {
    assert!(pass_count >= 1, "pass_count must be at least 1");
    assert!(pass_index < pass_count, "pass_index out of range");

    let share = total_bytes / pass_count as u64;
    let offset_bytes = share * pass_index as u64;
    let len_bytes = if pass_index + 1 == pass_count {
        total_bytes - offset_bytes
    } else {
        share
    };

    ChunkRange {
        offset_bytes,
        len_bytes,
    }
}

/// Lazy chunk iterator over a range. Finite, not restartable; the final
/// chunk may be short.
pub fn chunks(range: ChunkRange, chunk_size_bytes: u64) -> Chunks {
    Chunks {
        next_offset: range.offset_bytes,
        end: range.end(),
        chunk_size_bytes: chunk_size_bytes.max(1),
    }
}

pub struct Chunks {
    next_offset: u64,
    end: u64,
    chunk_size_bytes: u64,
}

impl Iterator for Chunks {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        let chunk = next_chunk(self.next_offset, self.end, self.chunk_size_bytes)?;
        self.next_offset = chunk.end();
        Some(chunk)
    }
}

/// One chunk at `cursor`, or `None` past the end. The adaptive worker loop
/// uses this directly so the chunk size can change between chunks.
pub fn next_chunk(cursor: u64, end: u64, chunk_size_bytes: u64) -> Option<ChunkRange> {
    if cursor >= end {
        return None;
    }
    Some(ChunkRange {
        offset_bytes: cursor,
        len_bytes: (end - cursor).min(chunk_size_bytes.max(1)),
    })
}

/// How many recent throughput samples must agree before a grow step.
const STABILITY_WINDOW: usize = 8;

/// Samples within ±15% of the window mean count as stable.
const STABILITY_TOLERANCE: f64 = 0.15;

/// Adaptive chunk sizing: grow after sustained stable throughput, shrink
/// immediately after a bad sector for better localization.
///
/// The current size is only sampled between chunks; a size change never
/// splits or extends an in-flight write.
#[derive(Debug)]
pub struct AdaptiveChunkSizer {
    current_bytes: u64,
    recent_mbps: VecDeque<f64>,
}

impl AdaptiveChunkSizer {
    pub fn new(initial_bytes: u64) -> Self {
        Self {
            current_bytes: initial_bytes.clamp(MIN_CHUNK_BYTES, MAX_CHUNK_BYTES),
            recent_mbps: VecDeque::with_capacity(STABILITY_WINDOW),
        }
    }

    /// Size to use for the next chunk.
    pub fn chunk_size(&self) -> u64 {
        self.current_bytes
    }

    /// Feed one per-chunk throughput observation.
    pub fn record_throughput(&mut self, mbps: f64) {
        if self.recent_mbps.len() == STABILITY_WINDOW {
            self.recent_mbps.pop_front();
        }
        self.recent_mbps.push_back(mbps);
    }

    /// Called between passes; grows the chunk when the recent window shows
    /// sustained stable throughput.
    pub fn on_pass_boundary(&mut self) {
        if self.is_stable() {
            self.current_bytes = (self.current_bytes * 2).min(MAX_CHUNK_BYTES);
        }
        self.recent_mbps.clear();
    }

    /// Called as soon as a bad sector is recorded; halves the chunk so the
    /// next failures land in smaller, better-localized ranges.
    pub fn on_bad_sector(&mut self) {
        self.current_bytes = (self.current_bytes / 2).max(MIN_CHUNK_BYTES);
        self.recent_mbps.clear();
    }

    fn is_stable(&self) -> bool {
        if self.recent_mbps.len() < STABILITY_WINDOW {
            return false;
        }
        let mean: f64 = self.recent_mbps.iter().sum::<f64>() / self.recent_mbps.len() as f64;
        if mean <= 0.0 {
            return false;
        }
        self.recent_mbps
            .iter()
            .all(|&s| (s - mean).abs() <= mean * STABILITY_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn single_pass_covers_whole_range() {
        let range = plan_pass(100 * MIB, 0, 1);
        assert_eq!(range.offset_bytes, 0);
        assert_eq!(range.len_bytes, 100 * MIB);
    }

    #[test]
    fn last_pass_absorbs_remainder() {
        let total = 100 * MIB + 7;
        let first = plan_pass(total, 0, 3);
        let second = plan_pass(total, 1, 3);
        let third = plan_pass(total, 2, 3);

        assert_eq!(first.len_bytes, second.len_bytes);
        assert_eq!(second.end(), third.offset_bytes);
        assert_eq!(third.end(), total);
        assert!(third.len_bytes >= first.len_bytes);
    }

    #[test]
    fn hundred_mib_in_32_mib_chunks_is_four_chunks() {
        let range = plan_pass(100 * MIB, 0, 1);
        let sizes: Vec<u64> = chunks(range, 32 * MIB).map(|c| c.len_bytes).collect();
        assert_eq!(sizes, vec![32 * MIB, 32 * MIB, 32 * MIB, 4 * MIB]);
    }

    #[test]
    fn chunks_are_contiguous_and_exact() {
        let range = ChunkRange {
            offset_bytes: 10 * MIB,
            len_bytes: 5 * MIB + 123,
        };
        let mut expected_offset = range.offset_bytes;
        let mut covered = 0;
        for chunk in chunks(range, MIB) {
            assert_eq!(chunk.offset_bytes, expected_offset);
            expected_offset = chunk.end();
            covered += chunk.len_bytes;
        }
        assert_eq!(covered, range.len_bytes);
        assert_eq!(expected_offset, range.end());
    }

    #[test]
    fn empty_range_yields_no_chunks() {
        let range = ChunkRange {
            offset_bytes: 0,
            len_bytes: 0,
        };
        assert_eq!(chunks(range, MIB).count(), 0);
    }

    proptest! {
        /// Pass slices union to exactly [0, total) with no gaps or overlaps
        #[test]
        fn pass_slices_partition_the_range(
            total in 1u64..(1u64 << 40),
            pass_count in 1u32..64,
        ) {
            let mut cursor = 0u64;
            for pass in 0..pass_count {
                let range = plan_pass(total, pass, pass_count);
                prop_assert_eq!(range.offset_bytes, cursor);
                cursor = range.end();
            }
            prop_assert_eq!(cursor, total);
        }

        /// Chunking never loses or duplicates a byte
        #[test]
        fn chunking_preserves_length(
            total in 1u64..(1u64 << 32),
            chunk_mb in 1u64..=256u64,
        ) {
            let range = ChunkRange { offset_bytes: 0, len_bytes: total };
            let covered: u64 = chunks(range, chunk_mb * MIB).map(|c| c.len_bytes).sum();
            prop_assert_eq!(covered, total);
        }
    }

    #[test]
    fn sizer_clamps_initial_size() {
        assert_eq!(AdaptiveChunkSizer::new(0).chunk_size(), MIN_CHUNK_BYTES);
        assert_eq!(
            AdaptiveChunkSizer::new(u64::MAX).chunk_size(),
            MAX_CHUNK_BYTES
        );
    }

    #[test]
    fn sizer_grows_only_after_stable_window_at_pass_boundary() {
        let mut sizer = AdaptiveChunkSizer::new(4 * MIB);

        // Not enough samples yet: no growth
        sizer.record_throughput(100.0);
        sizer.on_pass_boundary();
        assert_eq!(sizer.chunk_size(), 4 * MIB);

        // A full stable window grows the chunk at the next boundary
        for _ in 0..STABILITY_WINDOW {
            sizer.record_throughput(100.0);
        }
        sizer.on_pass_boundary();
        assert_eq!(sizer.chunk_size(), 8 * MIB);

        // Erratic throughput does not grow
        for s in [100.0, 20.0, 180.0, 90.0, 100.0, 15.0, 200.0, 95.0] {
            sizer.record_throughput(s);
        }
        sizer.on_pass_boundary();
        assert_eq!(sizer.chunk_size(), 8 * MIB);
    }

    #[test]
    fn sizer_shrinks_immediately_on_bad_sector() {
        let mut sizer = AdaptiveChunkSizer::new(64 * MIB);
        sizer.on_bad_sector();
        assert_eq!(sizer.chunk_size(), 32 * MIB);

        // Never below the floor
        for _ in 0..32 {
            sizer.on_bad_sector();
        }
        assert_eq!(sizer.chunk_size(), MIN_CHUNK_BYTES);
    }

    #[test]
    fn sizer_never_exceeds_ceiling() {
        let mut sizer = AdaptiveChunkSizer::new(MAX_CHUNK_BYTES);
        for _ in 0..STABILITY_WINDOW {
            sizer.record_throughput(50.0);
        }
        sizer.on_pass_boundary();
        assert_eq!(sizer.chunk_size(), MAX_CHUNK_BYTES);
    }
}
