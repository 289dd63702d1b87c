use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Device transfer alignment. Both regions of the final buffer start and
/// end on this boundary.
pub const ALIGNMENT: usize = 8;

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Byte-range pool with best-fit reuse inside a single growable address space.
///
/// The pool tracks free and allocated ranges; together they exactly tile
/// `[0, high_water_mark)` with no gaps and no overlaps. Allocation prefers
/// the smallest sufficient free block (lowest offset on ties) and splits it,
/// extending the address space only when nothing fits. Freed blocks are
/// eagerly merged with adjacent free neighbors to bound fragmentation.
///
/// All bookkeeping uses offset-ordered maps, so offsets are a deterministic
/// function of the call sequence alone.
#[derive(Debug, Default)]
pub struct BlockPool {
    /// Free ranges keyed by offset (offset -> size)
    free: BTreeMap<usize, usize>,
    /// Live allocations keyed by offset (offset -> size)
    allocated: BTreeMap<usize, usize>,
    /// Peak simultaneous allocation; never decreases
    high_water: usize,
}

impl BlockPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` bytes and return the offset of the range.
    ///
    /// Reuses the best-fitting free block when one exists; otherwise appends
    /// a block of exactly `size` at the current high-water mark.
    pub fn allocate(&mut self, size: usize) -> Result<usize> {
        if size == 0 {
            return Err(Error::ZeroSizeReservation);
        }

        // Best fit: smallest sufficient block; iteration is in offset order,
        // so ties resolve to the lowest offset.
        let mut best: Option<(usize, usize)> = None;
        for (&offset, &block_size) in &self.free {
            if block_size < size {
                continue;
            }
            if best.map_or(true, |(_, best_size)| block_size < best_size) {
                best = Some((offset, block_size));
            }
        }

        let offset = match best {
            Some((offset, block_size)) => {
                self.free.remove(&offset);
                if block_size > size {
                    // Keep the front of the block; the remainder stays free.
                    self.free.insert(offset + size, block_size - size);
                }
                offset
            }
            None => {
                let offset = self.high_water;
                self.high_water += size;
                offset
            }
        };

        self.allocated.insert(offset, size);
        log::trace!("pool: allocated {} bytes at offset {}", size, offset);
        Ok(offset)
    }

    /// Return the block at `offset` to the free set, merging with adjacent
    /// free blocks. Freeing an offset that is not a live allocation (or
    /// freeing it twice) is a caller bug and reported as `UnknownOffset`.
    pub fn free(&mut self, offset: usize) -> Result<()> {
        let size = self
            .allocated
            .remove(&offset)
            .ok_or(Error::UnknownOffset(offset))?;

        let mut merged_offset = offset;
        let mut merged_size = size;

        // Free predecessor ending exactly at `offset`.
        if let Some((&prev_offset, &prev_size)) = self.free.range(..offset).next_back() {
            if prev_offset + prev_size == offset {
                self.free.remove(&prev_offset);
                merged_offset = prev_offset;
                merged_size += prev_size;
            }
        }

        // Free successor starting exactly where the freed block ends.
        if let Some(&next_size) = self.free.get(&(offset + size)) {
            self.free.remove(&(offset + size));
            merged_size += next_size;
        }

        self.free.insert(merged_offset, merged_size);
        log::trace!(
            "pool: freed {} bytes at offset {} (merged range: {} bytes at {})",
            size,
            offset,
            merged_size,
            merged_offset
        );
        Ok(())
    }

    /// Minimal capacity ever needed: the peak simultaneous allocation across
    /// the whole planning session. Not reduced when blocks are freed.
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Total bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.values().sum()
    }

    /// Size of the live allocation at `offset`, if any.
    pub fn allocation_size(&self, offset: usize) -> Option<usize> {
        self.allocated.get(&offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Free and allocated ranges must exactly tile [0, high_water_mark).
    fn assert_tiling(pool: &BlockPool) {
        let mut ranges: Vec<(usize, usize)> = pool
            .free
            .iter()
            .chain(pool.allocated.iter())
            .map(|(&offset, &size)| (offset, size))
            .collect();
        ranges.sort_unstable();

        let mut cursor = 0;
        for (offset, size) in ranges {
            assert_eq!(offset, cursor, "gap or overlap at offset {}", offset);
            cursor = offset + size;
        }
        assert_eq!(cursor, pool.high_water_mark());
    }

    #[test]
    fn test_zero_size_allocation_rejected() {
        let mut pool = BlockPool::new();
        assert!(matches!(pool.allocate(0), Err(Error::ZeroSizeReservation)));
    }

    #[test]
    fn test_sequential_allocations_extend() {
        let mut pool = BlockPool::new();
        assert_eq!(pool.allocate(100).unwrap(), 0);
        assert_eq!(pool.allocate(50).unwrap(), 100);
        assert_eq!(pool.high_water_mark(), 150);
        assert_tiling(&pool);
    }

    #[test]
    fn test_freed_block_is_reused() {
        let mut pool = BlockPool::new();
        let a = pool.allocate(100).unwrap();
        let b = pool.allocate(50).unwrap();
        pool.free(a).unwrap();

        // A request that fits in the freed block must reuse it, not extend.
        assert_eq!(pool.allocate(80).unwrap(), 0);
        assert_eq!(pool.high_water_mark(), 150);

        pool.free(b).unwrap();
        pool.free(0).unwrap();
        assert_eq!(pool.high_water_mark(), 150);
        assert_tiling(&pool);
    }

    #[test]
    fn test_split_leaves_remainder_free() {
        let mut pool = BlockPool::new();
        let a = pool.allocate(100).unwrap();
        let b = pool.allocate(10).unwrap();
        pool.free(a).unwrap();

        // 80 of the 100 freed bytes are reused; the remaining 20 stay free
        // and satisfy the next small request.
        assert_eq!(pool.allocate(80).unwrap(), 0);
        assert_eq!(pool.allocate(20).unwrap(), 80);
        assert_eq!(pool.high_water_mark(), 110);

        let _ = b;
        assert_tiling(&pool);
    }

    #[test]
    fn test_best_fit_prefers_smallest_block() {
        let mut pool = BlockPool::new();
        let big = pool.allocate(200).unwrap();
        let sep = pool.allocate(8).unwrap();
        let small = pool.allocate(64).unwrap();
        pool.free(big).unwrap();
        pool.free(small).unwrap();

        // Both free blocks fit, but the 64-byte block is the tighter fit.
        assert_eq!(pool.allocate(60).unwrap(), small);
        let _ = sep;
        assert_tiling(&pool);
    }

    #[test]
    fn test_coalescing_merges_neighbors() {
        let mut pool = BlockPool::new();
        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();

        pool.free(a).unwrap();
        pool.free(c).unwrap();
        // Freeing the middle block merges all three into one 96-byte range.
        pool.free(b).unwrap();

        assert_eq!(pool.allocate(96).unwrap(), 0);
        assert_eq!(pool.high_water_mark(), 96);
        assert_tiling(&pool);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = BlockPool::new();
        let a = pool.allocate(16).unwrap();
        pool.free(a).unwrap();
        assert!(matches!(pool.free(a), Err(Error::UnknownOffset(0))));
        assert!(matches!(pool.free(999), Err(Error::UnknownOffset(999))));
    }

    #[test]
    fn test_live_ranges_never_alias() {
        let mut pool = BlockPool::new();
        let mut live: Vec<(usize, usize)> = Vec::new();

        let sizes = [100, 50, 30, 80, 10, 200, 40];
        for (step, &size) in sizes.iter().enumerate() {
            let offset = pool.allocate(size).unwrap();
            for &(other_offset, other_size) in &live {
                let disjoint =
                    offset + size <= other_offset || other_offset + other_size <= offset;
                assert!(disjoint, "overlap between live ranges");
            }
            live.push((offset, size));

            // Release every other allocation to force reuse.
            if step % 2 == 1 {
                let (offset, _) = live.remove(0);
                pool.free(offset).unwrap();
            }
            assert_tiling(&pool);
        }
    }

    #[test]
    fn test_allocated_bytes_tracking() {
        let mut pool = BlockPool::new();
        let a = pool.allocate(100).unwrap();
        let b = pool.allocate(28).unwrap();
        assert_eq!(pool.allocated_bytes(), 128);
        assert_eq!(pool.allocation_size(a), Some(100));

        pool.free(a).unwrap();
        assert_eq!(pool.allocated_bytes(), 28);
        assert_eq!(pool.allocation_size(a), None);
        assert_eq!(pool.allocation_size(b), Some(28));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(17, 8), 24);
    }
}
