use std::collections::BTreeMap;

use crate::error::Result;
use crate::pool::BlockPool;

/// Placement planner for transient per-kernel scratch buffers.
///
/// Delegates reuse decisions to a [`BlockPool`]; the pool's high-water mark
/// is the capacity the workspace region must be sized for.
#[derive(Debug, Default)]
pub struct WorkspacePlanner {
    pool: BlockPool,
    /// Zero-fill request for each live reservation (offset -> flag)
    zero_init: BTreeMap<usize, bool>,
}

impl WorkspacePlanner {
    /// Create an empty planner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a scratch buffer of `size` bytes and return its offset within
    /// the workspace region.
    ///
    /// `zero_initialize` is a placement annotation only: the kernel emitter
    /// decides whether to emit a zero-fill for the buffer before first use.
    /// The planner performs no zeroing itself.
    pub fn reserve(&mut self, size: usize, zero_initialize: bool) -> Result<usize> {
        let offset = self.pool.allocate(size)?;
        self.zero_init.insert(offset, zero_initialize);
        log::debug!(
            "workspace: reserved {} bytes at offset {} (zero_initialize: {})",
            size,
            offset,
            zero_initialize
        );
        Ok(offset)
    }

    /// Release the reservation at `offset`, making its range reusable.
    pub fn release(&mut self, offset: usize) -> Result<()> {
        self.pool.free(offset)?;
        self.zero_init.remove(&offset);
        log::debug!("workspace: released offset {}", offset);
        Ok(())
    }

    /// Whether the live reservation at `offset` asked for zero-fill.
    pub fn is_zero_initialized(&self, offset: usize) -> Option<bool> {
        self.zero_init.get(&offset).copied()
    }

    /// Size of the live reservation at `offset`, if any.
    pub fn reservation_size(&self, offset: usize) -> Option<usize> {
        self.pool.allocation_size(offset)
    }

    /// Peak simultaneous scratch usage: the required workspace capacity.
    pub fn high_water_mark(&self) -> usize {
        self.pool.high_water_mark()
    }
}
