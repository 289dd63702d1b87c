use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pool::{align_up, ALIGNMENT};

/// One staged constant: where its bytes begin within the argspace region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Offset within the argspace region
    pub offset: usize,
    /// Number of staged bytes, excluding alignment padding
    pub size: usize,
}

/// Host-side staging buffer for compile-time constant data.
///
/// Offsets increase monotonically and are never reused: staged constants
/// live for the whole compiled function, so there is nothing to reclaim.
/// Every entry starts on an [`ALIGNMENT`]-byte boundary; the gap after each
/// entry is zero padding. After planning, the concatenated bytes are copied
/// to the device in a single transfer.
#[derive(Debug, Default)]
pub struct ArgspaceBuffer {
    buffered: Vec<u8>,
    entries: Vec<StagedEntry>,
}

impl ArgspaceBuffer {
    /// Create an empty staging buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `data` to the end of the staging buffer and return the offset at
    /// which it begins.
    ///
    /// The buffer owns an independent copy; the caller's source may be freed
    /// or mutated immediately after this call returns.
    pub fn stage(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::ZeroSizeReservation);
        }

        let offset = self.buffered.len();
        self.buffered.extend_from_slice(data);
        // Pad so the next entry starts on an aligned boundary.
        let padded = align_up(self.buffered.len(), ALIGNMENT);
        self.buffered.resize(padded, 0);

        self.entries.push(StagedEntry {
            offset,
            size: data.len(),
        });
        log::debug!("argspace: staged {} bytes at offset {}", data.len(), offset);
        Ok(offset)
    }

    /// Total size of the argspace region, including alignment padding.
    pub fn total_size(&self) -> usize {
        self.buffered.len()
    }

    /// Staged entries in reservation order.
    pub fn entries(&self) -> &[StagedEntry] {
        &self.entries
    }

    /// The concatenated staged bytes, ready for a one-shot host-to-device
    /// copy.
    pub fn bytes(&self) -> &[u8] {
        &self.buffered
    }
}
