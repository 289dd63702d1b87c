use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::allocator::ScopedAllocator;
use crate::argspace::ArgspaceBuffer;
use crate::error::{Error, Result};
use crate::pool::align_up;
use crate::workspace::WorkspacePlanner;

pub use crate::pool::ALIGNMENT;

/// Which region of the device buffer an allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    /// Compile-time constant data, staged on the host and transferred once
    Argspace,
    /// Transient scratch memory reused across non-overlapping lifetimes
    Workspace,
}

/// One planned allocation.
///
/// Offsets handed out during planning are region-relative (argspace offsets
/// within the argspace region, workspace offsets within the workspace
/// region). The resolved record table returned by
/// [`MemoryManager::allocation_records`] reports absolute positions within
/// the single device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Byte position of the allocation
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// Region the allocation belongs to
    pub kind: AllocationKind,
}

/// Everything the transfer issuer needs for the one-shot host-to-device copy
/// of the staged constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Size of the argspace region in bytes
    pub total_size: usize,
    /// Staged entries in reservation order
    pub entries: Vec<crate::argspace::StagedEntry>,
}

/// Finalized region layout.
#[derive(Debug, Clone, Copy)]
struct FinalLayout {
    argspace_size: usize,
    workspace_base: usize,
    workspace_size: usize,
    total_size: usize,
}

/// Shared planning state. Scoped allocators hold a back-reference to this;
/// the manager owns the authoritative handle.
pub(crate) struct ManagerState {
    argspace: ArgspaceBuffer,
    workspace: WorkspacePlanner,
    /// Live workspace offsets in reservation order across all allocators;
    /// enforces the global LIFO release discipline.
    active_workspace: Vec<usize>,
    /// Every reservation in acquisition order: the offset table.
    records: Vec<AllocationRecord>,
    layout: Option<FinalLayout>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            argspace: ArgspaceBuffer::new(),
            workspace: WorkspacePlanner::new(),
            active_workspace: Vec::new(),
            records: Vec::new(),
            layout: None,
        }
    }

    pub(crate) fn stage_argspace(&mut self, data: &[u8]) -> Result<usize> {
        if self.layout.is_some() {
            return Err(Error::ReserveAfterFinalize { size: data.len() });
        }
        let offset = self.argspace.stage(data)?;
        self.records.push(AllocationRecord {
            offset,
            size: data.len(),
            kind: AllocationKind::Argspace,
        });
        Ok(offset)
    }

    pub(crate) fn reserve_workspace(&mut self, size: usize, zero_initialize: bool) -> Result<usize> {
        if self.layout.is_some() {
            return Err(Error::ReserveAfterFinalize { size });
        }
        let offset = self.workspace.reserve(size, zero_initialize)?;
        self.active_workspace.push(offset);
        self.records.push(AllocationRecord {
            offset,
            size,
            kind: AllocationKind::Workspace,
        });
        Ok(offset)
    }

    /// Release a workspace reservation. Only the most recently reserved
    /// still-active offset may be released; anything else means an outer
    /// allocator is closing while an inner one still holds reservations.
    pub(crate) fn release_workspace(&mut self, offset: usize) -> Result<()> {
        match self.active_workspace.last() {
            Some(&top) if top == offset => {}
            Some(&top) => {
                return Err(Error::OutOfOrderRelease {
                    expected: top,
                    got: offset,
                })
            }
            None => return Err(Error::UnknownOffset(offset)),
        }
        self.workspace.release(offset)?;
        self.active_workspace.pop();
        Ok(())
    }
}

/// Per-compiled-function memory planner.
///
/// Owns one [`ArgspaceBuffer`] and one [`WorkspacePlanner`]; hands out
/// [`ScopedAllocator`]s to nested emission contexts and finalizes the
/// combined device-buffer layout once emission is done. All planning is
/// single-threaded and deterministic: offsets depend only on the order
/// reservations are requested.
pub struct MemoryManager {
    state: Arc<Mutex<ManagerState>>,
}

impl MemoryManager {
    /// Create a manager for one function compilation.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::new())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ManagerState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory manager state lock poisoned".to_string()))
    }

    /// Create a scoped allocator bound to this manager for one nested
    /// emission context.
    pub fn build_allocator(&self) -> ScopedAllocator {
        ScopedAllocator::new(self.state.clone())
    }

    /// Finalize the layout.
    ///
    /// Fixes the argspace region size, places the workspace region at the
    /// next aligned offset after it, and freezes all reservations. Offsets
    /// handed out earlier remain valid and stable; no further reservations
    /// are permitted. Calling this twice, or while workspace reservations
    /// are still active, is a contract violation.
    pub fn allocate(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.layout.is_some() {
            return Err(Error::AlreadyFinalized);
        }
        if !state.active_workspace.is_empty() {
            return Err(Error::UnreleasedReservations(state.active_workspace.len()));
        }

        let argspace_size = state.argspace.total_size();
        let workspace_base = align_up(argspace_size, ALIGNMENT);
        let workspace_size = align_up(state.workspace.high_water_mark(), ALIGNMENT);
        let total_size = workspace_base + workspace_size;

        state.layout = Some(FinalLayout {
            argspace_size,
            workspace_base,
            workspace_size,
            total_size,
        });
        log::debug!(
            "finalized layout: argspace {} bytes, workspace {} bytes at base {}, total {}",
            argspace_size,
            workspace_size,
            workspace_base,
            total_size
        );
        Ok(())
    }

    fn layout(&self) -> Result<FinalLayout> {
        self.lock()?.layout.ok_or(Error::NotFinalized)
    }

    /// Total device buffer size required. Valid only after [`allocate`].
    ///
    /// [`allocate`]: MemoryManager::allocate
    pub fn get_allocation_size(&self) -> Result<usize> {
        Ok(self.layout()?.total_size)
    }

    /// Size of the argspace region. Valid only after finalization.
    pub fn argspace_size(&self) -> Result<usize> {
        Ok(self.layout()?.argspace_size)
    }

    /// Size of the workspace region. Valid only after finalization.
    pub fn workspace_size(&self) -> Result<usize> {
        Ok(self.layout()?.workspace_size)
    }

    /// Base offset of the workspace region within the device buffer. Always
    /// a multiple of [`ALIGNMENT`]. Valid only after finalization.
    pub fn workspace_base_offset(&self) -> Result<usize> {
        Ok(self.layout()?.workspace_base)
    }

    /// Whether the live workspace reservation at `offset` asked for
    /// zero-fill before first use.
    pub fn is_zero_initialized(&self, offset: usize) -> Result<Option<bool>> {
        Ok(self.lock()?.workspace.is_zero_initialized(offset))
    }

    /// The one-shot transfer description for the staged constants. Valid
    /// only after finalization.
    pub fn transfer_plan(&self) -> Result<TransferPlan> {
        let state = self.lock()?;
        let layout = state.layout.ok_or(Error::NotFinalized)?;
        Ok(TransferPlan {
            total_size: layout.argspace_size,
            entries: state.argspace.entries().to_vec(),
        })
    }

    /// Copy of the staged argspace byte stream.
    pub fn staged_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.lock()?.argspace.bytes().to_vec())
    }

    /// The final offset table: every reservation in acquisition order, with
    /// workspace offsets rebased to absolute positions within the device
    /// buffer. Valid only after finalization.
    pub fn allocation_records(&self) -> Result<Vec<AllocationRecord>> {
        let state = self.lock()?;
        let layout = state.layout.ok_or(Error::NotFinalized)?;
        Ok(state
            .records
            .iter()
            .map(|record| match record.kind {
                AllocationKind::Argspace => *record,
                AllocationKind::Workspace => AllocationRecord {
                    offset: layout.workspace_base + record.offset,
                    ..*record
                },
            })
            .collect())
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}
