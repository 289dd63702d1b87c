use serde::{Deserialize, Serialize};

use crate::argspace::StagedEntry;
use crate::error::{Error, Result};
use crate::manager::{AllocationRecord, MemoryManager};

/// Summary of a finalized device-buffer layout, for diagnostics and build
/// tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    /// Total device buffer size in bytes
    pub total_size: usize,
    /// Size of the argspace region
    pub argspace_size: usize,
    /// Size of the workspace region
    pub workspace_size: usize,
    /// Base offset of the workspace region within the device buffer
    pub workspace_base_offset: usize,
    /// Staged constants in reservation order
    pub argspace_entries: Vec<StagedEntry>,
    /// Every reservation in acquisition order, with absolute offsets
    pub allocations: Vec<AllocationRecord>,
}

impl PlanReport {
    /// Build a report from a finalized manager.
    pub fn from_manager(manager: &MemoryManager) -> Result<Self> {
        Ok(Self {
            total_size: manager.get_allocation_size()?,
            argspace_size: manager.argspace_size()?,
            workspace_size: manager.workspace_size()?,
            workspace_base_offset: manager.workspace_base_offset()?,
            argspace_entries: manager.transfer_plan()?.entries,
            allocations: manager.allocation_records()?,
        })
    }
}

/// Serialize a plan report as pretty-printed JSON.
pub fn export_plan_json(report: &PlanReport) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(report)
        .map_err(|e| Error::Internal(format!("failed to serialize plan report: {}", e)))
}
