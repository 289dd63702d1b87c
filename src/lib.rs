pub mod allocator;
pub mod argspace;
pub mod error;
pub mod manager;
pub mod pool;
pub mod report;
pub mod workspace;

// Re-export commonly used types
pub use allocator::{PlainData, ScopedAllocator};
pub use argspace::{ArgspaceBuffer, StagedEntry};
pub use error::{Error, Result};
pub use manager::{AllocationKind, AllocationRecord, MemoryManager, TransferPlan, ALIGNMENT};
pub use pool::BlockPool;
pub use report::{export_plan_json, PlanReport};
pub use workspace::WorkspacePlanner;
