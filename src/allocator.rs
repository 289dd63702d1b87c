use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::manager::{AllocationKind, ManagerState};

mod sealed {
    pub trait Sealed {}
}

/// Plain scalar data that can be staged byte-for-byte: no padding, every
/// byte of the representation initialized.
///
/// Implemented for the primitive numeric types (and arrays of them) that
/// constant tensors are made of. Types with padding must be staged through
/// [`ScopedAllocator::reserve_argspace`] with an explicit byte layout.
pub trait PlainData: Copy + sealed::Sealed {}

macro_rules! impl_plain_data {
    ($($t:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}
        impl PlainData for $t {}
    )*};
}

impl_plain_data!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<T: PlainData, const N: usize> sealed::Sealed for [T; N] {}
impl<T: PlainData, const N: usize> PlainData for [T; N] {}

/// Transactional allocation handle for one nested emission context.
///
/// Reservations made through this handle are released as a unit, in reverse
/// acquisition order, when the handle is closed. The depth-first structure
/// of kernel emission means an inner context's scratch space is always
/// released before the outer context continues; the planner checks this on
/// every release and rejects violations.
///
/// A clone shares the manager binding but starts with an empty reservation
/// stack, so handles can be passed by value through emission call sites
/// without a clone's close ever double-releasing the original's
/// reservations. Dropping an open handle closes it on a best-effort basis;
/// emitters should prefer an explicit [`close`](ScopedAllocator::close) so
/// release failures surface as errors.
pub struct ScopedAllocator {
    state: Arc<Mutex<ManagerState>>,
    /// Reservations made through this handle, in acquisition order
    active: Vec<(AllocationKind, usize)>,
    closed: bool,
}

impl ScopedAllocator {
    pub(crate) fn new(state: Arc<Mutex<ManagerState>>) -> Self {
        Self {
            state,
            active: Vec::new(),
            closed: false,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ManagerState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory manager state lock poisoned".to_string()))
    }

    /// Stage constant bytes into argspace and return their offset within the
    /// argspace region. The staged copy persists for the whole function;
    /// closing this handle does not reclaim it.
    pub fn reserve_argspace(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::AllocatorClosed);
        }
        let offset = self.lock()?.stage_argspace(data)?;
        self.active.push((AllocationKind::Argspace, offset));
        Ok(offset)
    }

    /// Stage a slice of plain values into argspace.
    pub fn reserve_argspace_typed<T: PlainData>(&mut self, values: &[T]) -> Result<usize> {
        // SAFETY: `T: PlainData` means `values` has no padding and every
        // byte is initialized, so the byte view is valid for the duration
        // of the staging copy.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                values.as_ptr() as *const u8,
                std::mem::size_of_val(values),
            )
        };
        self.reserve_argspace(bytes)
    }

    /// Place a scratch buffer and return its offset within the workspace
    /// region. The buffer may share physical memory with scratch buffers
    /// whose lifetimes do not overlap this one.
    ///
    /// `zero_initialize` asks the kernel emitter to zero-fill the buffer
    /// before first use; it does not affect placement.
    pub fn reserve_workspace(&mut self, size: usize, zero_initialize: bool) -> Result<usize> {
        if self.closed {
            return Err(Error::AllocatorClosed);
        }
        let offset = self.lock()?.reserve_workspace(size, zero_initialize)?;
        self.active.push((AllocationKind::Workspace, offset));
        Ok(offset)
    }

    /// Release every reservation made through this handle, last reserved
    /// first. Workspace reservations are returned to the planner for reuse;
    /// argspace entries are popped for bookkeeping only, since argspace is
    /// never reclaimed mid-session. The handle must not be used afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AllocatorClosed);
        }
        while let Some(&(kind, offset)) = self.active.last() {
            if kind == AllocationKind::Workspace {
                // On failure the entry stays on the stack, so the handle can
                // be closed again once the nesting violation is fixed.
                self.lock()?.release_workspace(offset)?;
            }
            self.active.pop();
        }
        self.closed = true;
        Ok(())
    }

    /// Number of reservations this handle still holds.
    pub fn active_reservations(&self) -> usize {
        self.active.len()
    }
}

impl Clone for ScopedAllocator {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            active: Vec::new(),
            closed: false,
        }
    }
}

impl Drop for ScopedAllocator {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            log::warn!("scoped allocator dropped without a clean close: {}", err);
        }
    }
}
