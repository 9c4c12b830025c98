//! Device memory manager
//!
//! Tracks raw allocations by handle against a fixed capacity. Allocations are
//! ordinary host memory, which is what lets kernels on the device pool read
//! and write them directly.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Handle to a device allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationHandle(u64);

impl AllocationHandle {
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AllocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Allocation({})", self.0)
    }
}

struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the allocation is plain memory owned by the manager; access is
// coordinated by the owners of the handles.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// Capacity-limited allocator for one device
pub struct MemoryManager {
    allocations: HashMap<AllocationHandle, Allocation>,
    next_handle: u64,
    capacity: usize,
    used: usize,
}

impl MemoryManager {
    /// Create a manager that hands out at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            allocations: HashMap::new(),
            next_handle: 1,
            capacity,
            used: 0,
        }
    }

    // ============================================================================================
    // Allocation
    // ============================================================================================

    /// Allocate `layout.size()` bytes. Zero-sized requests get a dangling,
    /// well-aligned pointer and consume no capacity.
    pub fn allocate(&mut self, layout: Layout) -> Result<(AllocationHandle, NonNull<u8>)> {
        let available = self.available();
        if layout.size() > available {
            return Err(Error::OutOfMemory {
                requested: layout.size(),
                available,
            });
        }

        let ptr = if layout.size() == 0 {
            // Aligned, non-null and never dereferenced for zero bytes.
            NonNull::new(layout.align() as *mut u8).ok_or(Error::OutOfMemory {
                requested: 0,
                available,
            })?
        } else {
            // SAFETY: layout has a non-zero size.
            let raw = unsafe { alloc::alloc(layout) };
            NonNull::new(raw).ok_or(Error::OutOfMemory {
                requested: layout.size(),
                available,
            })?
        };

        let handle = AllocationHandle(self.next_handle);
        self.next_handle += 1;
        self.used += layout.size();
        self.allocations.insert(handle, Allocation { ptr, layout });

        Ok((handle, ptr))
    }

    /// Release an allocation. Returns the number of bytes freed.
    pub fn free(&mut self, handle: AllocationHandle) -> Result<usize> {
        let allocation = self
            .allocations
            .remove(&handle)
            .ok_or(Error::UnknownAllocation(handle.id()))?;

        let size = allocation.layout.size();
        if size > 0 {
            // SAFETY: ptr was returned by `alloc::alloc` with this layout and is
            // removed from the table, so it is freed exactly once.
            unsafe { alloc::dealloc(allocation.ptr.as_ptr(), allocation.layout) };
        }
        self.used -= size;
        Ok(size)
    }

    // ============================================================================================
    // Accounting
    // ============================================================================================

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    /// Number of allocations that have not been freed
    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("live_allocations", &self.allocations.len())
            .finish()
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let handles: Vec<_> = self.allocations.keys().copied().collect();
        for handle in handles {
            let _ = self.free(handle);
        }
    }
}
