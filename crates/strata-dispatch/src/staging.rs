//! Call-scoped staging buffers for element-wise relocation
//!
//! A staging buffer owns a prefix of its slots. It destroys exactly the
//! elements it owns when dropped, on every exit path of the relocation that
//! created it. Moving the bytes of owned elements to another staging buffer
//! moves their ownership too.

use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::Arc;

use strata_tracing::performance::record_staging;

use crate::capability::Element;
use crate::context::ExecutionContext;
use crate::device::DeviceAllocation;
use crate::error::{ensure_len, Error, Result};
use crate::relocate::{clone_into, DstInit};
use crate::space::Space;
use crate::stats::DispatchStats;

enum Storage<T> {
    Host { _slots: Vec<MaybeUninit<T>> },
    Device { _allocation: DeviceAllocation },
}

/// Uninitialized, space-local room for `capacity` elements
pub struct StagingBuffer<T: Element> {
    // Keeps the memory alive; `ptr` points into it.
    _storage: Storage<T>,
    ptr: *mut T,
    capacity: usize,
    owned: usize,
    space: Space,
    stats: Arc<DispatchStats>,
}

// SAFETY: the buffer exclusively owns its slots and the elements in them.
unsafe impl<T: Element> Send for StagingBuffer<T> {}

impl<T: Element> StagingBuffer<T> {
    /// Allocate `capacity` slots in the space of `ctx`, counted on `stats`.
    pub fn allocate(ctx: &ExecutionContext, capacity: usize, stats: &Arc<DispatchStats>) -> Result<Self> {
        let (storage, ptr) = match ctx.device_handle() {
            Some(device) => {
                let allocation = DeviceAllocation::for_elements::<T>(device, capacity)?;
                let ptr = allocation.as_ptr::<T>();
                (Storage::Device { _allocation: allocation }, ptr)
            }
            None => {
                let mut slots = Vec::with_capacity(capacity);
                slots.resize_with(capacity, MaybeUninit::<T>::uninit);
                let ptr = slots.as_mut_ptr().cast::<T>();
                (Storage::Host { _slots: slots }, ptr)
            }
        };

        let space = ctx.space();
        stats.record_staging_allocation();
        record_staging(&space.to_string(), capacity, capacity * mem::size_of::<T>(), false);

        Ok(Self {
            _storage: storage,
            ptr,
            capacity,
            owned: 0,
            space,
            stats: Arc::clone(stats),
        })
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of constructed elements this buffer owns
    pub fn len(&self) -> usize {
        self.owned
    }

    pub fn is_empty(&self) -> bool {
        self.owned == 0
    }

    /// The owned elements
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `owned` slots are initialized.
        unsafe { std::slice::from_raw_parts(self.ptr, self.owned) }
    }

    /// Construct `value` in the next free slot.
    pub fn construct_at_end(&mut self, value: T) -> Result<()> {
        ensure_len("staging", self.owned + 1, self.capacity)?;
        // SAFETY: slot `owned` is in bounds and uninitialized.
        unsafe { ptr::write(self.ptr.add(self.owned), value) };
        self.owned += 1;
        Ok(())
    }

    /// Clone-construct every element of `src` into an empty buffer, running
    /// in `ctx` (a device kernel when `ctx` is a device).
    pub fn construct_from(&mut self, ctx: &ExecutionContext, src: &[T]) -> Result<()> {
        ensure_vacant(self)?;
        ensure_len("staging", src.len(), self.capacity)?;

        // SAFETY: the buffer has `src.len()` uninitialized slots.
        unsafe { clone_into(ctx, "stage_construct", src, self.ptr, src.len(), DstInit::Construct)? };

        self.owned = src.len();
        self.stats.record_staged_constructed(src.len());
        Ok(())
    }

    /// Move the owned elements' bytes into the empty buffer `dst` through
    /// `transport`. `dst` owns the elements afterwards.
    pub fn transfer_to(&mut self, dst: &mut StagingBuffer<T>, transport: &ExecutionContext) -> Result<()> {
        ensure_vacant(dst)?;
        ensure_len("staging destination", self.owned, dst.capacity)?;

        let bytes = self.owned * mem::size_of::<T>();
        // SAFETY: both buffers hold at least `owned` slots and never alias.
        unsafe {
            transport.copy_bytes(
                self.space,
                dst.space,
                self.ptr.cast_const().cast::<u8>(),
                dst.ptr.cast::<u8>(),
                bytes,
            )?;
        }

        dst.owned = self.owned;
        self.owned = 0;
        Ok(())
    }
}

fn ensure_vacant<T: Element>(buf: &StagingBuffer<T>) -> Result<()> {
    if buf.owned != 0 {
        return Err(Error::StagingOccupied { owned: buf.owned });
    }
    Ok(())
}

impl<T: Element> Drop for StagingBuffer<T> {
    fn drop(&mut self) {
        let owned = self.owned;
        // SAFETY: exactly the first `owned` slots are initialized.
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr, owned)) };
        self.owned = 0;

        self.stats.record_staged_destroyed(owned);
        record_staging(&self.space.to_string(), owned, self.capacity * mem::size_of::<T>(), true);
    }
}
