//! Device allocations, typed buffers and borrowed views

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use bytemuck::Pod;
use tracing::warn;

use super::{AllocationHandle, Device};
use crate::capability::Element;
use crate::context::ExecutionContext;
use crate::error::{ensure_len, ensure_space, Error, Result};
use crate::relocate::{construct_on_device, relocate_raw, DstInit};
use crate::sequence::{Seq, SeqMut};
use crate::space::{DeviceId, Space};

// ================================================================================================
// Raw Allocation
// ================================================================================================

/// Uninitialized device memory, returned to the device on drop
pub struct DeviceAllocation {
    device: Arc<Device>,
    handle: AllocationHandle,
    ptr: NonNull<u8>,
    bytes: usize,
}

// SAFETY: the allocation is exclusively owned; the device is thread safe.
unsafe impl Send for DeviceAllocation {}
unsafe impl Sync for DeviceAllocation {}

impl DeviceAllocation {
    /// Room for `len` values of `T` on `device`
    pub fn for_elements<T>(device: &Arc<Device>, len: usize) -> Result<Self> {
        let layout = Layout::array::<T>(len).map_err(|_| Error::OutOfMemory {
            requested: usize::MAX,
            available: device.available_bytes(),
        })?;
        let (handle, ptr) = device.allocate(layout)?;
        Ok(Self {
            device: Arc::clone(device),
            handle,
            ptr,
            bytes: layout.size(),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn handle(&self) -> AllocationHandle {
        self.handle
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn as_ptr<T>(&self) -> *mut T {
        self.ptr.as_ptr().cast()
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        if let Err(err) = self.device.free(self.handle) {
            warn!(device = %self.device.id(), handle = %self.handle, error = %err, "failed to free allocation");
        }
    }
}

impl fmt::Debug for DeviceAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAllocation")
            .field("device", &self.device.id())
            .field("handle", &self.handle)
            .field("bytes", &self.bytes)
            .finish()
    }
}

// ================================================================================================
// Typed Buffer
// ================================================================================================

/// Owned, initialized elements in device memory
pub struct DeviceBuffer<T: Element> {
    allocation: DeviceAllocation,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Element> DeviceBuffer<T> {
    /// Relocate a copy of `data` onto `device`.
    pub fn from_host(device: &Arc<Device>, data: &[T]) -> Result<Self> {
        Self::relocated(&ExecutionContext::host(), data, device)
    }

    /// Relocate a copy of `src`, living in `ctx_src`, onto `device`.
    pub fn relocated_from(ctx_src: &ExecutionContext, src: Seq<'_, T>, device: &Arc<Device>) -> Result<Self> {
        ensure_space(ctx_src.space(), src.space())?;
        Self::relocated(ctx_src, src.elements(), device)
    }

    pub(crate) fn relocated(ctx_src: &ExecutionContext, data: &[T], device: &Arc<Device>) -> Result<Self> {
        let allocation = DeviceAllocation::for_elements::<T>(device, data.len())?;
        let dst_ctx = ExecutionContext::device_blocking(device);

        // SAFETY: the allocation holds `data.len()` uninitialized slots.
        unsafe { relocate_raw(ctx_src, &dst_ctx, data, allocation.as_ptr::<T>(), data.len(), DstInit::Construct)? };

        Ok(Self {
            allocation,
            len: data.len(),
            _marker: PhantomData,
        })
    }

    /// `len` clones of `value`, constructed by a device kernel
    pub fn from_elem(device: &Arc<Device>, len: usize, value: T) -> Result<Self> {
        let allocation = DeviceAllocation::for_elements::<T>(device, len)?;
        if len > 0 {
            // SAFETY: the allocation holds `len` uninitialized slots.
            unsafe { construct_on_device(device, "fill", allocation.as_ptr::<T>(), len, |_| value.clone())? };
        }

        Ok(Self {
            allocation,
            len,
            _marker: PhantomData,
        })
    }

    /// Relocate the elements back into a host vector.
    pub fn to_host(&self) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.len);
        let src_ctx = ExecutionContext::device_blocking(self.device());
        let host = ExecutionContext::host();

        // SAFETY: `out` has capacity for `len` uninitialized slots, filled on success.
        unsafe {
            relocate_raw(&src_ctx, &host, self.data(), out.as_mut_ptr(), self.len, DstInit::Construct)?;
            out.set_len(self.len);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device(&self) -> &Arc<Device> {
        self.allocation.device()
    }

    pub fn space(&self) -> Space {
        self.device().space()
    }

    pub fn as_slice(&self) -> DeviceSlice<'_, T> {
        DeviceSlice {
            data: self.data(),
            device: self.device().id(),
        }
    }

    pub fn as_mut_slice(&mut self) -> DeviceSliceMut<'_, T> {
        let device = self.device().id();
        // SAFETY: `len` initialized elements, exclusively borrowed through `self`.
        let data = unsafe { std::slice::from_raw_parts_mut(self.allocation.as_ptr::<T>(), self.len) };
        DeviceSliceMut { data, device }
    }

    pub fn as_seq(&self) -> Seq<'_, T> {
        Seq::Device(self.as_slice())
    }

    pub fn as_seq_mut(&mut self) -> SeqMut<'_, T> {
        SeqMut::Device(self.as_mut_slice())
    }

    fn data(&self) -> &[T] {
        // SAFETY: `len` initialized elements owned by this buffer.
        unsafe { std::slice::from_raw_parts(self.allocation.as_ptr::<T>(), self.len) }
    }
}

impl<T: Element + Pod> DeviceBuffer<T> {
    /// Overwrite the buffer from raw bytes through the device queue.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.allocation.bytes();
        ensure_len("byte source", expected, bytes.len())?;
        let space = self.space();
        let dst = self.allocation.as_ptr::<u8>();
        // SAFETY: the allocation is `expected` bytes long and `T: Pod` accepts any bit pattern.
        unsafe { self.device().queue().copy_bytes(Space::Host, space, bytes.as_ptr(), dst, expected) }
    }

    /// Overwrite the buffer with `values`.
    pub fn copy_from_pod(&mut self, values: &[T]) -> Result<()> {
        ensure_len("value source", self.len, values.len())?;
        self.write_bytes(bytemuck::cast_slice(&values[..self.len]))
    }

    /// Read the raw bytes of the buffer through the device queue.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.allocation.bytes()];
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Read the elements as plain values.
    pub fn to_pod_vec(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len];
        self.read_into(bytemuck::cast_slice_mut(&mut out))?;
        Ok(out)
    }

    fn read_into(&self, out: &mut [u8]) -> Result<()> {
        let bytes = self.allocation.bytes();
        let src = self.allocation.as_ptr::<u8>().cast_const();
        // SAFETY: both ranges are `bytes` long and belong to different allocations.
        unsafe { self.device().queue().copy_bytes(self.space(), Space::Host, src, out.as_mut_ptr(), bytes) }
    }
}

impl<T: Element> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: exactly `len` elements are initialized; the memory is freed afterwards.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.allocation.as_ptr::<T>(), self.len));
        }
    }
}

impl<T: Element> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device().id())
            .field("len", &self.len)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

// ================================================================================================
// Views
// ================================================================================================

/// Shared view of device elements
pub struct DeviceSlice<'a, T> {
    data: &'a [T],
    device: DeviceId,
}

impl<T> Clone for DeviceSlice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceSlice<'_, T> {}

impl<'a, T> DeviceSlice<'a, T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn space(&self) -> Space {
        Space::Device(self.device)
    }

    /// Device address of the first element
    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    /// Sub-view over `range`; panics when out of bounds, like slice indexing
    pub fn slice(&self, range: Range<usize>) -> DeviceSlice<'a, T> {
        DeviceSlice {
            data: &self.data[range],
            device: self.device,
        }
    }

    pub(crate) fn data(&self) -> &'a [T] {
        self.data
    }
}

impl<T> fmt::Debug for DeviceSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSlice({}, len={})", self.device, self.data.len())
    }
}

/// Exclusive view of device elements
pub struct DeviceSliceMut<'a, T> {
    data: &'a mut [T],
    device: DeviceId,
}

impl<'a, T> DeviceSliceMut<'a, T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn space(&self) -> Space {
        Space::Device(self.device)
    }

    /// Shorter-lived exclusive view of the same elements
    pub fn reborrow(&mut self) -> DeviceSliceMut<'_, T> {
        DeviceSliceMut {
            data: &mut *self.data,
            device: self.device,
        }
    }

    pub fn as_slice(&self) -> DeviceSlice<'_, T> {
        DeviceSlice {
            data: &*self.data,
            device: self.device,
        }
    }

    /// Exclusive sub-view over `range`; panics when out of bounds
    pub fn slice_mut(self, range: Range<usize>) -> DeviceSliceMut<'a, T> {
        let DeviceSliceMut { data, device } = self;
        DeviceSliceMut {
            data: &mut data[range],
            device,
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [T] {
        &mut *self.data
    }
}

impl<T> fmt::Debug for DeviceSliceMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSliceMut({}, len={})", self.device, self.data.len())
    }
}
