//! Device work queue
//!
//! Kernels run on the device's rayon pool: blocks in parallel, lanes of one
//! block on the worker that picked the block up. Launches and copies execute
//! before the call returns, so borrowed sequence views never outlive the work
//! that uses them. Failures that a real accelerator reports asynchronously are
//! parked as the queue's pending error and returned by [`DeviceQueue::synchronize`].

use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use strata_tracing::performance::record_transfer;
use tracing::{debug, warn};

use crate::error::{Error, QueueStatus, Result};
use crate::space::{DeviceId, Space};
use crate::stats::DispatchStats;
use crate::transform::IndexType;

// ================================================================================================
// Launch Geometry
// ================================================================================================

/// One-dimensional launch geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks
    pub grid: usize,
    /// Lanes per block
    pub block: usize,
}

impl LaunchConfig {
    /// Enough blocks of `block_size` lanes to cover `total_elements`
    pub const fn linear(total_elements: usize, block_size: usize) -> Self {
        Self {
            grid: total_elements.div_ceil(block_size),
            block: block_size,
        }
    }

    /// Lanes across all blocks; at least `total_elements`
    pub const fn total_lanes(&self) -> usize {
        self.grid * self.block
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<<<{}, {}>>>", self.grid, self.block)
    }
}

// ================================================================================================
// Fault Injection
// ================================================================================================

/// Failures that can be armed on a queue; each fires once, on the next matching primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// The next launch is rejected and returns an error immediately
    LaunchRejected,
    /// The next launch is accepted, skipped, and reported at synchronization
    ExecutionFault,
    /// The next byte copy fails
    CopyFailed,
    /// The next device allocation fails
    OutOfMemory,
}

#[derive(Default)]
struct QueueState {
    pending: Option<Error>,
    armed: Vec<Fault>,
}

// ================================================================================================
// Kernel Output
// ================================================================================================

/// Mutable slice shared by the lanes of one launch.
///
/// Lanes write disjoint indices; the queue invokes every index at most once
/// per launch, which is what makes the unchecked accessors sound.
pub(crate) struct KernelOutput<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

// SAFETY: lanes only touch disjoint slots, each from a single thread.
unsafe impl<T: Send> Send for KernelOutput<'_, T> {}
unsafe impl<T: Send> Sync for KernelOutput<'_, T> {}

impl<'a, T> KernelOutput<'a, T> {
    pub(crate) fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// Output over `len` possibly uninitialized slots
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `len` elements for `'a`.
    pub(crate) unsafe fn from_raw(ptr: *mut T, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Read the initialized value at `i`.
    ///
    /// # Safety
    ///
    /// Slot `i` is initialized and only the calling lane accesses it.
    pub(crate) unsafe fn get(&self, i: usize) -> &T {
        debug_assert!(i < self.len);
        &*self.ptr.add(i)
    }

    /// Assign over the initialized value at `i`.
    ///
    /// # Safety
    ///
    /// Slot `i` is initialized and no other lane accesses it during the launch.
    pub(crate) unsafe fn assign(&self, i: usize, value: T) {
        debug_assert!(i < self.len);
        *self.ptr.add(i) = value;
    }

    /// Construct into the uninitialized slot `i` without dropping it.
    ///
    /// # Safety
    ///
    /// No other lane accesses slot `i` during the launch.
    pub(crate) unsafe fn construct(&self, i: usize, value: T) {
        debug_assert!(i < self.len);
        ptr::write(self.ptr.add(i), value);
    }
}

// ================================================================================================
// Queue
// ================================================================================================

/// Ordered work queue of one device
pub struct DeviceQueue {
    device: DeviceId,
    block_size: usize,
    pool: ThreadPool,
    state: Mutex<QueueState>,
    stats: Arc<DispatchStats>,
}

impl DeviceQueue {
    pub(crate) fn new(device: DeviceId, block_size: usize, pool: ThreadPool, stats: Arc<DispatchStats>) -> Self {
        Self {
            device,
            block_size,
            pool,
            state: Mutex::new(QueueState::default()),
            stats,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Worker threads executing blocks
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Arm `fault` to fire on the next matching primitive.
    pub fn inject_fault(&self, fault: Fault) {
        self.state.lock().armed.push(fault);
    }

    pub(crate) fn take_fault(&self, fault: Fault) -> bool {
        let mut state = self.state.lock();
        match state.armed.iter().position(|armed| *armed == fault) {
            Some(pos) => {
                state.armed.remove(pos);
                true
            }
            None => false,
        }
    }

    fn park_error(&self, err: Error) {
        let mut state = self.state.lock();
        // The first fault wins, as on hardware queues.
        if state.pending.is_none() {
            state.pending = Some(err);
        }
    }

    /// Wait for queued work and report the first fault since the last call.
    pub fn synchronize(&self) -> Result<()> {
        match self.state.lock().pending.take() {
            Some(err) => {
                warn!(device = %self.device, error = %err, "synchronize reported a pending fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Whether a fault is waiting to be reported
    pub fn has_pending_error(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    // ============================================================================================
    // Launches
    // ============================================================================================

    /// Invoke `kernel(i)` once for every `i` in `[0, count)`.
    pub fn launch_parallel_for<I, K>(&self, kernel_name: &'static str, count: I, kernel: K) -> Result<()>
    where
        I: IndexType,
        K: Fn(I) + Sync,
    {
        let total = count.as_usize();
        let config = LaunchConfig::linear(total, self.block_size);
        self.launch_blocks(kernel_name, config, |block| {
            let begin = block * config.block;
            let end = (begin + config.block).min(total);
            for i in begin..end {
                kernel(I::from_usize(i));
            }
        })
    }

    /// Invoke `kernel(begin, end)` once per tile of `tile` consecutive indices.
    pub fn launch_tiled<I, K>(&self, kernel_name: &'static str, count: I, tile: usize, kernel: K) -> Result<()>
    where
        I: IndexType,
        K: Fn(I, I) + Sync,
    {
        let total = count.as_usize();
        let config = LaunchConfig::linear(total, tile.max(1));
        self.launch_blocks(kernel_name, config, |block| {
            let begin = block * config.block;
            let end = (begin + config.block).min(total);
            kernel(I::from_usize(begin), I::from_usize(end));
        })
    }

    fn launch_blocks<F>(&self, kernel_name: &'static str, config: LaunchConfig, block_fn: F) -> Result<()>
    where
        F: Fn(usize) + Sync,
    {
        if self.take_fault(Fault::LaunchRejected) {
            warn!(device = %self.device, kernel = kernel_name, "launch rejected");
            return Err(Error::transport(kernel_name, QueueStatus::LaunchFailure));
        }
        if self.take_fault(Fault::ExecutionFault) {
            warn!(device = %self.device, kernel = kernel_name, "kernel faulted");
            self.park_error(Error::transport(kernel_name, QueueStatus::ExecutionFault));
            return Ok(());
        }

        debug!(device = %self.device, kernel = kernel_name, launch = %config, "launch");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool
                .install(|| (0..config.grid).into_par_iter().for_each(|block| block_fn(block)))
        }));
        if outcome.is_err() {
            warn!(device = %self.device, kernel = kernel_name, "kernel panicked");
            self.park_error(Error::transport(kernel_name, QueueStatus::ExecutionFault));
        }
        Ok(())
    }

    // ============================================================================================
    // Copies
    // ============================================================================================

    /// Copy `bytes` raw bytes from `src` in `src_space` to `dst` in `dst_space`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads and `dst` valid for writes of `bytes`
    /// bytes, and the two ranges must not overlap.
    pub unsafe fn copy_bytes(
        &self,
        src_space: Space,
        dst_space: Space,
        src: *const u8,
        dst: *mut u8,
        bytes: usize,
    ) -> Result<()> {
        if self.take_fault(Fault::CopyFailed) {
            warn!(device = %self.device, %src_space, %dst_space, bytes, "byte copy failed");
            return Err(Error::transport("copy_bytes", QueueStatus::CopyFault));
        }

        let start = Instant::now();
        ptr::copy_nonoverlapping(src, dst, bytes);
        self.stats.record_bulk_copy(bytes);
        record_transfer(
            bytes,
            &format!("{src_space}->{dst_space}"),
            start.elapsed().as_micros() as u64,
        );
        Ok(())
    }
}

impl fmt::Debug for DeviceQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceQueue")
            .field("device", &self.device)
            .field("block_size", &self.block_size)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}
