//! Simulated accelerator
//!
//! ```text
//! Device
//! ├── MemoryManager   capacity-limited allocations, by handle
//! ├── DeviceQueue     rayon pool, launches, byte copies, pending fault
//! └── DispatchStats   counters shared with every context on this device
//! ```

mod buffer;
mod memory;
mod queue;

pub use buffer::{DeviceAllocation, DeviceBuffer, DeviceSlice, DeviceSliceMut};
pub use memory::{AllocationHandle, MemoryManager};
pub use queue::{DeviceQueue, Fault, LaunchConfig};

pub(crate) use queue::KernelOutput;

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::space::{DeviceId, Space};
use crate::stats::DispatchStats;

/// One accelerator: memory, a work queue and counters
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    config: DispatchConfig,
    memory: RwLock<MemoryManager>,
    queue: DeviceQueue,
}

impl Device {
    /// Bring up device `id` with its own worker pool.
    pub fn new(id: DeviceId, config: DispatchConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("strata-{id}-worker{i}"));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::invalid_config(format!("{id}: cannot start worker pool: {e}")))?;

        let stats = Arc::new(DispatchStats::new());
        let queue = DeviceQueue::new(id, config.block_size as usize, pool, stats);

        info!(
            device = %id,
            workers = queue.worker_threads(),
            memory_bytes = config.device_memory_bytes,
            block_size = config.block_size,
            "device initialized"
        );

        Ok(Arc::new(Self {
            id,
            memory: RwLock::new(MemoryManager::new(config.device_memory_bytes)),
            config,
            queue,
        }))
    }

    /// Device with [`DispatchConfig::default`]
    pub fn with_defaults(id: DeviceId) -> Result<Arc<Self>> {
        Self::new(id, DispatchConfig::default())
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn space(&self) -> Space {
        Space::Device(self.id)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn queue(&self) -> &DeviceQueue {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        self.queue.stats()
    }

    /// Arm a fault on this device; see [`Fault`].
    pub fn inject_fault(&self, fault: Fault) {
        self.queue.inject_fault(fault);
    }

    // ============================================================================================
    // Memory
    // ============================================================================================

    pub(crate) fn allocate(&self, layout: Layout) -> Result<(AllocationHandle, NonNull<u8>)> {
        if self.queue.take_fault(Fault::OutOfMemory) {
            let available = self.memory.read().available();
            warn!(device = %self.id, requested = layout.size(), "allocation failed");
            return Err(Error::OutOfMemory {
                requested: layout.size(),
                available,
            });
        }
        self.memory.write().allocate(layout)
    }

    pub(crate) fn free(&self, handle: AllocationHandle) -> Result<usize> {
        self.memory.write().free(handle)
    }

    pub fn used_bytes(&self) -> usize {
        self.memory.read().used()
    }

    pub fn available_bytes(&self) -> usize {
        self.memory.read().available()
    }

    /// Allocations not yet returned; staging must leave this unchanged.
    pub fn live_allocations(&self) -> usize {
        self.memory.read().live_allocations()
    }
}
