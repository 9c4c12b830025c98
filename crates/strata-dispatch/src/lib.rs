//! Cross-execution-space transform and copy dispatch
//!
//! This crate provides:
//! - **Capability traits**: per-type relocatability and per-callable
//!   address obliviousness, answered at compile time
//! - **Relocation engine**: bulk byte copy or staged element-wise copy
//!   between memory spaces
//! - **Transform engine**: sequential, naive or batched kernels with
//!   32 or 64 bit indices
//! - **Dispatch routes**: an exhaustive table over source/destination spaces
//! - **Device runtime**: a simulated accelerator (memory manager, queue,
//!   buffers) whose kernels run on a rayon pool
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        dispatch::{copy_n, transform, ...}               │
//! │            Route::resolve(src, dst)                     │
//! └──────────────┬──────────────────────────┬───────────────┘
//!                │                          │
//!                ▼                          ▼
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │     Relocation Engine    │  │     Transform Engine     │
//! │ local | trivial | staged │  │ sequential|naive|batched │
//! └──────────────┬───────────┘  └─────────────┬────────────┘
//!                │       Capability Traits    │
//!                ▼                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │   Device: MemoryManager + DeviceQueue (rayon blocks)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use strata_dispatch::capability::builtin::Plus;
//! use strata_dispatch::{allow_copied_arguments, dispatch, Device, DeviceBuffer, DeviceId, ExecutionContext, Seq};
//!
//! # fn main() -> strata_dispatch::Result<()> {
//! let device = Device::with_defaults(DeviceId::new(0))?;
//! let host = ExecutionContext::host();
//! let ctx = ExecutionContext::device(&device);
//!
//! let a = vec![1, 2, 3];
//! let b = vec![10, 20, 30];
//! let mut sum = DeviceBuffer::from_elem(&device, 3, 0)?;
//!
//! let plus = allow_copied_arguments(Plus);
//! dispatch::transform_binary(&host, &ctx, Seq::from(&a), Seq::from(&b), 3, &plus, sum.as_seq_mut())?;
//! assert_eq!(sum.to_host()?, vec![11, 22, 33]);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod context;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod relocate;
pub mod sequence;
pub mod space;
pub mod staging;
pub mod stats;
pub mod transform;

// Re-export public API
pub use capability::{
    allow_copied_arguments, can_copy_arguments, is_input_address_oblivious, is_trivially_relocatable, not_fn,
    requires_stable_address, AlwaysTrue, BinaryOp, BuiltinOp, Callable, CopiedArguments, Element, NotFn,
    OpCapabilities, UnaryOp,
};
pub use config::DispatchConfig;
pub use context::{ExecutionContext, SyncPolicy};
pub use device::{Device, DeviceBuffer, DeviceQueue, DeviceSlice, DeviceSliceMut, Fault};
pub use dispatch::{copy_n, Route};
pub use error::{Error, QueueStatus, Result};
pub use relocate::{relocate_n, select_strategy, RelocationStrategy};
pub use sequence::{Seq, SeqMut};
pub use space::{DeviceId, Space};
pub use staging::StagingBuffer;
pub use stats::{DispatchStats, StatsSnapshot};
pub use transform::{
    select_index_width, select_kernel_strategy, transform, transform_binary, transform_binary_if,
    transform_binary_if_stencil, transform_if, transform_if_stencil, transform_in_place, IndexWidth, KernelStrategy,
};
