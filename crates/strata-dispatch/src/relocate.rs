//! Relocation engine
//!
//! Moves a contiguous range between two execution contexts:
//!
//! ```text
//! same space ──────────────────────────────► local clone   (no staging)
//! trivially relocatable ───────────────────► one bulk byte copy
//! otherwise:
//!   src ─clone─► stage 1 (src space) ─bytes─► stage 2 (dst space) ─clone─► dst
//!                                              └─ destroyed on return
//! ```
//!
//! Kernels launched here are always waited for before returning, whatever
//! the contexts' sync policy, so staging never outlives the call.

use std::fmt;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_tracing::perf_span;
use tracing::{debug, warn};

use crate::capability::{is_trivially_relocatable, Element};
use crate::context::ExecutionContext;
use crate::device::{Device, KernelOutput};
use crate::error::{ensure_len, ensure_space, Result};
use crate::sequence::{Seq, SeqMut};
use crate::space::Space;
use crate::staging::StagingBuffer;
use crate::transform::{launch_indexed, select_index_width};

/// How a relocation moves its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocationStrategy {
    /// Source and destination share a space
    Local,
    /// One bulk byte copy
    Trivial,
    /// Element-wise construction through two staging buffers
    Staged,
}

impl RelocationStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Trivial => "trivial",
            Self::Staged => "staged",
        }
    }
}

impl fmt::Display for RelocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for relocating `T` from `src` to `dst`.
pub const fn select_strategy<T: Element>(src: Space, dst: Space) -> RelocationStrategy {
    if space_eq(src, dst) {
        RelocationStrategy::Local
    } else if is_trivially_relocatable::<T>(src, dst) {
        RelocationStrategy::Trivial
    } else {
        RelocationStrategy::Staged
    }
}

const fn space_eq(a: Space, b: Space) -> bool {
    match (a, b) {
        (Space::Host, Space::Host) => true,
        (Space::Device(x), Space::Device(y)) => x.ordinal() == y.ordinal(),
        _ => false,
    }
}

/// Whether destination slots hold live values or raw memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DstInit {
    /// Clone-assign over initialized values
    Assign,
    /// Clone-construct into uninitialized slots
    Construct,
}

/// The context whose queue carries bytes between `src` and `dst`: the
/// device side of a host/device pair, the source otherwise.
pub(crate) fn owning_context<'c>(src: &'c ExecutionContext, dst: &'c ExecutionContext) -> &'c ExecutionContext {
    if src.supports_batched_dispatch() || !dst.supports_batched_dispatch() {
        src
    } else {
        dst
    }
}

/// Relocate the first `n` elements of `src` (living in `ctx_src`) over the
/// first `n` elements of `dst` (living in `ctx_dst`). Returns the destination
/// offset just past the written range, which is `n`.
pub fn relocate_n<T: Element>(
    ctx_src: &ExecutionContext,
    ctx_dst: &ExecutionContext,
    src: Seq<'_, T>,
    n: usize,
    mut dst: SeqMut<'_, T>,
) -> Result<usize> {
    if n == 0 {
        return Ok(0);
    }

    ensure_space(ctx_src.space(), src.space())?;
    ensure_space(ctx_dst.space(), dst.space())?;
    ensure_len("source", n, src.len())?;
    ensure_len("destination", n, dst.len())?;

    let src = &src.elements()[..n];
    let dst = dst.elements_mut();
    // SAFETY: `dst` holds at least `n` initialized elements and is exclusively borrowed.
    unsafe { relocate_raw(ctx_src, ctx_dst, src, dst.as_mut_ptr(), n, DstInit::Assign)? };
    Ok(n)
}

/// Relocation core shared by [`relocate_n`] and the buffer constructors.
///
/// # Safety
///
/// `dst` must be valid for `n` writes in the space of `ctx_dst`, initialized
/// when `init` is [`DstInit::Assign`], and must not overlap `src`.
pub(crate) unsafe fn relocate_raw<T: Element>(
    ctx_src: &ExecutionContext,
    ctx_dst: &ExecutionContext,
    src: &[T],
    dst: *mut T,
    n: usize,
    init: DstInit,
) -> Result<()> {
    if n == 0 {
        return Ok(());
    }

    let (src_space, dst_space) = (ctx_src.space(), ctx_dst.space());
    let strategy = select_strategy::<T>(src_space, dst_space);
    let owner = owning_context(ctx_src, ctx_dst);
    let _span = perf_span!("relocate_n", count = n, strategy = strategy.as_str());

    debug!(
        %src_space,
        %dst_space,
        count = n,
        strategy = strategy.as_str(),
        element = std::any::type_name::<T>(),
        "relocating"
    );

    match strategy {
        RelocationStrategy::Local => {
            clone_into(ctx_src, "local_copy", src, dst, n, init)?;
            ctx_src.stats().record_local_copy();
            Ok(())
        }
        RelocationStrategy::Trivial => owner.copy_bytes(
            src_space,
            dst_space,
            src.as_ptr().cast::<u8>(),
            dst.cast::<u8>(),
            n * mem::size_of::<T>(),
        ),
        RelocationStrategy::Staged => {
            let stats = owner.stats();

            let mut source_stage = StagingBuffer::<T>::allocate(ctx_src, n, stats)?;
            source_stage.construct_from(ctx_src, src)?;

            let mut dest_stage = StagingBuffer::<T>::allocate(ctx_dst, n, stats)?;
            source_stage.transfer_to(&mut dest_stage, owner)?;

            clone_into(ctx_dst, "unstage", dest_stage.as_slice(), dst, n, init)
        }
    }
}

/// Clone `src[i]` into `dst[i]` for every `i < n`, sequentially on the host or
/// as one kernel on a device, then wait for the kernel.
///
/// When constructing into raw slots and the call fails partway, the elements
/// already constructed are dropped again before the error is returned.
///
/// # Safety
///
/// Same contract as [`relocate_raw`], with `dst` living in the space of `ctx`.
pub(crate) unsafe fn clone_into<T: Element>(
    ctx: &ExecutionContext,
    kernel_name: &'static str,
    src: &[T],
    dst: *mut T,
    n: usize,
    init: DstInit,
) -> Result<()> {
    let src = &src[..n];
    match (ctx.device_handle(), init) {
        (None, DstInit::Assign) => {
            for (i, value) in src.iter().enumerate() {
                *dst.add(i) = value.clone();
            }
            Ok(())
        }
        (None, DstInit::Construct) => {
            let mut guard = ConstructGuard { dst, built: 0 };
            for (i, value) in src.iter().enumerate() {
                dst.add(i).write(value.clone());
                guard.built = i + 1;
            }
            mem::forget(guard);
            Ok(())
        }
        (Some(device), DstInit::Assign) => {
            let out = KernelOutput::from_raw(dst, n);
            let width = select_index_width(n as u64, device.config().narrow_index_limit);
            launch_indexed(device.queue(), kernel_name, width, n, |i| {
                // SAFETY: every index in `[0, n)` is visited exactly once.
                unsafe { out.assign(i, src[i].clone()) }
            })?;
            device.queue().synchronize()
        }
        (Some(device), DstInit::Construct) => construct_on_device(device, kernel_name, dst, n, |i| src[i].clone()),
    }
}

/// Construct `make(i)` into every uninitialized slot `dst[i]`, `i < n`, as
/// one kernel on `device`, then wait for it. On failure the slots whose
/// construction completed are dropped before the error is returned.
///
/// # Safety
///
/// `dst` must be valid for `n` writes in the space of `device`.
pub(crate) unsafe fn construct_on_device<T, G>(
    device: &Device,
    kernel_name: &'static str,
    dst: *mut T,
    n: usize,
    make: G,
) -> Result<()>
where
    T: Element,
    G: Fn(usize) -> T + Sync,
{
    let out = KernelOutput::from_raw(dst, n);
    let built: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
    let width = select_index_width(n as u64, device.config().narrow_index_limit);

    let outcome = launch_indexed(device.queue(), kernel_name, width, n, |i| {
        let value = make(i);
        // SAFETY: every index in `[0, n)` is visited exactly once.
        unsafe { out.construct(i, value) };
        built[i].store(true, Ordering::Release);
    })
    .and_then(|()| device.queue().synchronize());

    if let Err(err) = outcome {
        let mut dropped = 0usize;
        for (i, flag) in built.iter().enumerate() {
            if flag.load(Ordering::Acquire) {
                ptr::drop_in_place(dst.add(i));
                dropped += 1;
            }
        }
        warn!(device = %device.id(), kernel = kernel_name, dropped, error = %err, "construction failed");
        return Err(err);
    }
    Ok(())
}

/// Drops the first `built` slots unless forgotten.
struct ConstructGuard<T> {
    dst: *mut T,
    built: usize,
}

impl<T> Drop for ConstructGuard<T> {
    fn drop(&mut self) {
        // SAFETY: exactly the first `built` slots were written.
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.dst, self.built)) };
    }
}
