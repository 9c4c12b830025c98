//! Kernel bodies
//!
//! `sequential` runs on the calling thread. `naive` invokes the callable once
//! per index on the original element addresses. `batched_*` copy a tile of
//! inputs into block-local storage first and invoke the callable on the
//! copies, which is only allowed for callables that opted in.

use crate::capability::{BinaryOp, UnaryOp};
use crate::device::{DeviceQueue, KernelOutput};
use crate::error::Result;

use super::index::IndexType;

/// In-order loop on the host
pub(crate) fn sequential<R, S, G>(result: &mut [R], selected: S, produce: G)
where
    S: Fn(usize) -> bool,
    G: Fn(usize) -> R,
{
    for (i, slot) in result.iter_mut().enumerate() {
        if selected(i) {
            *slot = produce(i);
        }
    }
}

/// One lane per index; unselected slots are left as they are
pub(crate) fn naive<I, R, S, G>(
    queue: &DeviceQueue,
    kernel_name: &'static str,
    count: I,
    result: &mut [R],
    selected: S,
    produce: G,
) -> Result<()>
where
    I: IndexType,
    R: Send,
    S: Fn(usize) -> bool + Sync,
    G: Fn(usize) -> R + Sync,
{
    let out = KernelOutput::new(&mut result[..count.as_usize()]);
    queue.launch_parallel_for(kernel_name, count, |i: I| {
        let i = i.as_usize();
        if selected(i) {
            // SAFETY: one lane per index, and the slot is initialized.
            unsafe { out.assign(i, produce(i)) };
        }
    })
}

/// One block per tile; the op sees block-local copies of its input
pub(crate) fn batched_unary<I, T, R, F>(
    queue: &DeviceQueue,
    kernel_name: &'static str,
    count: I,
    tile: usize,
    input: &[T],
    op: &F,
    result: &mut [R],
) -> Result<()>
where
    I: IndexType,
    T: Clone + Sync,
    R: Send,
    F: UnaryOp<T, Output = R>,
{
    let out = KernelOutput::new(&mut result[..count.as_usize()]);
    queue.launch_tiled(kernel_name, count, tile, |begin: I, end: I| {
        let begin = begin.as_usize();
        let tile_in: Vec<T> = input[begin..end.as_usize()].to_vec();
        for (k, x) in tile_in.iter().enumerate() {
            // SAFETY: tiles are disjoint, and every slot is initialized.
            unsafe { out.assign(begin + k, op.apply(x)) };
        }
    })
}

/// Binary form of [`batched_unary`]
#[allow(clippy::too_many_arguments)]
pub(crate) fn batched_binary<I, A, B, R, F>(
    queue: &DeviceQueue,
    kernel_name: &'static str,
    count: I,
    tile: usize,
    first: &[A],
    second: &[B],
    op: &F,
    result: &mut [R],
) -> Result<()>
where
    I: IndexType,
    A: Clone + Sync,
    B: Clone + Sync,
    R: Send,
    F: BinaryOp<A, B, Output = R>,
{
    let out = KernelOutput::new(&mut result[..count.as_usize()]);
    queue.launch_tiled(kernel_name, count, tile, |begin: I, end: I| {
        let (begin, end) = (begin.as_usize(), end.as_usize());
        let tile_a: Vec<A> = first[begin..end].to_vec();
        let tile_b: Vec<B> = second[begin..end].to_vec();
        for (k, (a, b)) in tile_a.iter().zip(&tile_b).enumerate() {
            // SAFETY: tiles are disjoint, and every slot is initialized.
            unsafe { out.assign(begin + k, op.combine(a, b)) };
        }
    })
}

/// Naive in-place kernel: each lane reads its slot and overwrites it
pub(crate) fn naive_in_place<I, T, F>(queue: &DeviceQueue, kernel_name: &'static str, count: I, data: &mut [T], op: &F) -> Result<()>
where
    I: IndexType,
    T: Send + Sync,
    F: UnaryOp<T, Output = T>,
{
    let out = KernelOutput::new(&mut data[..count.as_usize()]);
    queue.launch_parallel_for(kernel_name, count, |i: I| {
        let i = i.as_usize();
        // SAFETY: one lane per index; the value is read before it is replaced.
        unsafe {
            let value = op.apply(out.get(i));
            out.assign(i, value);
        }
    })
}

/// Batched in-place kernel: the op sees a block-local copy of the tile
pub(crate) fn batched_in_place<I, T, F>(
    queue: &DeviceQueue,
    kernel_name: &'static str,
    count: I,
    tile: usize,
    data: &mut [T],
    op: &F,
) -> Result<()>
where
    I: IndexType,
    T: Clone + Send + Sync,
    F: UnaryOp<T, Output = T>,
{
    let out = KernelOutput::new(&mut data[..count.as_usize()]);
    queue.launch_tiled(kernel_name, count, tile, |begin: I, end: I| {
        let begin = begin.as_usize();
        let tile_in: Vec<T> = (begin..end.as_usize())
            // SAFETY: the tile belongs to this block alone.
            .map(|i| unsafe { out.get(i) }.clone())
            .collect();
        for (k, x) in tile_in.iter().enumerate() {
            // SAFETY: as above.
            unsafe { out.assign(begin + k, op.apply(x)) };
        }
    })
}
