//! Transform engine
//!
//! Applies a unary or binary callable element-wise, optionally gated by a
//! predicate over a stencil (or over the input itself). Strategy selection:
//!
//! ```text
//! host context ───────────────────────────────► Sequential loop
//! device, predicate present ──────────────────► Naive kernel
//! device, op may run on copies of its inputs ─► Batched kernel
//! device, otherwise ──────────────────────────► Naive kernel
//! ```
//!
//! Every device launch also picks an index width (see [`IndexWidth`]). All
//! entry points return `count`, the number of result positions advanced.

mod index;
mod kernels;

pub use index::{select_index_width, IndexType, IndexWidth};

pub(crate) use index::launch_indexed;

use std::fmt;
use std::time::Instant;

use strata_tracing::perf_span;
use strata_tracing::performance::record_launch;
use tracing::debug;

use crate::capability::{requires_stable_address, BinaryOp, Callable, Element, OpCapabilities, UnaryOp};
use crate::context::ExecutionContext;
use crate::device::DeviceQueue;
use crate::error::{ensure_len, ensure_space, Result};
use crate::sequence::{Seq, SeqMut};
use crate::space::Space;

/// Kernel shape used for one transform call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelStrategy {
    /// In-order loop on the calling thread
    Sequential,
    /// One invocation per index on the original addresses
    Naive,
    /// Tiles of inputs copied to block-local storage first
    Batched,
}

impl KernelStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Naive => "naive",
            Self::Batched => "batched",
        }
    }
}

impl fmt::Display for KernelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy for running `F` over `Args` in `ctx`.
pub fn select_kernel_strategy<F: Callable<Args>, Args>(ctx: &ExecutionContext, predicated: bool) -> KernelStrategy {
    if !ctx.supports_batched_dispatch() {
        KernelStrategy::Sequential
    } else if predicated || requires_stable_address::<F, Args>() {
        KernelStrategy::Naive
    } else {
        KernelStrategy::Batched
    }
}

macro_rules! with_index_type {
    ($width:expr, $I:ident => $body:expr) => {
        match $width {
            IndexWidth::Narrow => {
                type $I = u32;
                $body
            }
            IndexWidth::Wide => {
                type $I = u64;
                $body
            }
        }
    };
}

// ================================================================================================
// Launch Plan
// ================================================================================================

enum Exec<'c> {
    Sequential,
    Naive {
        queue: &'c DeviceQueue,
        width: IndexWidth,
    },
    Batched {
        queue: &'c DeviceQueue,
        width: IndexWidth,
        tile: usize,
    },
}

struct Plan<'c> {
    ctx: &'c ExecutionContext,
    kernel: &'static str,
    count: usize,
    strategy: KernelStrategy,
    exec: Exec<'c>,
    started: Instant,
}

impl<'c> Plan<'c> {
    fn new<F: Callable<Args>, Args>(
        ctx: &'c ExecutionContext,
        kernel: &'static str,
        count: usize,
        predicated: bool,
    ) -> Self {
        let strategy = select_kernel_strategy::<F, Args>(ctx, predicated);
        let exec = match ctx.device_handle() {
            None => Exec::Sequential,
            Some(device) => {
                let config = device.config();
                let width = select_index_width(count as u64, config.narrow_index_limit);
                match strategy {
                    KernelStrategy::Batched => Exec::Batched {
                        queue: device.queue(),
                        width,
                        tile: config.tile_size(),
                    },
                    _ => Exec::Naive {
                        queue: device.queue(),
                        width,
                    },
                }
            }
        };

        let caps = OpCapabilities::of::<F, Args>();
        debug!(
            kernel,
            context = %ctx,
            count,
            strategy = strategy.as_str(),
            index_bits = width_of(&exec).map_or(0, IndexWidth::bits),
            can_copy_arguments = caps.can_copy_arguments,
            input_address_oblivious = caps.input_address_oblivious,
            predicated,
            "transform dispatch"
        );

        Self {
            ctx,
            kernel,
            count,
            strategy,
            exec,
            started: Instant::now(),
        }
    }

    /// Sequential or naive execution of `result[i] = produce(i)` where `selected(i)`.
    fn run_elementwise<R, S, G>(&self, result: &mut [R], selected: S, produce: G) -> Result<()>
    where
        R: Element,
        S: Fn(usize) -> bool + Sync,
        G: Fn(usize) -> R + Sync,
    {
        match self.exec {
            Exec::Sequential => {
                kernels::sequential(result, selected, produce);
                Ok(())
            }
            Exec::Naive { queue, width } | Exec::Batched { queue, width, .. } => {
                let count = self.count;
                with_index_type!(width, I => kernels::naive(queue, self.kernel, I::from_usize(count), result, &selected, &produce))
            }
        }
    }

    /// Record the launch and synchronize per the context's policy.
    fn finish(self) -> Result<usize> {
        let width = width_of(&self.exec);
        self.ctx.stats().record_launch(self.strategy, width);
        record_launch(
            self.kernel,
            self.strategy.as_str(),
            width.map_or(0, IndexWidth::bits),
            self.count as u64,
            self.started.elapsed().as_micros() as u64,
        );
        self.ctx.complete()?;
        Ok(self.count)
    }
}

fn width_of(exec: &Exec<'_>) -> Option<IndexWidth> {
    match exec {
        Exec::Sequential => None,
        Exec::Naive { width, .. } | Exec::Batched { width, .. } => Some(*width),
    }
}

fn check_seq(ctx: &ExecutionContext, role: &'static str, count: usize, space: Space, len: usize) -> Result<()> {
    ensure_space(ctx.space(), space)?;
    ensure_len(role, count, len)
}

// ================================================================================================
// Unary
// ================================================================================================

/// `result[i] = op(input[i])` for `i < count`.
pub fn transform<T, R, F>(
    ctx: &ExecutionContext,
    input: Seq<'_, T>,
    count: usize,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    T: Element,
    R: Element,
    F: UnaryOp<T, Output = R>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "input", count, input.space(), input.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform", count = count);
    let input = &input.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (T,)>(ctx, "transform", count, false);
    match plan.exec {
        Exec::Batched { queue, width, tile } => with_index_type!(width, I => kernels::batched_unary(
            queue,
            plan.kernel,
            I::from_usize(count),
            tile,
            input,
            op,
            result
        ))?,
        _ => plan.run_elementwise(result, |_| true, |i| op.apply(&input[i]))?,
    }
    plan.finish()
}

/// `result[i] = op(input[i])` where `pred(input[i])`; other slots untouched.
pub fn transform_if<T, R, F, P>(
    ctx: &ExecutionContext,
    input: Seq<'_, T>,
    count: usize,
    pred: &P,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    T: Element,
    R: Element,
    F: UnaryOp<T, Output = R>,
    P: UnaryOp<T, Output = bool>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "input", count, input.space(), input.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform_if", count = count);
    let input = &input.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (T,)>(ctx, "transform_if", count, true);
    plan.run_elementwise(result, |i| pred.apply(&input[i]), |i| op.apply(&input[i]))?;
    plan.finish()
}

/// `result[i] = op(input[i])` where `pred(stencil[i])`; other slots untouched.
pub fn transform_if_stencil<T, S, R, F, P>(
    ctx: &ExecutionContext,
    input: Seq<'_, T>,
    count: usize,
    stencil: Seq<'_, S>,
    pred: &P,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    T: Element,
    S: Element,
    R: Element,
    F: UnaryOp<T, Output = R>,
    P: UnaryOp<S, Output = bool>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "input", count, input.space(), input.len())?;
    check_seq(ctx, "stencil", count, stencil.space(), stencil.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform_if_stencil", count = count);
    let input = &input.elements()[..count];
    let stencil = &stencil.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (T,)>(ctx, "transform_if_stencil", count, true);
    plan.run_elementwise(result, |i| pred.apply(&stencil[i]), |i| op.apply(&input[i]))?;
    plan.finish()
}

/// `data[i] = op(data[i])` for `i < count`.
pub fn transform_in_place<T, F>(ctx: &ExecutionContext, mut data: SeqMut<'_, T>, count: usize, op: &F) -> Result<usize>
where
    T: Element,
    F: UnaryOp<T, Output = T>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "data", count, data.space(), data.len())?;

    let _span = perf_span!("transform_in_place", count = count);
    let data = &mut data.elements_mut()[..count];

    let plan = Plan::new::<F, (T,)>(ctx, "transform_in_place", count, false);
    match plan.exec {
        Exec::Sequential => {
            for slot in data.iter_mut() {
                *slot = op.apply(slot);
            }
        }
        Exec::Naive { queue, width } => with_index_type!(width, I => kernels::naive_in_place(
            queue,
            plan.kernel,
            I::from_usize(count),
            data,
            op
        ))?,
        Exec::Batched { queue, width, tile } => with_index_type!(width, I => kernels::batched_in_place(
            queue,
            plan.kernel,
            I::from_usize(count),
            tile,
            data,
            op
        ))?,
    }
    plan.finish()
}

// ================================================================================================
// Binary
// ================================================================================================

/// `result[i] = op(first[i], second[i])` for `i < count`.
pub fn transform_binary<A, B, R, F>(
    ctx: &ExecutionContext,
    first: Seq<'_, A>,
    second: Seq<'_, B>,
    count: usize,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    A: Element,
    B: Element,
    R: Element,
    F: BinaryOp<A, B, Output = R>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "first input", count, first.space(), first.len())?;
    check_seq(ctx, "second input", count, second.space(), second.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform_binary", count = count);
    let first = &first.elements()[..count];
    let second = &second.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (A, B)>(ctx, "transform_binary", count, false);
    match plan.exec {
        Exec::Batched { queue, width, tile } => with_index_type!(width, I => kernels::batched_binary(
            queue,
            plan.kernel,
            I::from_usize(count),
            tile,
            first,
            second,
            op,
            result
        ))?,
        _ => plan.run_elementwise(result, |_| true, |i| op.combine(&first[i], &second[i]))?,
    }
    plan.finish()
}

/// `result[i] = op(first[i], second[i])` where `pred(first[i])`; other slots untouched.
pub fn transform_binary_if<A, B, R, F, P>(
    ctx: &ExecutionContext,
    first: Seq<'_, A>,
    second: Seq<'_, B>,
    count: usize,
    pred: &P,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    A: Element,
    B: Element,
    R: Element,
    F: BinaryOp<A, B, Output = R>,
    P: UnaryOp<A, Output = bool>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "first input", count, first.space(), first.len())?;
    check_seq(ctx, "second input", count, second.space(), second.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform_binary_if", count = count);
    let first = &first.elements()[..count];
    let second = &second.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (A, B)>(ctx, "transform_binary_if", count, true);
    plan.run_elementwise(
        result,
        |i| pred.apply(&first[i]),
        |i| op.combine(&first[i], &second[i]),
    )?;
    plan.finish()
}

/// `result[i] = op(first[i], second[i])` where `pred(stencil[i])`; other slots untouched.
#[allow(clippy::too_many_arguments)]
pub fn transform_binary_if_stencil<A, B, S, R, F, P>(
    ctx: &ExecutionContext,
    first: Seq<'_, A>,
    second: Seq<'_, B>,
    count: usize,
    stencil: Seq<'_, S>,
    pred: &P,
    op: &F,
    mut result: SeqMut<'_, R>,
) -> Result<usize>
where
    A: Element,
    B: Element,
    S: Element,
    R: Element,
    F: BinaryOp<A, B, Output = R>,
    P: UnaryOp<S, Output = bool>,
{
    if count == 0 {
        return Ok(0);
    }
    check_seq(ctx, "first input", count, first.space(), first.len())?;
    check_seq(ctx, "second input", count, second.space(), second.len())?;
    check_seq(ctx, "stencil", count, stencil.space(), stencil.len())?;
    check_seq(ctx, "result", count, result.space(), result.len())?;

    let _span = perf_span!("transform_binary_if_stencil", count = count);
    let first = &first.elements()[..count];
    let second = &second.elements()[..count];
    let stencil = &stencil.elements()[..count];
    let result = &mut result.elements_mut()[..count];

    let plan = Plan::new::<F, (A, B)>(ctx, "transform_binary_if_stencil", count, true);
    plan.run_elementwise(
        result,
        |i| pred.apply(&stencil[i]),
        |i| op.combine(&first[i], &second[i]),
    )?;
    plan.finish()
}
