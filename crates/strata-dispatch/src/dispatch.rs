//! Route table and cross-context entry points
//!
//! A pair of execution contexts maps to exactly one [`Route`]. Cross-space
//! routes move data through the relocation engine; same-space routes copy
//! locally or run the transform engine directly.
//!
//! The cross-context transforms run in the context that can batch (the
//! device side of a host/device pair). Inputs or results living elsewhere are
//! relocated through a device temporary first. The temporary result is seeded
//! with the current result contents, so slots a predicate skips keep their
//! values.

use std::fmt;

use strata_tracing::perf_event;
use tracing::debug;

use crate::capability::{BinaryOp, Element, UnaryOp};
use crate::context::ExecutionContext;
use crate::device::DeviceBuffer;
use crate::error::{ensure_len, ensure_space, Error, Result};
use crate::relocate::{owning_context, relocate_n, select_strategy};
use crate::sequence::{Seq, SeqMut};
use crate::space::Space;
use crate::transform as engine;

/// Concrete path between a source and a destination space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    /// Both ends on the same device
    DeviceLocal,
    /// Two different devices
    DeviceToDevice,
}

impl Route {
    pub const fn resolve(src: Space, dst: Space) -> Self {
        match (src, dst) {
            (Space::Host, Space::Host) => Route::HostToHost,
            (Space::Host, Space::Device(_)) => Route::HostToDevice,
            (Space::Device(_), Space::Host) => Route::DeviceToHost,
            (Space::Device(a), Space::Device(b)) => {
                if a.ordinal() == b.ordinal() {
                    Route::DeviceLocal
                } else {
                    Route::DeviceToDevice
                }
            }
        }
    }

    /// Whether data must leave its space to follow this route
    pub const fn crosses_spaces(self) -> bool {
        matches!(self, Route::HostToDevice | Route::DeviceToHost | Route::DeviceToDevice)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Route::HostToHost => "host->host",
            Route::HostToDevice => "host->device",
            Route::DeviceToHost => "device->host",
            Route::DeviceLocal => "device-local",
            Route::DeviceToDevice => "device->device",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy the first `n` elements of `src` over `dst` along the resolved route.
pub fn copy_n<T: Element>(
    ctx_src: &ExecutionContext,
    ctx_dst: &ExecutionContext,
    src: Seq<'_, T>,
    n: usize,
    dst: SeqMut<'_, T>,
) -> Result<usize> {
    let route = Route::resolve(ctx_src.space(), ctx_dst.space());
    debug!(
        route = route.as_str(),
        count = n,
        strategy = select_strategy::<T>(ctx_src.space(), ctx_dst.space()).as_str(),
        "copy_n"
    );
    relocate_n(ctx_src, ctx_dst, src, n, dst)
}

// ================================================================================================
// Operands
// ================================================================================================

/// An input as seen from the executing context
enum Operand<'a, T: Element> {
    Borrowed(Seq<'a, T>),
    Relocated(DeviceBuffer<T>),
}

impl<'a, T: Element> Operand<'a, T> {
    fn prepare(
        ctx: &ExecutionContext,
        exec: &ExecutionContext,
        role: &'static str,
        src: Seq<'a, T>,
        count: usize,
    ) -> Result<Self> {
        ensure_space(ctx.space(), src.space())?;
        ensure_len(role, count, src.len())?;

        if src.space() == exec.space() {
            return Ok(Operand::Borrowed(src));
        }
        let device = exec.device_handle().ok_or(Error::SpaceMismatch {
            expected: exec.space(),
            actual: src.space(),
        })?;
        let buffer = DeviceBuffer::relocated(ctx, &src.elements()[..count], device)?;
        Ok(Operand::Relocated(buffer))
    }

    fn seq(&self) -> Seq<'_, T> {
        match self {
            Operand::Borrowed(seq) => *seq,
            Operand::Relocated(buffer) => buffer.as_seq(),
        }
    }
}

/// Run `body` against a result view in the executing context, then move the
/// values back when the result lives elsewhere.
fn with_result<R, B>(
    ctx_out: &ExecutionContext,
    exec: &ExecutionContext,
    count: usize,
    mut result: SeqMut<'_, R>,
    body: B,
) -> Result<usize>
where
    R: Element,
    B: FnOnce(SeqMut<'_, R>) -> Result<usize>,
{
    ensure_space(ctx_out.space(), result.space())?;
    ensure_len("result", count, result.len())?;

    if result.space() == exec.space() {
        return body(result);
    }

    let device = exec.device_handle().ok_or(Error::SpaceMismatch {
        expected: exec.space(),
        actual: result.space(),
    })?;
    let mut staged = DeviceBuffer::relocated(ctx_out, &result.as_seq().elements()[..count], device)?;
    let written = body(staged.as_seq_mut())?;
    // The values are about to leave the device.
    exec.synchronize()?;
    relocate_n(exec, ctx_out, staged.as_seq(), written, result.reborrow())
}

fn trace_route(
    kind: &'static str,
    ctx_in: &ExecutionContext,
    ctx_out: &ExecutionContext,
    exec: &ExecutionContext,
    count: usize,
) {
    let route = Route::resolve(ctx_in.space(), ctx_out.space());
    perf_event!(
        "route_resolved",
        kind = kind,
        route = route.as_str(),
        exec = tracing::field::display(exec),
        count = count,
    );
}

// ================================================================================================
// Cross-context Transforms
// ================================================================================================

/// [`engine::transform`] with the input in `ctx_in` and the result in `ctx_out`.
pub fn transform<T, R, F>(
    ctx_in: &ExecutionContext,
    ctx_out: &ExecutionContext,
    input: Seq<'_, T>,
    count: usize,
    op: &F,
    result: SeqMut<'_, R>,
) -> Result<usize>
where
    T: Element,
    R: Element,
    F: UnaryOp<T, Output = R>,
{
    if count == 0 {
        return Ok(0);
    }
    let exec = owning_context(ctx_in, ctx_out);
    trace_route("unary", ctx_in, ctx_out, exec, count);

    let input = Operand::prepare(ctx_in, exec, "input", input, count)?;
    with_result(ctx_out, exec, count, result, |out| {
        engine::transform(exec, input.seq(), count, op, out)
    })
}

/// [`engine::transform_binary`] with both inputs in `ctx_in` and the result in `ctx_out`.
pub fn transform_binary<A, B, R, F>(
    ctx_in: &ExecutionContext,
    ctx_out: &ExecutionContext,
    first: Seq<'_, A>,
    second: Seq<'_, B>,
    count: usize,
    op: &F,
    result: SeqMut<'_, R>,
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
    let exec = owning_context(ctx_in, ctx_out);
    trace_route("binary", ctx_in, ctx_out, exec, count);

    let first = Operand::prepare(ctx_in, exec, "first input", first, count)?;
    let second = Operand::prepare(ctx_in, exec, "second input", second, count)?;
    with_result(ctx_out, exec, count, result, |out| {
        engine::transform_binary(exec, first.seq(), second.seq(), count, op, out)
    })
}

/// [`engine::transform_if_stencil`] with input and stencil in `ctx_in`.
#[allow(clippy::too_many_arguments)]
pub fn transform_if_stencil<T, S, R, F, P>(
    ctx_in: &ExecutionContext,
    ctx_out: &ExecutionContext,
    input: Seq<'_, T>,
    count: usize,
    stencil: Seq<'_, S>,
    pred: &P,
    op: &F,
    result: SeqMut<'_, R>,
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
    let exec = owning_context(ctx_in, ctx_out);
    trace_route("unary_stencil", ctx_in, ctx_out, exec, count);

    let input = Operand::prepare(ctx_in, exec, "input", input, count)?;
    let stencil = Operand::prepare(ctx_in, exec, "stencil", stencil, count)?;
    with_result(ctx_out, exec, count, result, |out| {
        engine::transform_if_stencil(exec, input.seq(), count, stencil.seq(), pred, op, out)
    })
}

/// [`engine::transform_binary_if_stencil`] with inputs and stencil in `ctx_in`.
#[allow(clippy::too_many_arguments)]
pub fn transform_binary_if_stencil<A, B, S, R, F, P>(
    ctx_in: &ExecutionContext,
    ctx_out: &ExecutionContext,
    first: Seq<'_, A>,
    second: Seq<'_, B>,
    count: usize,
    stencil: Seq<'_, S>,
    pred: &P,
    op: &F,
    result: SeqMut<'_, R>,
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
    let exec = owning_context(ctx_in, ctx_out);
    trace_route("binary_stencil", ctx_in, ctx_out, exec, count);

    let first = Operand::prepare(ctx_in, exec, "first input", first, count)?;
    let second = Operand::prepare(ctx_in, exec, "second input", second, count)?;
    let stencil = Operand::prepare(ctx_in, exec, "stencil", stencil, count)?;
    with_result(ctx_out, exec, count, result, |out| {
        engine::transform_binary_if_stencil(exec, first.seq(), second.seq(), count, stencil.seq(), pred, op, out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::builtin::Negate;
    use crate::device::Device;
    use crate::space::DeviceId;

    #[test]
    fn route_table_is_complete() {
        let d0 = Space::Device(DeviceId::new(0));
        let d1 = Space::Device(DeviceId::new(1));
        assert_eq!(Route::resolve(Space::Host, Space::Host), Route::HostToHost);
        assert_eq!(Route::resolve(Space::Host, d0), Route::HostToDevice);
        assert_eq!(Route::resolve(d1, Space::Host), Route::DeviceToHost);
        assert_eq!(Route::resolve(d0, d0), Route::DeviceLocal);
        assert_eq!(Route::resolve(d0, d1), Route::DeviceToDevice);

        assert!(!Route::HostToHost.crosses_spaces());
        assert!(!Route::DeviceLocal.crosses_spaces());
        assert!(Route::DeviceToDevice.crosses_spaces());
        assert_eq!(Route::HostToDevice.to_string(), "host->device");
    }

    #[test]
    fn host_input_device_output() -> Result<()> {
        let dev = Device::with_defaults(DeviceId::new(0))?;
        let host = ExecutionContext::host();
        let ctx = ExecutionContext::device(&dev);

        let input = vec![1, 2, 3];
        let mut out = DeviceBuffer::from_elem(&dev, 3, 0)?;
        let end = transform(&host, &ctx, Seq::from(&input), 3, &Negate, out.as_seq_mut())?;
        assert_eq!(end, 3);
        assert_eq!(out.to_host()?, vec![-1, -2, -3]);
        Ok(())
    }

    #[test]
    fn device_input_host_output_keeps_skipped_slots() -> Result<()> {
        let dev = Device::with_defaults(DeviceId::new(0))?;
        let host = ExecutionContext::host();
        let ctx = ExecutionContext::device(&dev);

        let input = DeviceBuffer::from_host(&dev, &[1, 2, 3, 4])?;
        let mut out = vec![7, 7, 7, 7];
        let even = |x: &i32| x % 2 == 0;
        transform_if_stencil(&ctx, &host, input.as_seq(), 4, input.as_seq(), &even, &Negate, SeqMut::from(&mut out))?;
        assert_eq!(out, vec![7, -2, 7, -4]);
        Ok(())
    }

    #[test]
    fn both_host_runs_sequentially() -> Result<()> {
        let host = ExecutionContext::host();
        let a = [1, 2, 3];
        let b = [10, 20, 30];
        let mut out = [0; 3];
        let plus = |x: &i32, y: &i32| x + y;
        transform_binary(&host, &host, Seq::Host(&a[..]), Seq::Host(&b[..]), 3, &plus, SeqMut::Host(&mut out[..]))?;
        assert_eq!(out, [11, 22, 33]);
        assert_eq!(host.stats().snapshot().sequential_runs, 1);
        Ok(())
    }
}
