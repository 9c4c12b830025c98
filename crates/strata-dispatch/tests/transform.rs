//! Integration tests for the transform engine and its strategy choices

use std::sync::Arc;

use strata_dispatch::capability::builtin::{Identity, Negate, Plus};
use strata_dispatch::{
    allow_copied_arguments, dispatch, not_fn, transform, transform_binary, transform_binary_if,
    transform_binary_if_stencil, transform_if, transform_if_stencil, transform_in_place, Callable, Device,
    DeviceBuffer, DeviceId, DispatchConfig, ExecutionContext, OpCapabilities, Seq, SeqMut, SyncPolicy,
};

fn device_with(config: DispatchConfig) -> Arc<Device> {
    Device::new(DeviceId::new(0), config).unwrap()
}

fn small_device() -> Arc<Device> {
    device_with(DispatchConfig {
        block_size: 8,
        items_per_thread: 2,
        worker_threads: 2,
        ..DispatchConfig::default()
    })
}

fn unary_caps<F: Callable<(i32,)>>(_: &F) -> OpCapabilities {
    OpCapabilities::of::<F, (i32,)>()
}

#[test]
fn test_default_capability_queries_are_conservative() {
    let closure = |x: &i32| x + 1;
    let caps = unary_caps(&closure);
    assert!(!caps.can_copy_arguments);
    assert!(!caps.input_address_oblivious);

    // Built-ins are oblivious over primitives but still address-stable.
    let caps = unary_caps(&Negate);
    assert!(!caps.can_copy_arguments);
    assert!(caps.input_address_oblivious);

    let caps = unary_caps(&allow_copied_arguments(closure));
    assert!(caps.can_copy_arguments);
    assert!(caps.input_address_oblivious);

    let is_even = |x: &i32| x % 2 == 0;
    assert!(!unary_caps(&not_fn(is_even)).input_address_oblivious);
    assert!(unary_caps(&not_fn(allow_copied_arguments(is_even))).input_address_oblivious);
}

#[test]
fn test_identity_is_idempotent() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let data: Vec<i32> = (0..37).map(|i| i * 3 - 50).collect();

    let src = DeviceBuffer::from_host(&dev, &data)?;
    let mut once = DeviceBuffer::from_elem(&dev, 37, 0)?;
    let mut twice = DeviceBuffer::from_elem(&dev, 37, 0)?;
    transform(&ctx, src.as_seq(), 37, &Identity, once.as_seq_mut())?;
    transform(&ctx, once.as_seq(), 37, &allow_copied_arguments(Identity), twice.as_seq_mut())?;

    assert_eq!(once.to_host()?, data);
    assert_eq!(twice.to_host()?, data);

    let host = ExecutionContext::host();
    let mut out = vec![0; 37];
    transform(&host, Seq::from(&data), 37, &Identity, SeqMut::from(&mut out))?;
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn test_stencil_negates_even_positions() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let is_even = |x: &i32| x % 2 == 0;

    let input = DeviceBuffer::from_host(&dev, &[1, 2, 3, 4])?;
    let mut out = DeviceBuffer::from_elem(&dev, 4, 100)?;
    let end = transform_if_stencil(&ctx, input.as_seq(), 4, input.as_seq(), &is_even, &Negate, out.as_seq_mut())?;

    assert_eq!(end, 4);
    let out = out.to_host()?;
    assert_eq!(out[1], -2);
    assert_eq!(out[3], -4);
    // Skipped slots are left as they were.
    assert_eq!((out[0], out[2]), (100, 100));
    Ok(())
}

#[test]
fn test_plus_on_both_strategies() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let a = DeviceBuffer::from_host(&dev, &[1, 2, 3])?;
    let b = DeviceBuffer::from_host(&dev, &[10, 20, 30])?;

    let mut naive = DeviceBuffer::from_elem(&dev, 3, 0)?;
    let before = ctx.stats().snapshot();
    transform_binary(&ctx, a.as_seq(), b.as_seq(), 3, &Plus, naive.as_seq_mut())?;
    let delta = ctx.stats().snapshot().since(&before);
    assert_eq!((delta.naive_launches, delta.batched_launches), (1, 0));

    let mut batched = DeviceBuffer::from_elem(&dev, 3, 0)?;
    let before = ctx.stats().snapshot();
    transform_binary(&ctx, a.as_seq(), b.as_seq(), 3, &allow_copied_arguments(Plus), batched.as_seq_mut())?;
    let delta = ctx.stats().snapshot().since(&before);
    assert_eq!((delta.naive_launches, delta.batched_launches), (0, 1));

    assert_eq!(naive.to_host()?, vec![11, 22, 33]);
    assert_eq!(batched.to_host()?, vec![11, 22, 33]);
    Ok(())
}

#[test]
fn test_index_width_boundary() -> strata_dispatch::Result<()> {
    let dev = device_with(DispatchConfig {
        narrow_index_limit: 16,
        block_size: 4,
        worker_threads: 2,
        ..DispatchConfig::default()
    });
    let ctx = ExecutionContext::device(&dev);
    let square = allow_copied_arguments(|x: &u64| x * x);

    for (count, narrow, wide) in [(16usize, 1, 0), (17, 0, 1)] {
        let data: Vec<u64> = (0..count as u64).collect();
        let src = DeviceBuffer::from_host(&dev, &data)?;
        let mut out = DeviceBuffer::from_elem(&dev, count, 0u64)?;

        let before = ctx.stats().snapshot();
        transform(&ctx, src.as_seq(), count, &square, out.as_seq_mut())?;
        let delta = ctx.stats().snapshot().since(&before);

        assert_eq!((delta.index32_launches, delta.index64_launches), (narrow, wide));
        let expected: Vec<u64> = data.iter().map(|x| x * x).collect();
        assert_eq!(out.to_host()?, expected);
    }
    Ok(())
}

#[test]
fn test_address_dependent_callable_runs_on_original_elements() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let data: Vec<u64> = vec![0; 50];
    let src = DeviceBuffer::from_host(&dev, &data)?;
    let base = src.as_slice().as_ptr() as usize;

    // Recovers the element index from its address.
    let position = move |x: &u64| ((x as *const u64 as usize - base) / std::mem::size_of::<u64>()) as u64;

    let mut out = DeviceBuffer::from_elem(&dev, 50, u64::MAX)?;
    let before = ctx.stats().snapshot();
    transform(&ctx, src.as_seq(), 50, &position, out.as_seq_mut())?;

    assert_eq!(ctx.stats().snapshot().since(&before).naive_launches, 1);
    assert_eq!(out.to_host()?, (0..50).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn test_predicate_without_stencil_tests_the_input() -> strata_dispatch::Result<()> {
    let host = ExecutionContext::host();
    let input = vec![5, -3, 8, -1];
    let positive = |x: &i32| *x > 0;
    let mut out = vec![0; 4];
    transform_if(&host, Seq::from(&input), 4, &positive, &|x: &i32| x * 10, SeqMut::from(&mut out))?;
    assert_eq!(out, vec![50, 0, 80, 0]);

    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let a = DeviceBuffer::from_host(&dev, &input)?;
    let b = DeviceBuffer::from_host(&dev, &[1, 1, 1, 1])?;
    let mut sum = DeviceBuffer::from_elem(&dev, 4, 0)?;
    transform_binary_if(&ctx, a.as_seq(), b.as_seq(), 4, &positive, &Plus, sum.as_seq_mut())?;
    assert_eq!(sum.to_host()?, vec![6, 0, 9, 0]);
    Ok(())
}

#[test]
fn test_binary_stencil_on_host_and_device_agree() -> strata_dispatch::Result<()> {
    let a: Vec<i64> = (0..40).collect();
    let b: Vec<i64> = (0..40).map(|i| 100 - i).collect();
    let mask: Vec<bool> = (0..40).map(|i| i % 3 == 0).collect();
    let keep = |m: &bool| *m;
    let minus = |x: &i64, y: &i64| x - y;

    let host = ExecutionContext::host();
    let mut host_out = vec![-1i64; 40];
    transform_binary_if_stencil(
        &host,
        Seq::from(&a),
        Seq::from(&b),
        40,
        Seq::from(&mask),
        &keep,
        &minus,
        SeqMut::from(&mut host_out),
    )?;

    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let da = DeviceBuffer::from_host(&dev, &a)?;
    let db = DeviceBuffer::from_host(&dev, &b)?;
    let dm = DeviceBuffer::from_host(&dev, &mask)?;
    let mut dev_out = DeviceBuffer::from_elem(&dev, 40, -1i64)?;
    transform_binary_if_stencil(&ctx, da.as_seq(), db.as_seq(), 40, dm.as_seq(), &keep, &minus, dev_out.as_seq_mut())?;

    assert_eq!(dev_out.to_host()?, host_out);
    assert_eq!(host_out[3], 3 - 97);
    assert_eq!(host_out[4], -1);
    Ok(())
}

#[test]
fn test_in_place_transform() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let ctx = ExecutionContext::device(&dev);
    let mut buf = DeviceBuffer::from_host(&dev, &[1.5f32, -2.0, 4.25])?;
    transform_in_place(&ctx, buf.as_seq_mut(), 3, &Negate)?;
    assert_eq!(buf.to_pod_vec()?, vec![-1.5, 2.0, -4.25]);
    Ok(())
}

#[test]
fn test_cross_context_transform_with_host_inputs() -> strata_dispatch::Result<()> {
    let dev = small_device();
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);

    let words = vec!["tea".to_string(), "coffee".to_string(), "mate".to_string()];
    let mut lengths = DeviceBuffer::from_elem(&dev, 3, 0usize)?;
    let len = |s: &String| s.len();
    dispatch::transform(&host, &ctx, Seq::from(&words), 3, &len, lengths.as_seq_mut())?;
    assert_eq!(lengths.to_host()?, vec![3, 6, 4]);

    let mut back = vec![0usize; 3];
    let double = allow_copied_arguments(|n: &usize| n * 2);
    dispatch::transform(&ctx, &host, lengths.as_seq(), 3, &double, SeqMut::from(&mut back))?;
    assert_eq!(back, vec![6, 12, 8]);
    Ok(())
}

#[test]
fn test_cross_device_stencil_transform() -> strata_dispatch::Result<()> {
    let config = DispatchConfig {
        worker_threads: 2,
        default_sync: SyncPolicy::Deferred,
        ..DispatchConfig::default()
    };
    let d0 = Device::new(DeviceId::new(0), config.clone())?;
    let d1 = Device::new(DeviceId::new(1), config)?;
    let c0 = ExecutionContext::device(&d0);
    let c1 = ExecutionContext::device(&d1);
    let is_even = |x: &i32| x % 2 == 0;

    let input = DeviceBuffer::from_host(&d0, &[1, 2, 3, 4])?;
    let mut out = DeviceBuffer::from_elem(&d1, 4, 9)?;
    let end = dispatch::transform_if_stencil(
        &c0,
        &c1,
        input.as_seq(),
        4,
        input.as_seq(),
        &is_even,
        &Negate,
        out.as_seq_mut(),
    )?;
    c0.synchronize()?;
    c1.synchronize()?;

    assert_eq!(end, 4);
    assert_eq!(out.to_host()?, vec![9, -2, 9, -4]);
    assert_eq!(input.to_host()?, vec![1, 2, 3, 4]);
    Ok(())
}
