//! Benchmarks for transform strategies and relocation paths
//!
//! Compares the naive and batched device kernels against the sequential host
//! loop, and the trivial byte copy against the staged relocation path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_dispatch::capability::builtin::Plus;
use strata_dispatch::{
    allow_copied_arguments, relocate_n, transform_binary, Device, DeviceBuffer, DeviceId, ExecutionContext, Seq,
    SeqMut,
};

fn benchmark_transform_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_binary_f32");
    let device = Device::with_defaults(DeviceId::new(0)).unwrap();
    let ctx = ExecutionContext::device(&device);
    let host = ExecutionContext::host();

    for size in [1024usize, 16 * 1024, 256 * 1024].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        let a_host: Vec<f32> = (0..*size).map(|i| i as f32).collect();
        let b_host: Vec<f32> = (0..*size).map(|i| (i as f32) * 2.0).collect();
        let a = DeviceBuffer::from_host(&device, &a_host).unwrap();
        let b = DeviceBuffer::from_host(&device, &b_host).unwrap();

        // Sequential (host context)
        group.bench_with_input(BenchmarkId::new("sequential", size), size, |bencher, &size| {
            let mut out = vec![0.0f32; size];
            bencher.iter(|| {
                transform_binary(&host, Seq::from(&a_host), Seq::from(&b_host), size, &Plus, SeqMut::from(&mut out))
                    .unwrap();
                black_box(&out);
            });
        });

        // Naive kernel (address-stable op)
        group.bench_with_input(BenchmarkId::new("naive", size), size, |bencher, &size| {
            let mut out = DeviceBuffer::from_elem(&device, size, 0.0f32).unwrap();
            bencher.iter(|| {
                transform_binary(&ctx, a.as_seq(), b.as_seq(), size, &Plus, out.as_seq_mut()).unwrap();
            });
        });

        // Batched kernel (op may run on copies)
        group.bench_with_input(BenchmarkId::new("batched", size), size, |bencher, &size| {
            let plus = allow_copied_arguments(Plus);
            let mut out = DeviceBuffer::from_elem(&device, size, 0.0f32).unwrap();
            bencher.iter(|| {
                transform_binary(&ctx, a.as_seq(), b.as_seq(), size, &plus, out.as_seq_mut()).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_relocation_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("relocate_host_to_device");
    let device = Device::with_defaults(DeviceId::new(0)).unwrap();
    let ctx = ExecutionContext::device(&device);
    let host = ExecutionContext::host();

    for size in [256usize, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        // Trivial path: one bulk byte copy
        group.bench_with_input(BenchmarkId::new("trivial_u64", size), size, |bencher, &size| {
            let src: Vec<u64> = (0..size as u64).collect();
            let mut dst = DeviceBuffer::from_elem(&device, size, 0u64).unwrap();
            bencher.iter(|| {
                relocate_n(&host, &ctx, Seq::from(&src), size, dst.as_seq_mut()).unwrap();
            });
        });

        // Staged path: construct, copy, assign, destroy
        group.bench_with_input(BenchmarkId::new("staged_string", size), size, |bencher, &size| {
            let src: Vec<String> = (0..size).map(|i| i.to_string()).collect();
            let mut dst = DeviceBuffer::from_elem(&device, size, String::new()).unwrap();
            bencher.iter(|| {
                relocate_n(&host, &ctx, Seq::from(&src), size, dst.as_seq_mut()).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_transform_strategies, benchmark_relocation_paths);
criterion_main!(benches);
