//! Integration tests for transport faults and synchronization policy

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_dispatch::capability::builtin::Negate;
use strata_dispatch::{
    relocate_n, transform, Device, DeviceBuffer, DeviceId, DispatchConfig, Error, ExecutionContext, Fault,
    QueueStatus, Seq, SeqMut, SyncPolicy,
};

fn device(sync: SyncPolicy) -> Arc<Device> {
    let config = DispatchConfig {
        worker_threads: 2,
        default_sync: sync,
        ..DispatchConfig::default()
    };
    Device::new(DeviceId::new(0), config).unwrap()
}

fn strings(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("item-{i}")).collect()
}

#[derive(Debug, Default)]
struct Ledger {
    attempts: AtomicUsize,
    made: AtomicUsize,
    drops: AtomicUsize,
    // 1-based clone attempt that panics, 0 for never
    fail_at: AtomicUsize,
}

impl Ledger {
    fn arm(&self, nth_from_now: usize) {
        let attempts = self.attempts.load(Ordering::SeqCst);
        self.fail_at.store(attempts + nth_from_now, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.fail_at.store(0, Ordering::SeqCst);
    }

    fn made(&self) -> usize {
        self.made.load(Ordering::SeqCst)
    }

    fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Element whose clone can be made to panic
#[derive(Debug)]
struct Fragile {
    value: u32,
    ledger: Arc<Ledger>,
}

impl Clone for Fragile {
    fn clone(&self) -> Self {
        let nth = self.ledger.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if nth == self.ledger.fail_at.load(Ordering::SeqCst) {
            panic!("clone {nth} of {} failed", self.value);
        }
        self.ledger.made.fetch_add(1, Ordering::SeqCst);
        Self {
            value: self.value,
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl Drop for Fragile {
    fn drop(&mut self) {
        self.ledger.drops.fetch_add(1, Ordering::SeqCst);
    }
}

strata_dispatch::staged_element!(Fragile);

fn fragile(n: usize, ledger: &Arc<Ledger>) -> Vec<Fragile> {
    (0..n as u32)
        .map(|value| Fragile {
            value,
            ledger: Arc::clone(ledger),
        })
        .collect()
}

fn values(items: &[Fragile]) -> Vec<u32> {
    items.iter().map(|f| f.value).collect()
}

fn is_execution_fault(err: &Error) -> bool {
    matches!(
        err,
        Error::Transport {
            status: QueueStatus::ExecutionFault,
            ..
        }
    )
}

#[test]
fn test_copy_fault_releases_staging() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);

    let src = strings(6);
    let mut dst = DeviceBuffer::from_elem(&dev, 6, String::new())?;
    let live = dev.live_allocations();
    let used = dev.used_bytes();
    let before = ctx.stats().snapshot();

    dev.inject_fault(Fault::CopyFailed);
    let err = relocate_n(&host, &ctx, Seq::from(&src), 6, dst.as_seq_mut()).unwrap_err();

    assert!(matches!(
        err,
        Error::Transport {
            status: QueueStatus::CopyFault,
            ..
        }
    ));
    assert_eq!(dev.live_allocations(), live);
    assert_eq!(dev.used_bytes(), used);

    let delta = ctx.stats().snapshot().since(&before);
    assert_eq!(delta.staging_allocations, 2);
    assert_eq!(delta.staged_constructed, 6);
    assert_eq!(delta.staged_destroyed, 6);

    // The destination is intact and the queue is usable again.
    assert_eq!(dst.to_host()?, vec![String::new(); 6]);
    relocate_n(&host, &ctx, Seq::from(&src), 6, dst.as_seq_mut())?;
    assert_eq!(dst.to_host()?, src);
    Ok(())
}

#[test]
fn test_allocation_fault_aborts_staging() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);

    let src = strings(3);
    let mut dst = DeviceBuffer::from_elem(&dev, 3, String::new())?;
    let live = dev.live_allocations();
    let before = ctx.stats().snapshot();

    dev.inject_fault(Fault::OutOfMemory);
    let err = relocate_n(&host, &ctx, Seq::from(&src), 3, dst.as_seq_mut()).unwrap_err();

    assert!(matches!(err, Error::OutOfMemory { .. }));
    assert_eq!(dev.live_allocations(), live);
    let delta = ctx.stats().snapshot().since(&before);
    assert_eq!(delta.staged_constructed, delta.staged_destroyed);
    Ok(())
}

#[test]
fn test_blocking_context_reports_execution_fault_at_the_call() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let ctx = ExecutionContext::device(&dev);
    let src = DeviceBuffer::from_host(&dev, &[1, 2, 3])?;
    let mut out = DeviceBuffer::from_elem(&dev, 3, 0)?;

    dev.inject_fault(Fault::ExecutionFault);
    let err = transform(&ctx, src.as_seq(), 3, &Negate, out.as_seq_mut()).unwrap_err();
    assert!(err.is_transport());
    assert!(!dev.queue().has_pending_error());
    Ok(())
}

#[test]
fn test_deferred_context_reports_execution_fault_at_synchronize() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Deferred);
    let ctx = ExecutionContext::device(&dev);
    assert_eq!(ctx.sync_policy(), SyncPolicy::Deferred);

    let src = DeviceBuffer::from_host(&dev, &[1, 2, 3])?;
    let mut out = DeviceBuffer::from_elem(&dev, 3, 0)?;

    dev.inject_fault(Fault::ExecutionFault);
    let end = transform(&ctx, src.as_seq(), 3, &Negate, out.as_seq_mut())?;
    assert_eq!(end, 3);
    assert!(dev.queue().has_pending_error());

    let err = ctx.synchronize().unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            status: QueueStatus::ExecutionFault,
            ..
        }
    ));
    // Reported once.
    ctx.synchronize()?;

    transform(&ctx, src.as_seq(), 3, &Negate, out.as_seq_mut())?;
    ctx.synchronize()?;
    assert_eq!(out.to_host()?, vec![-1, -2, -3]);
    Ok(())
}

#[test]
fn test_rejected_launch_fails_immediately() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Deferred);
    let ctx = ExecutionContext::device(&dev);
    let src = DeviceBuffer::from_host(&dev, &[1, 2, 3])?;
    let mut out = DeviceBuffer::from_elem(&dev, 3, 0)?;

    dev.inject_fault(Fault::LaunchRejected);
    let err = transform(&ctx, src.as_seq(), 3, &Negate, out.as_seq_mut()).unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            status: QueueStatus::LaunchFailure,
            ..
        }
    ));
    assert_eq!(out.to_host()?, vec![0, 0, 0]);
    Ok(())
}

#[test]
fn test_panicking_kernel_becomes_a_fault() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let ctx = ExecutionContext::device(&dev);
    let src = DeviceBuffer::from_host(&dev, &[1u32, 0, 2])?;
    let mut out = DeviceBuffer::from_elem(&dev, 3, 0u32)?;

    let invert = |x: &u32| 100 / *x;
    let err = transform(&ctx, src.as_seq(), 3, &invert, out.as_seq_mut()).unwrap_err();
    assert!(matches!(
        err,
        Error::Transport {
            status: QueueStatus::ExecutionFault,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_panicking_clone_drops_partial_device_construction() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);
    let ledger = Arc::new(Ledger::default());

    let src = DeviceBuffer::from_host(&dev, &fragile(8, &ledger))?;
    let mut dst = fragile(8, &ledger);
    let live = dev.live_allocations();
    let (made, drops) = (ledger.made(), ledger.drops());

    ledger.arm(3);
    let err = relocate_n(&ctx, &host, src.as_seq(), 8, SeqMut::from(&mut dst)).unwrap_err();
    ledger.disarm();

    assert!(is_execution_fault(&err));
    // Every clone that completed in the staging kernel was dropped again.
    assert_eq!(ledger.made() - made, ledger.drops() - drops);
    assert_eq!(dev.live_allocations(), live);
    assert!(!dev.queue().has_pending_error());
    assert_eq!(values(&dst), (0..8).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_panicking_clone_drops_partial_fill() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let ledger = Arc::new(Ledger::default());
    let seed = Fragile {
        value: 7,
        ledger: Arc::clone(&ledger),
    };
    let live = dev.live_allocations();

    ledger.arm(5);
    let err = DeviceBuffer::from_elem(&dev, 8, seed.clone()).err();
    ledger.disarm();

    assert!(err.as_ref().is_some_and(is_execution_fault));
    // Every completed lane and the moved-in value were dropped; only the seed is left.
    assert_eq!(ledger.made(), ledger.drops());
    assert_eq!(dev.live_allocations(), live);
    drop(seed);
    assert_eq!(ledger.made() + 1, ledger.drops());
    Ok(())
}

#[test]
fn test_panicking_clone_on_host_unwinds_staging() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Blocking);
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);
    let ledger = Arc::new(Ledger::default());

    let src = fragile(6, &ledger);
    let mut dst = DeviceBuffer::from_host(&dev, &fragile(6, &ledger))?;
    let live = dev.live_allocations();
    let (made, drops) = (ledger.made(), ledger.drops());

    // The source stage is built by a host loop, so the panic reaches the caller.
    ledger.arm(4);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        relocate_n(&host, &ctx, Seq::from(&src), 6, dst.as_seq_mut())
    }));
    ledger.disarm();

    assert!(outcome.is_err());
    assert_eq!(ledger.made() - made, ledger.drops() - drops);
    assert_eq!(dev.live_allocations(), live);
    assert_eq!(values(&dst.to_host()?), (0..6).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_execution_fault_in_staging_kernel_releases_staging() -> strata_dispatch::Result<()> {
    let dev = device(SyncPolicy::Deferred);
    let host = ExecutionContext::host();
    let ctx = ExecutionContext::device(&dev);

    let src = DeviceBuffer::from_host(&dev, &strings(5))?;
    let mut dst = vec![String::new(); 5];
    let live = dev.live_allocations();
    let before = ctx.stats().snapshot();

    dev.inject_fault(Fault::ExecutionFault);
    let err = relocate_n(&ctx, &host, src.as_seq(), 5, SeqMut::from(&mut dst)).unwrap_err();

    // Staging kernels are waited for even under a deferred policy.
    assert!(is_execution_fault(&err));
    assert!(!dev.queue().has_pending_error());
    assert_eq!(dev.live_allocations(), live);
    let delta = ctx.stats().snapshot().since(&before);
    assert_eq!(delta.staged_constructed, delta.staged_destroyed);
    assert_eq!(dst, vec![String::new(); 5]);

    relocate_n(&ctx, &host, src.as_seq(), 5, SeqMut::from(&mut dst))?;
    assert_eq!(dst, strings(5));
    Ok(())
}

#[test]
fn test_panicking_clone_while_unstaging_releases_staging() -> strata_dispatch::Result<()> {
    let d0 = device(SyncPolicy::Blocking);
    let d1 = Device::new(DeviceId::new(1), d0.config().clone())?;
    let c0 = ExecutionContext::device(&d0);
    let c1 = ExecutionContext::device(&d1);
    let ledger = Arc::new(Ledger::default());

    let src = DeviceBuffer::from_host(&d0, &fragile(4, &ledger))?;
    let mut dst = DeviceBuffer::from_host(&d1, &fragile(4, &ledger))?;
    let live = (d0.live_allocations(), d1.live_allocations());
    // Cross-device staging is counted on the source device.
    let before = c0.stats().snapshot();

    // Four clones build the source stage on d0; the sixth is the second
    // assignment of the unstaging kernel on d1.
    ledger.arm(6);
    let err = relocate_n(&c0, &c1, src.as_seq(), 4, dst.as_seq_mut()).unwrap_err();
    ledger.disarm();

    assert!(is_execution_fault(&err));
    assert_eq!((d0.live_allocations(), d1.live_allocations()), live);
    let delta = c0.stats().snapshot().since(&before);
    assert_eq!(delta.staged_constructed, 4);
    assert_eq!(delta.staged_destroyed, 4);
    Ok(())
}
