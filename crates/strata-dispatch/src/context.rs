//! Execution contexts
//!
//! A context says where work runs: sequentially on the calling host thread,
//! or on a device queue. It is cheap to clone and immutable for a call.

use std::fmt;
use std::ptr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use strata_tracing::performance::record_transfer;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::space::Space;
use crate::stats::DispatchStats;

/// When device work is waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Synchronize after every launch and copy; faults surface at the call
    #[default]
    Blocking,
    /// Leave synchronization to the caller; faults surface at `synchronize()`
    Deferred,
}

impl FromStr for SyncPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "deferred" => Ok(Self::Deferred),
            other => Err(Error::invalid_config(format!(
                "unknown sync policy '{other}' (expected 'blocking' or 'deferred')"
            ))),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => f.write_str("blocking"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

/// Sequential execution on the calling thread
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    stats: Arc<DispatchStats>,
}

/// Execution on one device's queue
#[derive(Debug, Clone)]
pub struct DeviceContext {
    device: Arc<Device>,
    sync: SyncPolicy,
}

impl DeviceContext {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        self.sync
    }
}

/// Where a call executes
#[derive(Debug, Clone)]
pub enum ExecutionContext {
    Host(HostContext),
    Device(DeviceContext),
}

impl ExecutionContext {
    /// A fresh host context with its own counters
    pub fn host() -> Self {
        ExecutionContext::Host(HostContext::default())
    }

    /// Work on `device` with the device's configured sync policy
    pub fn device(device: &Arc<Device>) -> Self {
        ExecutionContext::Device(DeviceContext {
            device: Arc::clone(device),
            sync: device.config().default_sync,
        })
    }

    /// Work on `device`, synchronizing after every step
    pub fn device_blocking(device: &Arc<Device>) -> Self {
        Self::device(device).with_sync(SyncPolicy::Blocking)
    }

    /// Same context with a different sync policy; no effect on host contexts
    pub fn with_sync(self, sync: SyncPolicy) -> Self {
        match self {
            ExecutionContext::Device(ctx) => ExecutionContext::Device(DeviceContext { sync, ..ctx }),
            host => host,
        }
    }

    pub fn space(&self) -> Space {
        match self {
            ExecutionContext::Host(_) => Space::Host,
            ExecutionContext::Device(ctx) => ctx.device.space(),
        }
    }

    /// Whether the batched transform kernel is available here.
    ///
    /// Host contexts run everything as a sequential loop.
    pub fn supports_batched_dispatch(&self) -> bool {
        matches!(self, ExecutionContext::Device(_))
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        match self {
            ExecutionContext::Host(_) => SyncPolicy::Blocking,
            ExecutionContext::Device(ctx) => ctx.sync,
        }
    }

    pub fn device_handle(&self) -> Option<&Arc<Device>> {
        match self {
            ExecutionContext::Host(_) => None,
            ExecutionContext::Device(ctx) => Some(&ctx.device),
        }
    }

    /// Counters of the queue (or host) behind this context
    pub fn stats(&self) -> &Arc<DispatchStats> {
        match self {
            ExecutionContext::Host(ctx) => &ctx.stats,
            ExecutionContext::Device(ctx) => ctx.device.stats(),
        }
    }

    /// Wait for outstanding device work and report pending faults.
    pub fn synchronize(&self) -> Result<()> {
        match self {
            ExecutionContext::Host(_) => Ok(()),
            ExecutionContext::Device(ctx) => ctx.device.queue().synchronize(),
        }
    }

    /// Synchronize when the policy asks for it.
    pub(crate) fn complete(&self) -> Result<()> {
        match self.sync_policy() {
            SyncPolicy::Blocking => self.synchronize(),
            SyncPolicy::Deferred => Ok(()),
        }
    }

    /// Raw byte copy through this context's transport.
    ///
    /// # Safety
    ///
    /// Same contract as [`crate::device::DeviceQueue::copy_bytes`].
    pub(crate) unsafe fn copy_bytes(
        &self,
        src_space: Space,
        dst_space: Space,
        src: *const u8,
        dst: *mut u8,
        bytes: usize,
    ) -> Result<()> {
        match self {
            ExecutionContext::Device(ctx) => ctx.device.queue().copy_bytes(src_space, dst_space, src, dst, bytes),
            ExecutionContext::Host(ctx) => {
                let start = Instant::now();
                ptr::copy_nonoverlapping(src, dst, bytes);
                ctx.stats.record_bulk_copy(bytes);
                record_transfer(
                    bytes,
                    &format!("{src_space}->{dst_space}"),
                    start.elapsed().as_micros() as u64,
                );
                Ok(())
            }
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Host(_) => f.write_str("host"),
            ExecutionContext::Device(ctx) => write!(f, "{} ({})", ctx.device.id(), ctx.sync),
        }
    }
}
