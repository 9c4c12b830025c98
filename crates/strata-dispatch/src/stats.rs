//! Dispatch counters
//!
//! Every device queue owns one [`DispatchStats`]; host contexts own their own.
//! The relocation and transform engines bump these as they pick strategies,
//! which makes the decisions observable from tests without parsing logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::transform::{IndexWidth, KernelStrategy};

/// Live counters, updated with relaxed atomics
#[derive(Debug, Default)]
pub struct DispatchStats {
    bulk_copies: AtomicU64,
    bytes_copied: AtomicU64,
    staging_allocations: AtomicU64,
    staged_constructed: AtomicU64,
    staged_destroyed: AtomicU64,
    local_copies: AtomicU64,
    naive_launches: AtomicU64,
    batched_launches: AtomicU64,
    sequential_runs: AtomicU64,
    index32_launches: AtomicU64,
    index64_launches: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bulk_copies: u64,
    pub bytes_copied: u64,
    pub staging_allocations: u64,
    pub staged_constructed: u64,
    pub staged_destroyed: u64,
    pub local_copies: u64,
    pub naive_launches: u64,
    pub batched_launches: u64,
    pub sequential_runs: u64,
    pub index32_launches: u64,
    pub index64_launches: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_bulk_copy(&self, bytes: usize) {
        self.bulk_copies.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_staging_allocation(&self) {
        self.staging_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_staged_constructed(&self, n: usize) {
        self.staged_constructed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_staged_destroyed(&self, n: usize) {
        self.staged_destroyed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_local_copy(&self) {
        self.local_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_launch(&self, strategy: KernelStrategy, width: Option<IndexWidth>) {
        let counter = match strategy {
            KernelStrategy::Naive => &self.naive_launches,
            KernelStrategy::Batched => &self.batched_launches,
            KernelStrategy::Sequential => &self.sequential_runs,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match width {
            Some(IndexWidth::Narrow) => {
                self.index32_launches.fetch_add(1, Ordering::Relaxed);
            }
            Some(IndexWidth::Wide) => {
                self.index64_launches.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bulk_copies: self.bulk_copies.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            staging_allocations: self.staging_allocations.load(Ordering::Relaxed),
            staged_constructed: self.staged_constructed.load(Ordering::Relaxed),
            staged_destroyed: self.staged_destroyed.load(Ordering::Relaxed),
            local_copies: self.local_copies.load(Ordering::Relaxed),
            naive_launches: self.naive_launches.load(Ordering::Relaxed),
            batched_launches: self.batched_launches.load(Ordering::Relaxed),
            sequential_runs: self.sequential_runs.load(Ordering::Relaxed),
            index32_launches: self.index32_launches.load(Ordering::Relaxed),
            index64_launches: self.index64_launches.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Counter-wise difference `self - earlier`, saturating at zero
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            bulk_copies: self.bulk_copies.saturating_sub(earlier.bulk_copies),
            bytes_copied: self.bytes_copied.saturating_sub(earlier.bytes_copied),
            staging_allocations: self.staging_allocations.saturating_sub(earlier.staging_allocations),
            staged_constructed: self.staged_constructed.saturating_sub(earlier.staged_constructed),
            staged_destroyed: self.staged_destroyed.saturating_sub(earlier.staged_destroyed),
            local_copies: self.local_copies.saturating_sub(earlier.local_copies),
            naive_launches: self.naive_launches.saturating_sub(earlier.naive_launches),
            batched_launches: self.batched_launches.saturating_sub(earlier.batched_launches),
            sequential_runs: self.sequential_runs.saturating_sub(earlier.sequential_runs),
            index32_launches: self.index32_launches.saturating_sub(earlier.index32_launches),
            index64_launches: self.index64_launches.saturating_sub(earlier.index64_launches),
        }
    }

    /// Total kernel launches across strategies (sequential host runs excluded)
    pub fn kernel_launches(&self) -> u64 {
        self.naive_launches + self.batched_launches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launches_are_counted_by_strategy_and_width() {
        let stats = DispatchStats::new();
        stats.record_launch(KernelStrategy::Batched, Some(IndexWidth::Narrow));
        stats.record_launch(KernelStrategy::Naive, Some(IndexWidth::Wide));
        stats.record_launch(KernelStrategy::Sequential, None);

        let snap = stats.snapshot();
        assert_eq!(snap.batched_launches, 1);
        assert_eq!(snap.naive_launches, 1);
        assert_eq!(snap.sequential_runs, 1);
        assert_eq!(snap.index32_launches, 1);
        assert_eq!(snap.index64_launches, 1);
        assert_eq!(snap.kernel_launches(), 2);
    }

    #[test]
    fn since_reports_deltas() {
        let stats = DispatchStats::new();
        stats.record_bulk_copy(64);
        let before = stats.snapshot();

        stats.record_bulk_copy(128);
        stats.record_staging_allocation();
        let delta = stats.snapshot().since(&before);

        assert_eq!(delta.bulk_copies, 1);
        assert_eq!(delta.bytes_copied, 128);
        assert_eq!(delta.staging_allocations, 1);
        assert_eq!(delta.local_copies, 0);
    }
}
