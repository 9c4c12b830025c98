//! Timing spans and structured events for dispatch instrumentation.
//!
//! Every event carries an `event` field so log processors can group them
//! without parsing messages:
//!
//! | event       | emitted by                                  |
//! |-------------|---------------------------------------------|
//! | `transfer`  | bulk byte copies between spaces             |
//! | `staging`   | staging buffer allocation and release       |
//! | `launch`    | kernel launches (strategy + index width)    |
//!
//! ```rust
//! use strata_tracing::performance::{record_transfer, PerformanceSpan};
//!
//! let span = PerformanceSpan::new("relocate_n", Some(100));
//! record_transfer(4096, "host->device0", span.elapsed_us());
//! drop(span);
//! ```

use std::time::Instant;
use tracing::Level;

/// RAII timer: logs its duration on drop when it meets the threshold.
pub struct PerformanceSpan {
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Start timing `span_name`; `threshold_us = None` always logs.
    pub fn new(span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, span_name, threshold_us)
    }

    /// Start timing at an explicit level.
    pub fn with_level(level: Level, span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let span_name = span_name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %span_name),
            Level::DEBUG => tracing::debug_span!("perf", name = %span_name),
            Level::INFO => tracing::info_span!("perf", name = %span_name),
            Level::WARN => tracing::warn_span!("perf", name = %span_name),
            Level::ERROR => tracing::error_span!("perf", name = %span_name),
        };

        Self {
            threshold_us,
            start_time: Instant::now(),
            span,
        }
    }

    /// Microseconds since the span was created.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    /// Enter the underlying tracing span.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Whether a span of `elapsed_us` would be logged.
    pub fn should_log(&self, elapsed_us: u64) -> bool {
        self.threshold_us.is_none_or(|t| elapsed_us >= t)
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.should_log(elapsed_us) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Bandwidth in MiB/s, zero for instantaneous transfers.
pub fn bandwidth_mib_per_sec(bytes: usize, duration_us: u64) -> f64 {
    if duration_us == 0 {
        return 0.0;
    }
    (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
}

/// Record a bulk byte copy. `route` is a short label such as `host->device0`.
pub fn record_transfer(bytes: usize, route: &str, duration_us: u64) {
    tracing::debug!(
        event = "transfer",
        bytes = bytes,
        route = route,
        duration_us = duration_us,
        bandwidth_mib_s = bandwidth_mib_per_sec(bytes, duration_us),
        "bulk_copy"
    );
}

/// Record a staging buffer allocation (`released = false`) or release.
pub fn record_staging(space: &str, elements: usize, bytes: usize, released: bool) {
    tracing::debug!(
        event = "staging",
        space = space,
        elements = elements,
        bytes = bytes,
        released = released,
        "staging_buffer"
    );
}

/// Record a kernel launch with the strategy and index width that were selected.
pub fn record_launch(kernel: &str, strategy: &str, index_bits: u32, count: u64, duration_us: u64) {
    let elements_per_sec = if duration_us > 0 {
        (count as f64 / duration_us as f64) * 1_000_000.0
    } else {
        0.0
    };

    tracing::debug!(
        event = "launch",
        kernel = kernel,
        strategy = strategy,
        index_bits = index_bits,
        count = count,
        duration_us = duration_us,
        elements_per_sec = elements_per_sec,
        "kernel_launch"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn span_threshold_filters() {
        let always = PerformanceSpan::new("always", None);
        assert!(always.should_log(0));

        let gated = PerformanceSpan::new("gated", Some(1_000));
        assert!(!gated.should_log(999));
        assert!(gated.should_log(1_000));
    }

    #[test]
    fn span_measures_elapsed_time() {
        let span = PerformanceSpan::with_level(Level::INFO, "sleep", None);
        thread::sleep(Duration::from_millis(5));
        assert!(span.elapsed_us() >= 5_000);
    }

    #[test]
    fn bandwidth_of_one_mib_per_ms() {
        let bw = bandwidth_mib_per_sec(1024 * 1024, 1_000);
        assert!((bw - 1000.0).abs() < 0.01);
        assert_eq!(bandwidth_mib_per_sec(4096, 0), 0.0);
    }

    #[test]
    fn record_helpers_without_subscriber() {
        record_transfer(4096, "host->device0", 12);
        record_staging("device0", 16, 128, false);
        record_launch("transform_unary", "batched", 32, 1024, 40);
    }
}
