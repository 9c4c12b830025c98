//! Instrumentation macros.

/// Create a [`crate::performance::PerformanceSpan`], optionally attaching fields.
///
/// ```rust
/// use strata_tracing::perf_span;
///
/// let _span = perf_span!("transform", count = 1024, strategy = "batched");
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let span = $crate::performance::PerformanceSpan::new($name, None);
        {
            let _entered = span.enter();
            $crate::__private::tracing::debug!($($field = $value),+, "perf_span_start");
        }
        span
    }};
}

/// Emit a debug event tagged with `event = $name`.
///
/// ```rust
/// use strata_tracing::perf_event;
///
/// perf_event!("route_resolved", route = "host->device", count = 3);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::__private::tracing::debug!(
            event = $name,
            $($field = $value),+
        );
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn perf_span_with_and_without_fields() {
        let _plain = perf_span!("plain");
        let _fields = perf_span!("fields", count = 10, strategy = "naive");
    }

    #[test]
    fn perf_event_accepts_mixed_fields() {
        perf_event!("route_resolved", route = "device0->device1", count = 7);
    }
}
