//! Shared tracing configuration for the strata workspace.
//!
//! Binaries, benches and integration tests install their `tracing` subscriber
//! through this crate so that dispatch decisions (relocation strategy, kernel
//! strategy, index width) show up with the same field names everywhere.
//!
//! ```rust
//! use strata_tracing::{build_subscriber, TracingConfig};
//!
//! let config = TracingConfig::for_ci();
//! let _subscriber = build_subscriber(&config).expect("valid default directives");
//! ```

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;

pub use tracing::{debug, error, info, trace, warn};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Environment variable selecting a preset (`local`, `ci`, `profiling`).
pub const ENV_PROFILE: &str = "STRATA_TRACING_PROFILE";
/// Environment variable overriding the filter directives.
pub const ENV_DIRECTIVES: &str = "STRATA_TRACING_DIRECTIVES";
/// Environment variable selecting the output format (`pretty`, `compact`, `json`).
pub const ENV_FORMAT: &str = "STRATA_TRACING_FORMAT";
/// Environment variable setting the minimum duration (µs) a perf span must take to be logged.
pub const ENV_PERF_THRESHOLD_US: &str = "STRATA_PERF_THRESHOLD_US";

/// How the shared subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives (e.g. `strata_dispatch=debug`). Falls back to
    /// `RUST_LOG`, then to [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    /// Directive used when nothing else resolves.
    pub default_directive: String,
    /// Include event targets (module paths) in output.
    pub include_targets: bool,
    /// ANSI colours.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    /// Formatter layer output.
    pub output: TracingOutput,
    /// Minimum perf span duration in microseconds; `None` logs every span.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for working on the dispatcher locally.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            performance_threshold_us: None,
        }
    }

    /// JSON without colour codes, for CI log collection.
    pub fn for_ci() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: false,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Json,
            performance_threshold_us: None,
        }
    }

    /// Debug-level dispatch decisions plus span close events with timings.
    pub fn for_profiling() -> Self {
        Self {
            directives: Some("strata_dispatch=debug,strata_tracing=debug".to_string()),
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: false,
            span_events: FmtSpan::CLOSE,
            output: TracingOutput::Json,
            performance_threshold_us: None,
        }
    }

    /// Build a configuration from the `STRATA_*` environment variables.
    pub fn from_env() -> Self {
        let profile = env::var(ENV_PROFILE)
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "profiling" => Self::for_profiling(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var(ENV_DIRECTIVES) {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Ok(format) = env::var(ENV_FORMAT) {
            if let Some(parsed) = TracingOutput::from_env_value(&format) {
                config.output = parsed;
                if config.output == TracingOutput::Json {
                    config.ansi = false;
                }
            }
        }

        if let Ok(threshold) = env::var(ENV_PERF_THRESHOLD_US) {
            if let Ok(threshold_us) = threshold.trim().parse::<u64>() {
                config.performance_threshold_us = Some(threshold_us);
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Errors raised while installing the shared subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    /// The directive string could not be parsed.
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),
    /// A global subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Build a subscriber from `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.resolve_filter()?;
    Ok(Registry::default().with(format_layer(config)).with(filter))
}

fn format_layer(config: &TracingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = config.span_events.clone();
    match config.output {
        TracingOutput::Compact => Box::new(
            tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Pretty => Box::new(
            tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_ansi(false)
                .with_span_events(span_events),
        ),
    }
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    Ok(())
}

/// Best-effort installation for tests and benches; a second call is a no-op.
pub fn init_for_tests() {
    let config = TracingConfig {
        ansi: false,
        output: TracingOutput::Compact,
        ..TracingConfig::from_env()
    };
    let _ = init_global_tracing(&config);
}

/// Output format for the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}
