pub use tracing::{debug, error, info, warn, trace, instrument};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::{self, format::FmtSpan}};

const DEFAULT_DIRECTIVE: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn span_events(filter: &EnvFilter) -> FmtSpan {
    let is_debug = filter.to_string().contains("debug") ||
                   std::env::var("RUST_LOG").unwrap_or_default().contains("debug");
    if is_debug {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Installs the global subscriber. Panics if one is already set.
pub fn init() {
    if let Err(e) = try_init() {
        panic!("failed to install tracing subscriber: {e}");
    }
}

/// Installs the global subscriber, returning an error if one is already set.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = env_filter();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::uptime())
        .with_span_events(span_events(&env_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

/// Emits a verbose report line: `info` when `$verbose` is set, `debug` otherwise.
#[macro_export]
macro_rules! report {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}
