use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install the process-wide JSON subscriber on stdout, filtered by `RUST_LOG`.
///
/// A second call is a no-op. Audit events arrive under the `audit` target, so
/// `RUST_LOG=info,audit=off` silences them without touching the rest.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with(fmt::layer().json().with_current_span(false))
        .try_init();
}

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
