/*!
 * Structured Tracing
 * Subscriber setup shared by the demo binary and embedders
 *
 * IPC and wait paths emit `tracing` events; scheduler configuration paths use
 * `log` macros, which reach the same subscriber through the tracing-log bridge
 * installed by `try_init`.
 */

use tracing::{debug, info};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info,rt_nucleus::sync=warn";

/// Install the global subscriber
///
/// Environment variables:
/// - RUST_LOG: filter directives (default: `DEFAULT_FILTER`)
/// - RT_NUCLEUS_TRACE_JSON: `1` or `true` selects JSON lines
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = json_requested();
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_thread_names(true)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    match installed {
        Ok(()) => info!(json, "Nucleus tracing initialized"),
        Err(err) => debug!("Tracing subscriber already installed: {}", err),
    }
}

fn json_requested() -> bool {
    std::env::var("RT_NUCLEUS_TRACE_JSON")
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false)
}
