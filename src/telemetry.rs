//! Structured logging setup

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filter directive used when `RUST_LOG` is unset
pub fn default_filter(level: &str) -> String {
    format!("clearance_router={},tower_http=debug", level)
}

/// Install the global tracing subscriber
///
/// Only the first call in a process has any effect. `RUST_LOG` wins over
/// `default_level` when set.
///
/// ```no_run
/// clearance_router::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
