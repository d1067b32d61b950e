//! Test logging helpers shared by FKH crates.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `debug` so failing tests show the
/// engine's decisions.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true))
            .with(filter)
            .try_init();
    });
}
