//! Tracing subscriber setup shared by the binaries.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber.
///
/// Safe to call multiple times; only the first call takes effect. The
/// `RUST_LOG` environment variable overrides the default `info` level.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    });
}
