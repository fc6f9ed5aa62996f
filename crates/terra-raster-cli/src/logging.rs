use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Filter used when `RUST_LOG` is unset or invalid
const DEFAULT_FILTER: &str = "info,hyper_util=warn,reqwest=warn";

/// Install a stderr log layer filtered by `RUST_LOG`.
///
/// Logs go to stderr so command results on stdout stay pipeable. With the
/// `profiling` feature, `profiling` scopes are emitted as tracing spans and
/// show up here at trace level.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized");
}
