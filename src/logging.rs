use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use crate::config::{FleetConfig, DEFAULT_LOG_FILTER};

/// Install the JSON tracing subscriber using the `FLEET_LOG` filter.
pub fn init_logging() {
    init_logging_with_filter(&FleetConfig::from_env().log_filter);
}

/// Logs go to stderr so stdout stays free for command output.
pub fn init_logging_with_filter(filter: &str) {
    let _ = tracing_log::LogTracer::init();

    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter {filter:?}: {err}");
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .finish();
    // `try_init` would install a second `LogTracer` and bail out; set the
    // dispatcher directly instead.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
