use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console logging plus daily-rotated JSON files under `logs/`.
///
/// `RUST_LOG` narrows or widens the filter; the crate itself defaults to
/// `info`.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "arcadia_sync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::from_default_env().add_directive("arcadia_sync=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().compact().with_writer(std::io::stdout))
        .init();

    // The appender guard must outlive the process or buffered lines are
    // dropped on exit.
    std::mem::forget(guard);
}
