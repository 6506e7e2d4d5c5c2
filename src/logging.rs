// src/logging.rs

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Initialise the global logger for binaries.
///
/// `level` ("info", "debug", ...) wins over `RUST_LOG`; default is info.
/// Safe to call more than once: later calls are ignored.
pub fn init_logging(level: Option<&str>) {
    let log_level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info);

    let result = Builder::new()
        .filter_level(log_level)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{:5} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if result.is_ok() {
        log::debug!("logging initialised at {}", log_level);
    }
}
