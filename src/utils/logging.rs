use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Framework targets that are too chatty below `warn`
const NOISY_TARGETS: &[&str] = &["actix_server", "actix_http", "mio"];

/// Initialize the logger with the agent's line format.
///
/// `RUST_LOG` directives, when present, are applied after the base level so a
/// single module can be turned up without touching the rest.
pub fn init_logger(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level);

    if level < LevelFilter::Trace {
        for target in NOISY_TARGETS {
            builder.filter(Some(target), level.min(LevelFilter::Warn));
        }
    }

    if let Ok(directives) = std::env::var("RUST_LOG") {
        builder.parse_filters(&directives);
    }

    builder.init();
}

/// Get log level from string, defaulting to `info`
pub fn get_log_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}
