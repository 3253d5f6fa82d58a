//! Structured JSON logging on stderr

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: [&str; 4] = ["livepip", "capture", "hotkey", "overlay"];

/// JSON logs on stderr. A non-empty `RUST_LOG` replaces the per-crate
/// defaults; `quiet` drops those defaults to errors only.
pub fn init_logging(quiet: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(build_filter(rust_log.as_deref(), quiet))
        .try_init();
}

fn build_filter(rust_log: Option<&str>, quiet: bool) -> EnvFilter {
    if let Some(directives) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("ignoring invalid {}: {e}", EnvFilter::DEFAULT_ENV),
        }
    }
    EnvFilter::new(default_directives(if quiet { "error" } else { "info" }))
}

fn default_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}
