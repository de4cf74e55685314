// src/logging.rs
//! tracing subscriber setup for the binary and for embedding applications

use tracing_subscriber::{fmt, EnvFilter};

/// Crate-specific override checked after `RUST_LOG`
pub const LOG_ENV: &str = "GPS_SESSION_LOG";

/// Filter directives: `RUST_LOG`, then [`LOG_ENV`], then `default_level`
/// for this crate only.
pub fn filter_directives(default_level: &str) -> String {
    std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), default_level))
}

/// Install a stderr fmt subscriber.
///
/// Returns false if a global subscriber was already set.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_new(filter_directives(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init("debug");
        assert!(!init("debug"));
    }
}
