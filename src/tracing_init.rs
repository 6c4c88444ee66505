//! Tracing initialization, modeled on the teacher's `knhk-cli/src/tracing.rs`
//! `KNHK_TRACE` lookup, renamed to this crate's `PYPLYN_LOG` convention.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let level = std::env::var("PYPLYN_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::new(level);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
