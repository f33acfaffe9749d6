//! Tracing subscriber setup for the CLI.

use std::sync::Once;

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `--log-level` is not given.
pub const ENV_LOG_LEVEL: &str = "PATCHDIFF_LOG_LEVEL";

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter directive: the flag, then `PATCHDIFF_LOG_LEVEL`, then `info`.
pub fn resolve_filter(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var(ENV_LOG_LEVEL).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber, writing to stderr. Later calls are ignored.
pub fn init_tracing(level: Option<&str>, format: LogFormat) {
    INIT.call_once(|| {
        let directive = resolve_filter(level);
        let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);
        match format {
            LogFormat::Text => {
                registry.with(fmt::layer().with_writer(std::io::stderr).with_target(false)).init()
            }
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(true))
                .init(),
        }
    });
}
