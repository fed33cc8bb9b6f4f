use std::env::var;
use std::str::FromStr;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl LogFormat {
    /// Resolve the format from the `--json-output` flag, falling back to
    /// `RUST_LOG_FORMAT`
    pub fn resolve(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }

        var("RUST_LOG_FORMAT")
            .ok()
            .and_then(|raw| {
                raw.parse()
                    .inspect_err(|error| {
                        eprintln!("Ignoring RUST_LOG_FORMAT, falling back to compact: {error}")
                    })
                    .ok()
            })
            .unwrap_or_default()
    }
}

pub fn init_tracing(format: LogFormat) {
    initialize_tracing(LevelFilter::INFO, format);
}

/// Initialize tracing subscriber with the given default level and format.
fn initialize_tracing(level: LevelFilter, format: LogFormat) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => {
            tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed()
        }
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        warn!("Tracing subscriber already initialized, keeping the existing one");
    }
}
