//! Tracing/logging initialization.
//!
//! JSON lines by default; `LOG_FORMAT=pretty` switches to the human-readable
//! formatter for local runs. Filtering follows `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

/// Output format of the fmt subscriber.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything unrecognized means JSON.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "pretty" || v == "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .with_target(true)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_format() {
        assert_eq!(LogFormat::parse(None), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" Pretty ")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("xml")), LogFormat::Json);
    }

    #[test]
    fn init_twice_is_a_no_op() {
        init_with(LogFormat::Pretty);
        init_with(LogFormat::Json);
    }
}
