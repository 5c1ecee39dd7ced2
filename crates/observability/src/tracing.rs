//! Tracing/logging initialization.
//!
//! `RUST_LOG` wins over the configured default filter. `TRUSTGATE_LOG_FORMAT`
//! selects `json` (default) or `pretty` output.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(format) = lookup("TRUSTGATE_LOG_FORMAT").as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }
        if let Some(filter) = lookup("TRUSTGATE_LOG_FILTER").filter(|f| !f.trim().is_empty()) {
            config.default_filter = filter;
        }
        config
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_with(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let _ = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_at_info() {
        let config = ObservabilityConfig::from_lookup(|_| None);
        assert_eq!(config, ObservabilityConfig::default());
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn reads_format_and_filter() {
        let config = ObservabilityConfig::from_lookup(|key| match key {
            "TRUSTGATE_LOG_FORMAT" => Some("Pretty".into()),
            "TRUSTGATE_LOG_FILTER" => Some("trustgate_engine=debug".into()),
            _ => None,
        });
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_filter, "trustgate_engine=debug");
    }

    #[test]
    fn unknown_format_keeps_default() {
        let config = ObservabilityConfig::from_lookup(|key| {
            (key == "TRUSTGATE_LOG_FORMAT").then(|| "xml".to_string())
        });
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn init_twice_is_harmless() {
        init_with(&ObservabilityConfig::default());
        init_with(&ObservabilityConfig::default());
    }
}
