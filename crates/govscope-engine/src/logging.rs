use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output settings for hosts embedding the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level for the `govscope` targets
    pub level: String,
    /// "full" or "compact"
    pub format: String,
    /// Extra per-target directives, e.g. `govscope_engine::cycle = "trace"`
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
            module_filters: BTreeMap::new(),
        }
    }
}

/// Install a global `tracing` subscriber. `RUST_LOG` takes precedence over `config.level`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if !matches!(config.format.as_str(), "full" | "compact") {
        return Err(AnalyticsError::InvalidConfiguration(format!(
            "unknown log format '{}', expected \"full\" or \"compact\"",
            config.format
        )));
    }

    let mut filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "govscope_engine={level},govscope_registry={level}",
            level = config.level
        )
    }));

    for (module, level) in &config.module_filters {
        let directive = format!("{}={}", module, level).parse().map_err(|e| {
            AnalyticsError::InvalidConfiguration(format!("bad log directive for {}: {}", module, e))
        })?;
        filter = filter.add_directive(directive);
    }

    let subscriber = tracing_subscriber::registry().with(filter);
    let show_location = matches!(config.level.as_str(), "debug" | "trace");

    let result = match config.format.as_str() {
        "compact" => subscriber
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        _ => subscriber
            .with(
                fmt::layer()
                    .with_target(show_location)
                    .with_line_number(show_location)
                    .with_file(show_location),
            )
            .try_init(),
    };

    result.map_err(|e| AnalyticsError::InvalidConfiguration(format!("logging init failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_directive_rejected() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("govscope_engine".to_string(), "verbose".to_string());
        assert!(matches!(
            init_logging(&config),
            Err(AnalyticsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert_eq!(LoggingConfig::default().format, "full");

        let config = LoggingConfig {
            format: "pretty".to_string(),
            ..LoggingConfig::default()
        };
        match init_logging(&config) {
            Err(AnalyticsError::InvalidConfiguration(msg)) => assert!(msg.contains("pretty")),
            other => panic!("expected InvalidConfiguration, got {:?}", other),
        }
    }
}
