use govscope_registry::{Address, RegistryError};
use thiserror::Error;

/// Analytics operation result type
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Analytics engine errors
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid range [{start}, {end}]: {reason}")]
    InvalidRange { start: u64, end: u64, reason: String },

    /// The graph around `node` is too large to analyse online. This means "unknown",
    /// not "no cycle".
    #[error("Delegation graph around {node} too complex for online analysis: ~{estimated} edges (threshold {threshold})")]
    TooComplex {
        node: Address,
        estimated: u64,
        threshold: u64,
    },

    #[error("Registry unavailable: {0} registry not configured")]
    RegistryUnavailable(&'static str),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub(crate) fn invalid_range(start: u64, end: u64, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            start,
            end,
            reason: reason.into(),
        }
    }
}
