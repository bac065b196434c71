use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Default maximum delegation chain depth
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Traversal and window caps for the analytics engine
///
/// Every walk the engine performs is bounded by one of these, so the worst-case
/// cost of a query is fixed up front regardless of registry size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum delegation chain depth (used when the token registry reports none)
    pub max_depth: u32,
    /// Estimated edge count above which cycle analysis refuses to decide
    pub complexity_threshold: u64,
    /// Hard cap on nodes visited by a single subtree walk
    pub max_subtree_nodes: usize,
    /// Maximum voters sampled by the behavior analyzer
    pub max_candidates: usize,
    /// Maximum proposal ids scanned by one windowed aggregation
    pub max_window: u64,
    /// Hop limit per root when auditing the whole graph for loops
    pub loop_scan_max_hops: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            complexity_threshold: 10_000,
            max_subtree_nodes: 10_000,
            max_candidates: 100,
            max_window: 100,
            loop_scan_max_hops: 64,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, then apply `GOVSCOPE_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            path = %path.display(),
            max_depth = config.max_depth,
            max_window = config.max_window,
            "⚙️ Engine configuration loaded"
        );
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_override("GOVSCOPE_MAX_DEPTH")? {
            self.max_depth = v;
        }
        if let Some(v) = env_override("GOVSCOPE_COMPLEXITY_THRESHOLD")? {
            self.complexity_threshold = v;
        }
        if let Some(v) = env_override("GOVSCOPE_MAX_SUBTREE_NODES")? {
            self.max_subtree_nodes = v;
        }
        if let Some(v) = env_override("GOVSCOPE_MAX_CANDIDATES")? {
            self.max_candidates = v;
        }
        if let Some(v) = env_override("GOVSCOPE_MAX_WINDOW")? {
            self.max_window = v;
        }
        if let Some(v) = env_override("GOVSCOPE_LOOP_SCAN_MAX_HOPS")? {
            self.loop_scan_max_hops = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(AnalyticsError::InvalidConfiguration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_subtree_nodes == 0 {
            return Err(AnalyticsError::InvalidConfiguration(
                "max_subtree_nodes must be at least 1".to_string(),
            ));
        }
        if self.max_window == 0 {
            return Err(AnalyticsError::InvalidConfiguration(
                "max_window must be at least 1".to_string(),
            ));
        }
        if self.loop_scan_max_hops < self.max_depth as usize {
            return Err(AnalyticsError::InvalidConfiguration(format!(
                "loop_scan_max_hops ({}) must be >= max_depth ({})",
                self.loop_scan_max_hops, self.max_depth
            )));
        }
        Ok(())
    }

    /// Reject reversed windows and windows wider than `max_window`
    pub fn check_window(&self, start_id: u64, end_id: u64) -> Result<()> {
        if start_id > end_id {
            return Err(AnalyticsError::invalid_range(
                start_id,
                end_id,
                "start must not exceed end",
            ));
        }
        let width = (end_id - start_id).saturating_add(1);
        if width > self.max_window {
            return Err(AnalyticsError::invalid_range(
                start_id,
                end_id,
                format!("window of {} ids exceeds cap of {}", width, self.max_window),
            ));
        }
        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw.trim().parse::<T>().map_err(|_| {
                AnalyticsError::InvalidConfiguration(format!("{} has invalid value {:?}", key, raw))
            })?;
            debug!(key, value = %raw, "Config override from environment");
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
