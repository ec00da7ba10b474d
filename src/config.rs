//! Analysis configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for analysis runs and the resolver invocation.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use cpm_analyzer::config::AnalysisConfig;
///
/// let config = AnalysisConfig::from_json_str(r#"{ "cache_ttl_secs": 60 }"#).unwrap();
/// assert_eq!(config.cache_ttl().as_secs(), 60);
/// assert_eq!(config.list_cap, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// How long a full analysis result stays fresh.
    pub cache_ttl_secs: u64,

    /// Age after which the advisory database is reloaded in the background.
    pub advisory_staleness_secs: u64,

    /// Lists longer than this are truncated with an "and N more" entry.
    pub list_cap: usize,

    /// Named entries kept when a list is truncated.
    pub list_keep: usize,

    /// Top-level packages recorded as parents of a report-derived conflict.
    pub max_parent_names: usize,

    pub dotnet_path: PathBuf,

    pub max_concurrent_processes: usize,

    /// Lock artifact location, relative to each project directory.
    pub lock_file_path: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            advisory_staleness_secs: 3600,
            list_cap: 5,
            list_keep: 3,
            max_parent_names: 5,
            dotnet_path: PathBuf::from("dotnet"),
            max_concurrent_processes: 2,
            lock_file_path: PathBuf::from("obj/project.assets.json"),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn advisory_staleness(&self) -> Duration {
        Duration::from_secs(self.advisory_staleness_secs)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_advisory_staleness(mut self, staleness: Duration) -> Self {
        self.advisory_staleness_secs = staleness.as_secs();
        self
    }

    pub fn with_list_limits(mut self, cap: usize, keep: usize) -> Self {
        self.list_cap = cap;
        self.list_keep = keep;
        self
    }

    pub fn with_dotnet_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotnet_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.list_cap, 5);
        assert_eq!(config.list_keep, 3);
        assert_eq!(config.dotnet_path, PathBuf::from("dotnet"));
    }

    #[test]
    fn test_partial_json() {
        let config =
            AnalysisConfig::from_json_str(r#"{ "list_cap": 10, "dotnet_path": "/usr/share/dotnet/dotnet" }"#)
                .unwrap();
        assert_eq!(config.list_cap, 10);
        assert_eq!(config.list_keep, 3);
        assert_eq!(config.dotnet_path, PathBuf::from("/usr/share/dotnet/dotnet"));
        assert!(AnalysisConfig::from_json_str(r#"{ "list_cap": "ten" }"#).is_err());
    }

    #[test]
    fn test_builders() {
        let config = AnalysisConfig::default()
            .with_cache_ttl(Duration::from_secs(30))
            .with_list_limits(8, 4);
        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!((config.list_cap, config.list_keep), (8, 4));
    }
}
