use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    time::Duration,
};

use crate::{error::WaylinkError, location::Location};

/// Filename appended to link bases that end in `/`.
pub const DEFAULT_FILENAME: &str = "way.xht";

/// Attribute carrying a waylink declaration (`[<base>]#<identifier>`).
pub const DEFAULT_LINK_ATTRIBUTE: &str = "data-waylink";

/// Attribute carrying an element's unique identifier.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayConfig {
    /// Base that root-relative link paths (a single leading `/`) are rewritten against.
    pub root_path: String,
    pub default_filename: String,
    pub link_attribute: String,
    pub id_attribute: String,
    /// Fetch budget for `file:` locations
    pub local_timeout_ms: u64,
    /// Fetch budget for every other scheme
    pub network_timeout_ms: u64,
    /// Maximum number of characters in a rendered link preview
    pub preview_length: usize,
}

impl Default for WayConfig {
    fn default() -> Self {
        WayConfig {
            root_path: String::default(),
            default_filename: DEFAULT_FILENAME.to_string(),
            link_attribute: DEFAULT_LINK_ATTRIBUTE.to_string(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            local_timeout_ms: 1_000,
            network_timeout_ms: 9_000,
            preview_length: 80,
        }
    }
}

impl WayConfig {
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Timeout budget for a fetch of `location`; shorter for local files.
    pub fn fetch_timeout(&self, location: &Location) -> Duration {
        if location.is_local() {
            Duration::from_millis(self.local_timeout_ms)
        } else {
            Duration::from_millis(self.network_timeout_ms)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn load(&self) -> Result<WayConfig, WaylinkError> {
        tracing::debug!("Attempting to read configuration from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(WayConfig::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn store(&self, config: &WayConfig) -> Result<(), WaylinkError> {
        tracing::debug!("Attempting to write configuration to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_log::test;

    #[test]
    fn test_missing_config_yields_defaults() {
        let dir = tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("waylink.toml"));
        assert_eq!(provider.load().unwrap(), WayConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waylink.toml");
        std::fs::write(&path, "root_path = \"file:///srv/way\"\nlocal_timeout_ms = 50\n").unwrap();
        let config = TomlConfigProvider::new(path).load().unwrap();
        assert_eq!(config.root_path, "file:///srv/way");
        assert_eq!(config.local_timeout_ms, 50);
        assert_eq!(config.default_filename, DEFAULT_FILENAME);
        assert_eq!(config.network_timeout_ms, 9_000);
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("waylink.toml"));
        let config = WayConfig::default().with_root_path("https://example.org/way");
        provider.store(&config).unwrap();
        assert_eq!(provider.load().unwrap(), config);
    }

    #[test]
    fn test_timeout_budget_by_scheme() {
        let config = WayConfig::default();
        let local = Location::parse("file:///srv/way.xht").unwrap();
        let remote = Location::parse("https://example.org/way.xht").unwrap();
        assert!(config.fetch_timeout(&local) < config.fetch_timeout(&remote));
    }

    #[test]
    fn test_malformed_config_is_a_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waylink.toml");
        std::fs::write(&path, "local_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(
            TomlConfigProvider::new(path).load(),
            Err(WaylinkError::Serialization(_))
        ));
    }
}
