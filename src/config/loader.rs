//! Configuration loader

use super::{Config, ConfigError};
use std::path::Path;
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Read configuration file");
        Self::load_from_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn load_from_str(content: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
