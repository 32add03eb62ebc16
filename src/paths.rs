//! XDG-compliant path resolution for the advisor.

use std::path::PathBuf;

use crate::error::ConfigError;

const APP_DIR: &str = "intent-advisor";

/// Global XDG directories for the advisor.
#[derive(Debug, Clone)]
pub struct AdvisorPaths {
    /// `$XDG_CONFIG_HOME/intent-advisor/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/intent-advisor/`
    pub data_dir: PathBuf,
}

impl AdvisorPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(APP_DIR);

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Path to the default config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default directory of the embedded fact store.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}
