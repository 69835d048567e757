//! Launcher defaults file.
//!
//! A `jboltctl.toml` supplies VM option defaults that command line options
//! override. The `[vm]` table uses the VM's own option names:
//!
//! ```toml
//! [vm]
//! UseJBolt = true
//! JBoltRescheduling = "07:30,19:30"
//!
//! [log]
//! json = false
//! ```
//!
//! When the file has no `[vm]` table the `JBOLT_*` environment variables
//! provide the defaults instead.

use std::path::{Path, PathBuf};

use dirs::{config_dir, home_dir};
use jbolt::VmOptions;
use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "jboltctl.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// VM option defaults
    #[serde(default = "VmOptions::from_env")]
    pub vm: VmOptions,

    #[serde(default)]
    pub log: LogConfig,
}

/// Rendering of forwarded JBolt events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Emit each event as a JSON object
    #[serde(default)]
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vm: VmOptions::from_env(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Searches the current directory, then `~/.config/jboltctl`, then the
    /// system configuration directory. Returns the defaults when no file is
    /// found.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LauncherError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| LauncherError::Config(format!("Failed to parse configuration: {}", e)))?;

        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            LauncherError::Config(format!("Failed to serialize configuration: {}", e))
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    fn find_config_file() -> Option<PathBuf> {
        let current = PathBuf::from(CONFIG_FILE_NAME);
        if current.exists() {
            return Some(current);
        }
        home_dir()
            .map(|dir| dir.join(".config").join("jboltctl").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
            .or_else(|| {
                config_dir()
                    .map(|dir| dir.join("jboltctl").join(CONFIG_FILE_NAME))
                    .filter(|path| path.exists())
            })
    }
}
