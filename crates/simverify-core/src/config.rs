//! Verification target configuration.
//!
//! Every identifier and path the checks depend on lives in [`VerifyConfig`]:
//! the simulator UDID, the app's bundle id, where the model assets are, where
//! the built app is, and the timing knobs. Values come from
//! `~/.simverify/config.json` or a file given on the command line; missing
//! fields fall back to the defaults for the NimbleEdgeAssistant app.
//!
//! # Example
//!
//! ```no_run
//! use simverify_core::config::VerifyConfig;
//!
//! // Load (returns defaults if the file doesn't exist)
//! let config = VerifyConfig::load();
//! println!("Checking {} on {}", config.bundle_id, config.simulator_id);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILENAME: &str = "config.json";

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Returns `~/.simverify`, or `None` if the home directory is unknown.
pub fn simverify_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".simverify"))
}

/// Settings for one verification target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// UDID of the simulator to verify against.
    pub simulator_id: String,
    /// Bundle identifier of the app under test.
    pub bundle_id: String,
    /// Name of the `.app` bundle and of the running process.
    pub app_name: String,
    /// Directory holding the source model assets.
    pub assets_dir: PathBuf,
    /// Asset file names expected inside [`Self::assets_dir`], in check order.
    pub asset_files: Vec<String>,
    /// Models directory relative to the root of the built `.app`.
    pub bundled_models_subdir: PathBuf,
    /// Built `.app` location. When unset it is discovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_path: Option<PathBuf>,
    /// Xcode DerivedData root searched during discovery. Defaults to
    /// `~/Library/Developer/Xcode/DerivedData`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_data_dir: Option<PathBuf>,
    pub command_timeout_secs: u64,
    /// Fixed wait after a successful boot.
    pub boot_settle_ms: u64,
    /// Upper bound on how long to watch for the launched process.
    pub launch_settle_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            simulator_id: "0A6913C4-12DB-4112-AA76-B9E0753ED305".to_string(),
            bundle_id: "ai.delite.NimbleEdgeAssistant".to_string(),
            app_name: "NimbleEdgeAssistant".to_string(),
            assets_dir: PathBuf::from("NimbleEdgeAssistant.app/NimbleEdgeAssistant/Models/llama3"),
            asset_files: ["model", "tokenizer", "config", "vocab", "merges"]
                .into_iter()
                .map(String::from)
                .collect(),
            bundled_models_subdir: PathBuf::from("Models/llama3"),
            app_path: None,
            derived_data_dir: None,
            command_timeout_secs: 30,
            boot_settle_ms: 3000,
            launch_settle_ms: 5000,
            poll_interval_ms: 500,
        }
    }
}

impl VerifyConfig {
    /// Default config file location, `~/.simverify/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        simverify_dir().map(|dir| dir.join(CONFIG_FILENAME))
    }

    /// Load config from `~/.simverify/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::default_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load config from an explicit path. Unlike [`Self::load`], a missing or
    /// malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Full paths of the expected source asset files, in check order.
    pub fn asset_paths(&self) -> Vec<PathBuf> {
        self.asset_files
            .iter()
            .map(|name| self.assets_dir.join(name))
            .collect()
    }

    /// DerivedData root to search, if one is configured or can be derived
    /// from the home directory.
    pub fn derived_data_dir(&self) -> Option<PathBuf> {
        self.derived_data_dir.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join("Library/Developer/Xcode/DerivedData"))
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn boot_settle(&self) -> Duration {
        Duration::from_millis(self.boot_settle_ms)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
