// ENC - Edit-and-Continue Engine
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use enc_common::env::ENC_CONFIG;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: toml::de::Error,
    },
}

/// Logging settings applied by [`EngineConfig::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Component name used for the log directory.
    pub component: String,
    /// Whether logs are also written to rolling files.
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { component: "enc-engine".to_string(), file_logging: false }
    }
}

/// Configuration for the edit-and-continue engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Thread name of the symbol reader worker.
    pub reader_worker_name: String,
    /// Log per-session telemetry when sessions end.
    pub log_telemetry: bool,
    /// Report any change as rude while stopped at an unhandled exception.
    pub stopped_at_exception_is_rude: bool,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reader_worker_name: "enc-symbol-reader".to_string(),
            log_telemetry: true,
            stopped_at_exception_is_rude: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the symbol reader worker's thread name.
    pub fn with_reader_worker_name(mut self, name: impl Into<String>) -> Self {
        self.reader_worker_name = name.into();
        self
    }

    /// Enable or disable telemetry logging.
    pub fn with_log_telemetry(mut self, enabled: bool) -> Self {
        self.log_telemetry = enabled;
        self
    }

    /// Choose whether changes are rude while stopped at an unhandled exception.
    pub fn with_stopped_at_exception_is_rude(mut self, rude: bool) -> Self {
        self.stopped_at_exception_is_rude = rude;
        self
    }

    /// Set the logging settings.
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Default config file location: `$ENC_CONFIG`, else `<config_dir>/enc/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os(ENC_CONFIG)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("enc").join("config.toml")))
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        debug!("Loaded engine configuration from {:?}", path);
        Ok(config)
    }

    /// Load from [`default_path`](Self::default_path), falling back to defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Install the global tracing subscriber described by [`logging`](Self::logging).
    pub fn init_logging(&self) -> eyre::Result<()> {
        enc_common::logging::init_logging(&self.logging.component, self.logging.file_logging)
    }
}
