//! Configuration management.
//!
//! Configuration is read from `config.toml` in the platform config directory
//! (falling back to `~/.config/atomio/`), then overridden by `ATOMIO_*`
//! environment variables.

use crate::io::fetch::DEFAULT_PREFIX_BYTES;
use crate::observability::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for atomio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomioConfig {
    /// Bytes sampled from a file for format detection.
    pub detection_prefix_bytes: usize,
    /// Worker threads of the background executor.
    pub background_threads: usize,
    /// Whether loading a trajectory resizes the animation interval.
    pub adjust_animation_interval: bool,
    /// Timeout for fetching `http`/`https` locations; 0 disables it.
    pub remote_timeout_secs: u64,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
    /// Filter directive, e.g. `atomio=debug`.
    pub level: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Detection prefix size.
    pub detection_prefix_bytes: Option<usize>,
    /// Background thread count.
    pub background_threads: Option<usize>,
    /// Animation interval adjustment.
    pub adjust_animation_interval: Option<bool>,
    /// Remote fetch timeout in seconds.
    pub remote_timeout_secs: Option<u64>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
    /// Filter directive.
    pub level: Option<String>,
}

impl Default for AtomioConfig {
    fn default() -> Self {
        Self {
            detection_prefix_bytes: DEFAULT_PREFIX_BYTES,
            background_threads: 2,
            adjust_animation_interval: true,
            remote_timeout_secs: 30,
            logging: LoggingSettings::default(),
        }
    }
}

impl AtomioConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| crate::Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/atomio/` on macOS)
    /// 2. XDG config dir (`~/.config/atomio/`)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("atomio").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("atomio")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Ignoring config file"),
            }
        }

        Self::default()
    }

    /// Applies `ATOMIO_*` environment overrides.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(bytes) = parse_env::<usize>("ATOMIO_DETECTION_PREFIX_BYTES") {
            self.detection_prefix_bytes = bytes;
        }
        if let Some(threads) = parse_env::<usize>("ATOMIO_BACKGROUND_THREADS") {
            self.background_threads = threads;
        }
        if let Some(secs) = parse_env::<u64>("ATOMIO_REMOTE_TIMEOUT_SECS") {
            self.remote_timeout_secs = secs;
        }
        if let Some(format) = parse_string_env("ATOMIO_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format);
        }
        if let Some(file) = parse_string_env("ATOMIO_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        self
    }

    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(bytes) = file.detection_prefix_bytes {
            config.detection_prefix_bytes = bytes;
        }
        if let Some(threads) = file.background_threads {
            config.background_threads = threads;
        }
        if let Some(adjust) = file.adjust_animation_interval {
            config.adjust_animation_interval = adjust;
        }
        if let Some(secs) = file.remote_timeout_secs {
            config.remote_timeout_secs = secs;
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.file = logging.file.map(PathBuf::from);
            config.logging.level = logging.level;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    parse_string_env(key).and_then(|value| value.parse().ok())
}

fn parse_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
