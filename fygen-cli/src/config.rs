//! Configuration file support for fygen.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (FYGEN_*)
//! 3. Local config file (./fygen.toml)
//! 4. Global config file (~/.config/fygen/config.toml)

use crate::CliError;
use directories::ProjectDirs;
use fygen::{SessionConfig, UploadConfig};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
const LOCAL_CONFIG: &str = "fygen.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Command timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    /// Delay after every command, in milliseconds.
    pub pacing_ms: Option<u64>,
    /// Reply timeout, in milliseconds.
    pub reply_timeout_ms: Option<u64>,
}

/// Upload defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSection {
    /// Default target bank.
    pub bank: Option<u8>,
    /// Payload bytes per paced write.
    pub chunk_size: Option<usize>,
    /// Check the device's acknowledgements.
    pub verify_acks: Option<bool>,
}

/// Measurement defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasureSection {
    /// Poll interval, in milliseconds.
    pub interval_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Command timing.
    #[serde(default)]
    pub session: SessionSection,
    /// Upload defaults.
    #[serde(default)]
    pub upload: UploadSection,
    /// Measurement defaults.
    #[serde(default)]
    pub measure: MeasureSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike discovered files, an explicit file must exist and parse.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let config = Self::parse_file(path).map_err(CliError::Config)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load a discovered configuration file, skipping it on any problem.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::parse_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{e}; ignoring it");
                None
            },
        }
    }

    fn parse_file(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fygen").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.connection.port, other.connection.port);
        take(&mut self.connection.baud, other.connection.baud);
        take(&mut self.session.pacing_ms, other.session.pacing_ms);
        take(&mut self.session.reply_timeout_ms, other.session.reply_timeout_ms);
        take(&mut self.upload.bank, other.upload.bank);
        take(&mut self.upload.chunk_size, other.upload.chunk_size);
        take(&mut self.upload.verify_acks, other.upload.verify_acks);
        take(&mut self.measure.interval_ms, other.measure.interval_ms);
    }

    /// Session timing with file overrides applied.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(ms) = self.session.pacing_ms {
            config = config.with_pacing(Duration::from_millis(ms));
        }
        if let Some(ms) = self.session.reply_timeout_ms {
            config = config.with_reply_timeout(Duration::from_millis(ms));
        }
        config
    }

    /// Upload tuning with file overrides applied.
    pub fn upload_config(&self) -> UploadConfig {
        let mut config = UploadConfig::default();
        if let Some(chunk_size) = self.upload.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if let Some(verify) = self.upload.verify_acks {
            config = config.with_verify_acks(verify);
        }
        config
    }

    /// Poll interval, if configured.
    pub fn measure_interval(&self) -> Option<Duration> {
        self.measure.interval_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.session.pacing_ms.is_none());
        assert!(config.upload.bank.is_none());
        assert!(config.measure.interval_ms.is_none());
        assert_eq!(config.session_config(), SessionConfig::default());
        assert_eq!(config.upload_config(), UploadConfig::default());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(9600);

        let mut other = Config::default();
        other.connection.baud = Some(19200);
        other.upload.bank = Some(3);

        base.merge(other);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(19200));
        assert_eq!(base.upload.bank, Some(3));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.session.pacing_ms = Some(150);
        base.upload.verify_acks = Some(true);

        base.merge(Config::default());

        assert_eq!(base.session.pacing_ms, Some(150));
        assert_eq!(base.upload.verify_acks, Some(true));
    }

    #[test]
    fn test_config_merge_explicit_false_wins() {
        let mut base = Config::default();
        base.upload.verify_acks = Some(true);
        let mut other = Config::default();
        other.upload.verify_acks = Some(false);
        base.merge(other);
        assert_eq!(base.upload.verify_acks, Some(false));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyUSB1"
baud = 9600

[session]
pacing_ms = 120
reply_timeout_ms = 2000

[upload]
bank = 2
chunk_size = 16
verify_acks = true

[measure]
interval_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.upload.bank, Some(2));

        let session = config.session_config();
        assert_eq!(session.pacing, Duration::from_millis(120));
        assert_eq!(session.reply_timeout, Duration::from_secs(2));

        let upload = config.upload_config();
        assert_eq!(upload.chunk_size, 16);
        assert!(upload.verify_acks);

        assert_eq!(config.measure_interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: Config = toml::from_str("[measure]\ninterval_ms = 250\n").unwrap();
        assert!(config.connection.port.is_none());
        assert_eq!(config.measure.interval_ms, Some(250));
    }

    // ---- load_from_path ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[connection]\nport = \"COM3\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_load_from_path_missing_is_config_error() {
        let dir = tempdir().unwrap();
        let result = Config::load_from_path(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_load_from_path_invalid_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[connection\nport = ").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_discovered_invalid_file_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fygen.toml");
        fs::write(&path, "[upload]\nbank = \"two\"\n").unwrap();
        assert!(Config::load_from_file(&path).is_none());
        assert!(Config::load_from_file(&dir.path().join("none.toml")).is_none());
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path_shape() {
        if let Some(p) = Config::global_config_path() {
            let text = p.to_string_lossy();
            assert!(text.contains("fygen"));
            assert!(text.ends_with("config.toml"));
        }
    }
}
