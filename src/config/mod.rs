//! Configuration management.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, and `DATAPORT_*` environment variables.
//!
//! ```toml
//! store_path = "/var/lib/dataport/customers.json"
//!
//! [transfer]
//! temp_dir = "/var/tmp/dataport"
//! chunk_size = 131072
//! http_timeout_secs = 60
//!
//! [localization]
//! cultures = ["en", "uk"]
//! default_culture = "en"
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```

use crate::schema::Localization;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default size of streamed export chunks (128 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Default timeout for remote downloads and uploads.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Main configuration for dataport.
#[derive(Debug, Clone)]
pub struct DataportConfig {
    /// JSON snapshot file backing the CLI's customer store.
    pub store_path: PathBuf,
    /// Transfer staging and remote I/O.
    pub transfer: TransferSettings,
    /// Cultures for localized columns.
    pub localization: LocalizationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Transfer staging and remote I/O settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Directory for staged files. `None` means the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Size of streamed export chunks in bytes.
    pub chunk_size: usize,
    /// Timeout for remote downloads and uploads.
    pub http_timeout_secs: u64,
    /// User agent sent to remote URLs.
    pub user_agent: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: format!("dataport/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransferSettings {
    /// Directory staged files are created in.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Culture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizationSettings {
    /// Known cultures.
    pub cultures: Vec<String>,
    /// Culture held in plain field values.
    pub default_culture: String,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        Self {
            cultures: vec!["en".to_string()],
            default_culture: "en".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for anything but `pretty` or `json`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format '{other}'"))),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
        }
    }
}

/// Configuration file structure for TOML parsing.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    store_path: Option<String>,
    transfer: Option<TransferSection>,
    localization: Option<LocalizationSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TransferSection {
    temp_dir: Option<String>,
    chunk_size: Option<usize>,
    http_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LocalizationSection {
    cultures: Option<Vec<String>>,
    default_culture: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LoggingSection {
    format: Option<String>,
    level: Option<String>,
}

impl Default for DataportConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            transfer: TransferSettings::default(),
            localization: LocalizationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("dataport-customers.json"),
        |dirs| dirs.data_dir().join("dataport").join("customers.json"),
    )
}

impl DataportConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid value.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/dataport/`. Returns
    /// default configuration if no usable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("dataport").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("dataport")
                .join("config.toml"),
        ];
        candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| {
                Self::load_from_file(path)
                    .map_err(|e| tracing::warn!(path = %path.display(), error = %e, "Ignoring config file"))
                    .ok()
            })
            .unwrap_or_default()
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(store_path) = file.store_path {
            config.store_path = PathBuf::from(store_path);
        }
        if let Some(transfer) = file.transfer {
            if let Some(dir) = transfer.temp_dir {
                config.transfer.temp_dir = Some(PathBuf::from(dir));
            }
            if let Some(size) = transfer.chunk_size {
                config.transfer.chunk_size = size;
            }
            if let Some(secs) = transfer.http_timeout_secs {
                config.transfer.http_timeout_secs = secs;
            }
            if let Some(agent) = transfer.user_agent {
                config.transfer.user_agent = agent;
            }
        }
        if let Some(localization) = file.localization {
            if let Some(cultures) = localization.cultures {
                config.localization.cultures = cultures;
            }
            if let Some(default) = localization.default_culture {
                config.localization.default_culture = default;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format)?;
            }
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies `DATAPORT_*` environment overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an invalid value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an invalid value.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup("DATAPORT_STORE") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("DATAPORT_TEMP_DIR") {
            self.transfer.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(size) = lookup("DATAPORT_CHUNK_SIZE") {
            self.transfer.chunk_size = parse_number("DATAPORT_CHUNK_SIZE", &size)?;
        }
        if let Some(secs) = lookup("DATAPORT_HTTP_TIMEOUT_SECS") {
            self.transfer.http_timeout_secs = parse_number("DATAPORT_HTTP_TIMEOUT_SECS", &secs)?;
        }
        if let Some(cultures) = lookup("DATAPORT_CULTURES") {
            self.localization.cultures = cultures
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(default) = lookup("DATAPORT_DEFAULT_CULTURE") {
            self.localization.default_culture = default;
        }
        if let Some(format) = lookup("DATAPORT_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero chunk size or an empty
    /// culture list.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(Error::InvalidInput(
                "transfer chunk size must be greater than zero".to_string(),
            ));
        }
        if self.localization.cultures.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "at least one culture must be configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Culture settings in the form the profile registry uses.
    #[must_use]
    pub fn localization(&self) -> Localization {
        Localization::new(
            self.localization.cultures.iter().cloned(),
            &self.localization.default_culture,
        )
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{name} must be a positive number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DataportConfig::new();
        assert_eq!(config.transfer.chunk_size, 131_072);
        assert_eq!(config.transfer.http_timeout_secs, 60);
        assert!(config.transfer.user_agent.starts_with("dataport/"));
        assert_eq!(config.transfer.temp_dir(), std::env::temp_dir());
        assert_eq!(config.localization().default_culture(), "en");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
store_path = "/tmp/customers.json"

[transfer]
chunk_size = 4096
temp_dir = "/var/tmp/dataport"

[localization]
cultures = ["uk", "en"]
default_culture = "de"

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = DataportConfig::load_from_file(&path).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/customers.json"));
        assert_eq!(config.transfer.chunk_size, 4096);
        assert_eq!(config.transfer.temp_dir(), PathBuf::from("/var/tmp/dataport"));
        assert_eq!(config.transfer.http_timeout_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Json);
        // Unknown default falls back to the first culture.
        assert_eq!(config.localization().default_culture(), "uk");
    }

    #[test]
    fn test_load_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = DataportConfig::load_from_file(&dir.path().join("missing.toml"));
        assert!(matches!(
            missing,
            Err(Error::OperationFailed { ref operation, .. }) if operation == "read_config_file"
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[transfer\nchunk_size = ").unwrap();
        assert!(matches!(
            DataportConfig::load_from_file(&path),
            Err(Error::OperationFailed { ref operation, .. }) if operation == "parse_config_file"
        ));

        std::fs::write(&path, "[transfer]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            DataportConfig::load_from_file(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = DataportConfig::new()
            .apply_overrides(env(&[
                ("DATAPORT_CHUNK_SIZE", "1024"),
                ("DATAPORT_HTTP_TIMEOUT_SECS", "5"),
                ("DATAPORT_CULTURES", "en, uk ,"),
                ("DATAPORT_DEFAULT_CULTURE", "uk"),
                ("DATAPORT_LOG_FORMAT", "JSON"),
                ("DATAPORT_TEMP_DIR", "/scratch"),
            ]))
            .unwrap();

        assert_eq!(config.transfer.chunk_size, 1024);
        assert_eq!(config.transfer.http_timeout_secs, 5);
        assert_eq!(config.localization.cultures, vec!["en", "uk"]);
        assert_eq!(config.localization().default_culture(), "uk");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.transfer.temp_dir(), PathBuf::from("/scratch"));
    }

    #[test]
    fn test_invalid_overrides() {
        let zero = DataportConfig::new().apply_overrides(env(&[("DATAPORT_CHUNK_SIZE", "0")]));
        assert!(matches!(zero, Err(Error::InvalidInput(_))));

        let garbage = DataportConfig::new().apply_overrides(env(&[("DATAPORT_CHUNK_SIZE", "big")]));
        assert!(matches!(garbage, Err(Error::InvalidInput(_))));

        let cultures = DataportConfig::new().apply_overrides(env(&[("DATAPORT_CULTURES", " , ")]));
        assert!(matches!(cultures, Err(Error::InvalidInput(_))));

        let format = DataportConfig::new().apply_overrides(env(&[("DATAPORT_LOG_FORMAT", "xml")]));
        assert!(matches!(format, Err(Error::InvalidInput(_))));
    }
}
