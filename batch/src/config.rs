//! Queue configuration file.
//!
//! Persists the front-end settings between sessions as YAML. The file is
//! only read when a run is being prepared; the run itself works from the
//! immutable [`RunConfiguration`] produced by
//! [`QueueConfig::to_run_configuration`].
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! executable: ./acars_parser
//! output_dir: /data/extracted
//! flags:
//!   pretty: true
//!   all: true
//!   stats: false
//! process:
//!   timeout_secs: 600
//! ```

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use extract_queue_core::RunConfiguration;

use crate::error::{BatchError, Result};

/// Configuration layout version written by this build.
pub const CONFIG_VERSION: &str = "1.0";

/// Executable used when none is configured.
#[cfg(windows)]
pub const DEFAULT_EXECUTABLE: &str = r".\acars_parser.exe";
#[cfg(not(windows))]
pub const DEFAULT_EXECUTABLE: &str = "./acars_parser";

/// Tool flag toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagConfig {
    pub pretty: bool,
    pub all: bool,
    pub stats: bool,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            all: true,
            stats: false,
        }
    }
}

/// Settings for each launched process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Kill the tool after this many seconds. Unset means no limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Top-level queue configuration.
///
/// # Examples
///
/// ```
/// use extract_queue_batch::QueueConfig;
///
/// let config = QueueConfig::default();
/// assert!(config.flags.pretty && config.flags.all && !config.flags.stats);
/// let run = config.to_run_configuration().unwrap();
/// assert!(!run.stats);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub version: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub flags: FlagConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            output_dir: None,
            flags: FlagConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](BatchError::IoError) if the file cannot be read,
    /// [`YamlError`](BatchError::YamlError) if parsing fails, or
    /// [`UnsupportedVersion`](BatchError::UnsupportedVersion) for a layout
    /// from a newer major version.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.check_version()?;
        Ok(config)
    }

    /// Saves configuration to a YAML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_yaml::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Freezes the settings into a validated [`RunConfiguration`].
    pub fn to_run_configuration(&self) -> Result<RunConfiguration> {
        let mut run = RunConfiguration::new(self.executable.clone())
            .with_pretty(self.flags.pretty)
            .with_all(self.flags.all)
            .with_stats(self.flags.stats);
        run.output_dir = self.output_dir.clone();
        run.validate()?;
        Ok(run)
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process.timeout_secs.map(Duration::from_secs)
    }

    fn check_version(&self) -> Result<()> {
        let major = |v: &str| v.split('.').next().unwrap_or_default().trim().to_string();
        if major(&self.version) != major(CONFIG_VERSION) {
            return Err(BatchError::UnsupportedVersion(self.version.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.yaml");
        let mut config = QueueConfig::default();
        config.executable = PathBuf::from("/opt/acars/acars_parser");
        config.output_dir = Some("/data/out".to_string());
        config.flags.stats = true;
        config.process.timeout_secs = Some(30);

        config.save(&path).unwrap();
        let loaded = QueueConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.process_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.yaml");
        fs::write(&path, "version: \"1.2\"\nexecutable: tool\n").unwrap();

        let config = QueueConfig::load(&path).unwrap();
        assert_eq!(config.flags, FlagConfig::default());
        assert_eq!(config.process_timeout(), None);
        assert_eq!(config.output_dir, None);
    }

    #[test]
    fn test_load_rejects_future_major_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.yaml");
        fs::write(&path, "version: \"2.0\"\nexecutable: tool\n").unwrap();

        let err = QueueConfig::load(&path).unwrap_err();
        assert!(matches!(err, BatchError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn test_to_run_configuration_validates() {
        let mut config = QueueConfig::default();
        config.executable = PathBuf::from("");
        assert!(matches!(
            config.to_run_configuration(),
            Err(BatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_to_run_configuration_copies_settings() {
        let mut config = QueueConfig::default();
        config.output_dir = Some("out".to_string());
        config.flags.all = false;
        let run = config.to_run_configuration().unwrap();
        assert_eq!(run.output_dir(), Some("out"));
        assert!(run.pretty && !run.all && !run.stats);
    }
}
