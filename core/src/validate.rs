//! Run configuration validation.
//!
//! Structural problems are checked once, before a batch starts. Anything
//! that can only fail per item (a missing input, an executable that cannot
//! be launched) is reported as an item failure instead.
//!
//! # Examples
//!
//! ```
//! use extract_queue_core::{ConfigError, RunConfiguration};
//!
//! assert!(RunConfiguration::new("./acars_parser").validate().is_ok());
//! assert_eq!(
//!     RunConfiguration::new("  ").validate(),
//!     Err(ConfigError::MissingExecutable)
//! );
//! ```

use thiserror::Error;

use crate::RunConfiguration;

/// Configuration errors that prevent a batch from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No executable path was given.
    #[error("no executable path configured")]
    MissingExecutable,
    /// The output directory override contains a NUL byte.
    #[error("invalid output directory: {0:?}")]
    InvalidOutputDir(String),
}

/// Validates a run configuration.
pub fn validate_configuration(config: &RunConfiguration) -> Result<(), ConfigError> {
    if config.executable.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(ConfigError::MissingExecutable);
    }
    if let Some(dir) = config.output_dir() {
        if dir.contains('\0') {
            return Err(ConfigError::InvalidOutputDir(dir.to_string()));
        }
    }
    Ok(())
}
