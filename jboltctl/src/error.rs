//! Error handling for the jboltctl launcher.
//!
//! Errors are split by the phase that produced them, because the launcher
//! reports option errors and startup errors with different banners.

use jbolt::{ConfigError, JBoltError};
use thiserror::Error;

/// Main error type for the launcher.
#[derive(Error, Debug)]
pub enum LauncherError {
    /// The defaults file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A `-X` option the launcher does not know.
    #[error("Unrecognized option: {0}")]
    UnrecognizedOption(String),

    /// A malformed `-Xlog` option.
    #[error("Invalid -Xlog option: '{0}'")]
    InvalidLogOption(String),

    /// A `-XX:` option was rejected while being applied.
    #[error(transparent)]
    VmOption(#[from] ConfigError),

    /// VM startup failed.
    #[error(transparent)]
    Startup(#[from] JBoltError),

    /// The tracing subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LauncherError {
    /// Errors raised after option parsing, while the VM was starting
    pub fn is_startup(&self) -> bool {
        matches!(self, LauncherError::Startup(_))
    }

    /// Lines written to stdout before exiting with status 1
    pub fn report(&self) -> Vec<String> {
        if self.is_startup() {
            vec![
                "Error occurred during initialization of VM".to_string(),
                self.to_string(),
            ]
        } else {
            vec![
                self.to_string(),
                "Error: Could not create the Java Virtual Machine.".to_string(),
            ]
        }
    }
}

/// Result type alias using LauncherError.
pub type Result<T> = std::result::Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = LauncherError::Config("missing table".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing table");
    }

    #[test]
    fn test_vm_option_error_is_transparent() {
        let err = LauncherError::from(ConfigError::UnrecognizedOption("+Bogus".to_string()));
        assert_eq!(err.to_string(), "Unrecognized VM option '+Bogus'");
        assert!(!err.is_startup());
    }

    #[test]
    fn test_startup_report_has_banner() {
        let err = LauncherError::from(JBoltError::from(ConfigError::InvalidTime(
            "12:303".to_string(),
        )));
        assert_eq!(
            err.report(),
            vec![
                "Error occurred during initialization of VM".to_string(),
                "Invalid time 12:303 in JBoltRescheduling".to_string(),
            ]
        );
    }

    #[test]
    fn test_option_report_has_trailer() {
        let err = LauncherError::UnrecognizedOption("-Xfoo".to_string());
        let report = err.report();
        assert_eq!(report[0], "Unrecognized option: -Xfoo");
        assert_eq!(report[1], "Error: Could not create the Java Virtual Machine.");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LauncherError = io_err.into();
        assert!(matches!(err, LauncherError::Io(_)));
    }
}
