//! Error Module - JBolt Error Types
//!
//! Defines all error types used in JBolt.
//!
//! # Error Categories
//!
//! ## Startup Errors
//! - `Configuration` - Invalid or conflicting VM options (fatal, exit 1)
//!
//! ## Placement Errors
//! - `CodeCacheFull` - No viable partition has room for a method
//! - `UnknownMethod` - Method has no placement record
//! - `InactivePartition` - Partition does not exist in this configuration
//!
//! ## Consistency Errors
//! - `RelocationRace` - Code moved outside a safepoint
//! - `Internal` - Invariant violation
//!
//! ## Artifact Errors
//! - `OrderFile` - Malformed order file
//! - `OrderUnavailable` - No order stored yet
//! - `Io` - File system failure

use thiserror::Error;

use crate::config::ConfigError;
use crate::heap::CodeHeapKind;

/// Main error type for all JBolt operations
///
/// # Examples
///
/// ```rust
/// use jbolt::error::JBoltError;
///
/// fn handle_error(err: JBoltError) {
///     match err {
///         JBoltError::Configuration(cause) => {
///             println!("{}", cause);
///         }
///         JBoltError::CodeCacheFull { kind, requested } => {
///             eprintln!("{} cannot fit {} bytes", kind, requested);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum JBoltError {
    /// Invalid VM configuration
    ///
    /// **When returned:** Startup option validation, rescheduling parsing or
    /// code heap carving fails
    ///
    /// **Recovery strategy:** Cannot recover - report the message and exit with status 1
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Code cache partition exhausted
    ///
    /// **When returned:** Neither the requested partition nor any of its
    /// overflow targets has a free range large enough
    ///
    /// **Recovery strategy:** Leave the method where it is and count the failure
    #[error("{kind} is full: requested {requested} bytes")]
    CodeCacheFull { kind: CodeHeapKind, requested: usize },

    /// Partition not present in the active set
    ///
    /// **When returned:** Allocation or lookup targets a partition that was
    /// disabled by the current flags
    ///
    /// **Recovery strategy:** Fix caller to consult the registry first
    #[error("Code heap {0} is not active")]
    InactivePartition(CodeHeapKind),

    /// Method has no placement record
    ///
    /// **When returned:** Lookup or unload of a method that was never registered
    ///
    /// **Recovery strategy:** Ignore, the method was already unloaded
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Code moved while mutators were running
    ///
    /// **When returned:** A relocation was attempted without a reached safepoint
    ///
    /// **Recovery strategy:** Cannot recover - this is a bug
    #[error("Relocation attempted outside of a safepoint: {0}")]
    RelocationRace(String),

    /// Malformed order file
    ///
    /// **When returned:** Loading an order file with bad or duplicated lines
    ///
    /// **Recovery strategy:** Regenerate the file in dump mode
    #[error("{0}")]
    OrderFile(String),

    /// No order has been recorded
    ///
    /// **When returned:** An on-demand dump was requested before any pass ran
    ///
    /// **Recovery strategy:** Retry after the next pass
    #[error("No JBolt order is available to dump yet")]
    OrderUnavailable,

    /// I/O failure while reading or writing an artifact
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error - indicates a bug in JBolt
    ///
    /// **When returned:** Invariant violation or unexpected state
    ///
    /// **Recovery strategy:** Cannot recover - this is a bug
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JBoltError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JBoltError::CodeCacheFull { .. }
                | JBoltError::UnknownMethod(_)
                | JBoltError::OrderUnavailable
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            JBoltError::RelocationRace(_) | JBoltError::Internal(_)
        )
    }

    /// Check if this error must abort VM startup
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            JBoltError::Configuration(_) | JBoltError::OrderFile(_)
        )
    }
}

/// Result type alias for JBolt operations
pub type Result<T> = std::result::Result<T, JBoltError>;
