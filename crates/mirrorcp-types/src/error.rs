//! Error types and handling for mirrorcp
//!
//! Every failure surfaced by the pair model, the transfer engine and the tree
//! synchronizer is expressed through the closed [`Error`] enum. Raw codes coming
//! back from the native copy primitive are mapped into this set by the I/O crate;
//! codes it does not recognise are wrapped in [`Error::Native`] with the raw value
//! and both paths preserved.

use std::path::{Path, PathBuf};

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - the item failed, the run continues
    Medium,
    /// High severity - the operation should be aborted
    High,
}

/// Error category, following the run's failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Invalid paths or settings, detected before any I/O
    Configuration,
    /// Missing source, existing destination without overwrite, re-entrant start
    Precondition,
    /// Locked file, full disk, device not ready, access denied
    Transient,
    /// Cooperative cancellation
    Cancelled,
    /// Native code with no mapping
    Unknown,
    /// Other errors
    Other,
}

/// Main error type for mirrorcp operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A constructor or operation received an unusable argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument
        message: String,
    },

    /// The operation is not valid in the current state
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation was rejected
        message: String,
    },

    /// The source entry does not exist
    #[error("Source not found: {}", path.display())]
    SourceNotFound {
        /// Missing source path
        path: PathBuf,
    },

    /// The destination exists and overwriting was not allowed
    #[error("Destination already exists: {}", path.display())]
    DestinationExists {
        /// Existing destination path
        path: PathBuf,
    },

    /// Not enough space on the destination volume
    #[error("Insufficient space writing {}", path.display())]
    InsufficientSpace {
        /// Destination being written
        path: PathBuf,
    },

    /// Access to an entry was denied
    #[error("Access denied: {}", path.display())]
    AccessDenied {
        /// Path that could not be accessed
        path: PathBuf,
    },

    /// The device holding an entry is not ready
    #[error("Device not ready: {}", path.display())]
    DeviceNotReady {
        /// Path on the unavailable device
        path: PathBuf,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Native copy primitive failed with a code that has no mapping
    #[error(
        "Native transfer failed with code {code}: {} -> {}",
        source_path.display(),
        destination_path.display()
    )]
    Native {
        /// Raw code returned by the primitive
        code: i32,
        /// Source of the failed transfer
        source_path: PathBuf,
        /// Destination of the failed transfer
        destination_path: PathBuf,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Synchronization error
    #[error("Synchronization error: {message}")]
    Sync {
        /// Error message describing the synchronization issue
        message: String,
    },
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } | Self::Config { .. } => ErrorKind::Configuration,
            Self::InvalidOperation { .. }
            | Self::SourceNotFound { .. }
            | Self::DestinationExists { .. } => ErrorKind::Precondition,
            Self::InsufficientSpace { .. }
            | Self::AccessDenied { .. }
            | Self::DeviceNotReady { .. }
            | Self::Io { .. } => ErrorKind::Transient,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Native { .. } => ErrorKind::Unknown,
            Self::Sync { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::Configuration => ErrorSeverity::High,
            ErrorKind::Precondition | ErrorKind::Transient | ErrorKind::Unknown => {
                ErrorSeverity::Medium
            }
            ErrorKind::Other => ErrorSeverity::Medium,
            ErrorKind::Cancelled => ErrorSeverity::Low,
        }
    }

    /// Whether this error is the cancellation terminal state rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a new invalid operation error
    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new sync error
    pub fn sync<S: Into<String>>(message: S) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create a new I/O error with a message
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Wrap a native code that has no mapping
    pub fn native(code: i32, source: &Path, destination: &Path) -> Self {
        Self::Native {
            code,
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
