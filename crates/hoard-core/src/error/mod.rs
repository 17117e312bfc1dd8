//! Error types and result aliases for Hoard operations.
//!
//! Provides a unified error type that covers every failure the install cache
//! can surface, from configuration parsing down to block file I/O.

use thiserror::Error;

/// Unified error type for all Hoard operations
#[derive(Error, Debug)]
pub enum HoardError {
    // Config errors
    #[error("Failed to parse config: {message} at line {line}, column {column}")]
    TomlParse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Journal errors
    #[error("Journal '{path}' not found")]
    JournalNotFound { path: String },

    #[error("Journal '{path}' is corrupt: {reason}")]
    JournalCorrupt { path: String, reason: String },

    // Block store errors
    #[error("CAS block '{path}' not found")]
    BlockNotFound { path: String },

    #[error("No free CAS block id available")]
    BlockIdsExhausted,

    #[error("Failed to purge {required} bytes from install cache, purged {purged} bytes")]
    PurgeIncomplete { required: u64, purged: u64 },

    // Request errors
    #[error("Invalid chunk range: {reason}")]
    ChunkRange { reason: String },

    #[error("Failed to decode chunk {chunk}: {reason}")]
    Decode { chunk: String, reason: String },

    #[error("Invalid content hash: expected {expected}, got {actual}")]
    InvalidHash { expected: String, actual: String },

    #[error("Request was cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Hoard operations
pub type HoardResult<T> = Result<T, HoardError>;

impl HoardError {
    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a journal corruption error
    pub fn journal_corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JournalCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error means "the content is not here" rather than a fault.
    ///
    /// A read racing a purge may see its block disappear; the dispatcher treats
    /// that the same as a lookup miss and falls through to another backend.
    pub fn is_miss(&self) -> bool {
        match self {
            HoardError::BlockNotFound { .. } => true,
            HoardError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HoardError::Io { .. }
                | HoardError::JournalNotFound { .. }
                | HoardError::JournalCorrupt { .. }
                | HoardError::BlockNotFound { .. }
                | HoardError::PurgeIncomplete { .. }
                | HoardError::Cancelled
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            HoardError::JournalCorrupt { .. } => {
                Some("The cache will be rebuilt on next start; run 'hoard clear' to do it now")
            },
            HoardError::PurgeIncomplete { .. } => {
                Some("Raise the disk quota or release references to installed content")
            },
            HoardError::ConfigValidation { .. } | HoardError::TomlParse { .. } => {
                Some("Check the [cache] section of your hoard config file")
            },
            HoardError::BlockIdsExhausted => Some("Run 'hoard purge --all' to reclaim block ids"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_is_miss() {
        let err = HoardError::io(
            "read block",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_miss());

        let err = HoardError::io(
            "read block",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!err.is_miss());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_purge_incomplete_message() {
        let err = HoardError::PurgeIncomplete {
            required: 4096,
            purged: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Failed to purge 4096 bytes from install cache, purged 1024 bytes"
        );
        assert!(err.suggestion().is_some());
        assert!(!err.is_miss());
    }
}
