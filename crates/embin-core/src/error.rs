//! Error types for the embin-core library.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! mirror the ways an embedded archive can fail: a missing entry, a corrupted
//! image, a mutation aimed at the read-only tree, or a failing read against
//! the backing file.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for embin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all embin operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Path or name absent from the embedded tree
    #[error("no such file or directory: '{path}'")]
    NotFound {
        /// The path that could not be resolved
        path: String,
    },

    /// A directory operation named an embedded file
    #[error("not a directory: '{path}'")]
    NotADirectory {
        /// The file path that was treated as a directory
        path: String,
    },

    /// Footer or header failed to parse
    #[error("malformed archive: {details}")]
    MalformedArchive {
        /// What was wrong with the image
        details: String,
    },

    /// A mutating call targeted a path served by the read-only tree
    #[error("operation '{operation}' is not supported on embedded path '{path}'")]
    UnsupportedOperation {
        /// Name of the rejected operation
        operation: &'static str,
        /// The embedded path it targeted
        path: String,
    },

    /// The positioned read against the archive's backing file failed
    #[error("content provider read failed: {0}")]
    Provider(#[source] io::Error),

    /// I/O failure while streaming an archive
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// String does not fit the 2-byte length prefix
    #[error("string of {len} bytes exceeds the 65535 byte limit")]
    StringTooLong {
        /// Encoded length of the rejected string
        len: usize,
    },

    /// A single directory holds more entries than a u16 count can express
    #[error("directory holds {count} entries, at most 65535 are supported")]
    TooManyEntries {
        /// Number of entries found
        count: usize,
    },

    /// An offset or length does not fit the archive's 32-bit fields
    #[error("{what} of {len} bytes does not fit a 32-bit archive field")]
    ArchiveTooLarge {
        /// Which region overflowed
        what: &'static str,
        /// The offending length or offset
        len: u64,
    },

    /// Path has no usable segments
    #[error("invalid path: '{path}'")]
    InvalidPath {
        /// The rejected path
        path: String,
    },

    /// Glob pattern could not be parsed or walked
    #[error("glob error: {0}")]
    Glob(String),
}

impl Error {
    /// Creates a new not-found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a new not-a-directory error
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Creates a new malformed archive error
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedArchive {
            details: details.into(),
        }
    }

    /// Creates a new unsupported operation error
    pub fn unsupported(operation: &'static str, path: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            path: path.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates a new archive overflow error
    pub fn too_large(what: &'static str, len: u64) -> Self {
        Self::ArchiveTooLarge { what, len }
    }

    /// POSIX-style error code for errors that have a native counterpart
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("ENOENT"),
            Self::NotADirectory { .. } => Some("ENOTDIR"),
            Self::UnsupportedOperation { .. } => Some("EROFS"),
            _ => None,
        }
    }

    /// Returns true if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the process cannot continue after this error
    ///
    /// A malformed archive means the executable itself is corrupted, so
    /// bootstrap has no degraded mode to fall back to.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedArchive { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Provider(source) | Error::Io(source) => source,
            Error::FileRead { source, .. } | Error::FileWrite { source, .. } => source,
            Error::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            Error::UnsupportedOperation { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::NotADirectory { .. } => io::Error::new(io::ErrorKind::Other, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/a/missing.txt");
        assert!(err.to_string().contains("no such file"));
        assert!(err.to_string().contains("/a/missing.txt"));

        let err = Error::unsupported("write_file", "/embedded/x");
        assert!(err.to_string().contains("write_file"));
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::not_found("x").code(), Some("ENOENT"));
        assert_eq!(Error::unsupported("mkdir", "x").code(), Some("EROFS"));
        assert_eq!(Error::not_a_directory("/a.txt").code(), Some("ENOTDIR"));
        assert_eq!(Error::malformed("bad footer").code(), None);
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::malformed("truncated header").is_fatal());
        assert!(!Error::not_found("/x").is_fatal());
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let io_err: io::Error = Error::not_found("/x").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
        let inner = io_err.get_ref().and_then(|e| e.downcast_ref::<Error>());
        assert!(matches!(inner, Some(Error::NotFound { .. })));

        let io_err: io::Error = Error::unsupported("rename", "/x").into();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);

        let io_err: io::Error = Error::not_a_directory("/a.txt").into();
        let inner = io_err.get_ref().and_then(|e| e.downcast_ref::<Error>());
        assert_eq!(inner.and_then(Error::code), Some("ENOTDIR"));
        assert!(!inner.is_some_and(Error::is_not_found));

        let original = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let io_err: io::Error = Error::Provider(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
