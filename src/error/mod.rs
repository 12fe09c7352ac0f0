//! # Error Module
//!
//! Error types for the image library.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Duplicates are not errors** - they are reported as `Outcome::Conflict`
//! - **Recovery hints** - suggest how to fix when possible

use std::path::PathBuf;
use thiserror::Error;

/// Top-level library error
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("Invalid filename pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Fatal problems with the library configuration, raised at startup only
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Managed folder not found: {path}. Run `imshelf init` to create it.")]
    FolderMissing { path: PathBuf },

    #[error("Managed folder is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Managed folder is not writable: {path}: {source}")]
    FolderNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid hash size: {value} (must be 2-64)")]
    InvalidHashSize { value: u32 },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to create managed folder {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while walking the managed folder
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while fingerprinting images
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Failed to read image file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash computation failed: {0}")]
    ComputationFailed(String),
}

impl HashError {
    /// Whether the failure means the bytes are not a readable image
    pub fn is_decode(&self) -> bool {
        matches!(self, HashError::DecodeError { .. })
    }
}

/// Errors raised while touching files in the managed folder
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File operation failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path must be relative to the managed folder and stay inside it: {path}")]
    InvalidRelativePath { path: PathBuf },

    #[error("Source file not found: {path}")]
    SourceMissing { path: PathBuf },

    #[error("Failed to move {path} to the trash: {reason}")]
    Trash { path: PathBuf, reason: String },

    #[error("Failed to encode normalized image {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that occur with the image index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open index database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Index lock poisoned for {path}. Restart the process; the database itself is intact.")]
    Poisoned { path: PathBuf },

    #[error("Corrupt value in column {column}: {reason}")]
    CorruptValue { column: &'static str, reason: String },

    #[error("Info values must be scalars (string, number, bool or null); key {key} is not")]
    NonScalarInfo { key: String },

    #[error("No indexed image at {path}")]
    NotFound { path: PathBuf },
}

impl From<rusqlite::Error> for IndexError {
    fn from(e: rusqlite::Error) -> Self {
        IndexError::QueryFailed(e.to_string())
    }
}

/// Errors from the folder watcher
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    InitFailed(String),

    #[error("Failed to watch {path}: {reason}")]
    WatchFailed { path: PathBuf, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_suggests_init() {
        let error = ConfigError::FolderMissing {
            path: PathBuf::from("/photos/imshelf"),
        };
        let message = error.to_string();
        assert!(message.contains("/photos/imshelf"));
        assert!(message.contains("imshelf init"));
    }

    #[test]
    fn decode_error_includes_path_and_reason() {
        let error = HashError::DecodeError {
            path: PathBuf::from("/photos/broken.jpg"),
            reason: "invalid JPEG".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/photos/broken.jpg"));
        assert!(message.contains("invalid JPEG"));
        assert!(error.is_decode());
    }

    #[test]
    fn io_hash_error_is_not_decode() {
        let error = HashError::IoError {
            path: PathBuf::from("/photos/gone.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!error.is_decode());
    }

    #[test]
    fn sqlite_errors_convert_to_query_failed() {
        let error: IndexError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(error, IndexError::QueryFailed(_)));
    }
}
