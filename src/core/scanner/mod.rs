//! # Scanner Module
//!
//! Walks the managed folder and sorts every file into either a recognized
//! image or an "other" file (candidates for the unrecognized-file sweep).
//!
//! ## Recognized Formats
//! `.png .jpg .jpeg .jp2 .gif`, case-insensitive.
//!
//! Hidden files and folders are skipped, as are explicitly excluded paths
//! (the index database and the trash folder when they live under the root).

mod filter;
mod walker;

pub use filter::{is_hidden, is_image_path, ImageFilter, IMAGE_EXTENSIONS};
pub use walker::{ScanConfig, WalkDirScanner};

use crate::error::ScanError;
use crate::events::EventSender;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A discovered image file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the scanned root
    pub relative: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified time
    pub modified: SystemTime,
}

/// Result of a scan operation
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Recognized images
    pub images: Vec<ImageFile>,
    /// Every other regular file (absolute paths)
    pub others: Vec<PathBuf>,
    /// Errors that occurred during scanning (non-fatal)
    pub errors: Vec<ScanError>,
}

/// Trait for folder scanners
pub trait FolderScanner: Send + Sync {
    /// Scan a folder recursively
    fn scan(&self, root: &Path) -> Result<ScanResult, ScanError>;

    /// Scan with progress reporting via events
    fn scan_with_events(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError>;
}

/// Folder components between `relative`'s start and its file name.
///
/// `a/b/new.png` yields `["a", "b"]`.
pub fn folder_components(relative: &Path) -> Vec<String> {
    relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
