//! Recoverable deletes and cross-device moves.

use super::naming::assign_path;
use crate::error::StoreError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where soft-deleted files go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashBin {
    /// The operating system's recycle bin
    System,
    /// A plain folder; relative layout is preserved inside it
    Folder(PathBuf),
}

impl TrashBin {
    pub fn from_config(trash_dir: Option<&Path>) -> Self {
        match trash_dir {
            Some(dir) => TrashBin::Folder(dir.to_path_buf()),
            None => TrashBin::System,
        }
    }

    /// Folder-backed trash location, if any
    pub fn folder(&self) -> Option<&Path> {
        match self {
            TrashBin::Folder(dir) => Some(dir),
            TrashBin::System => None,
        }
    }

    /// Move `path` into the bin; `relative` is its layout inside a folder bin.
    pub fn discard(&self, path: &Path, relative: &Path) -> Result<PathBuf, StoreError> {
        match self {
            TrashBin::System => {
                trash::delete(path).map_err(|e| StoreError::Trash {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                debug!(path = %path.display(), "Moved to system trash");
                Ok(path.to_path_buf())
            }
            TrashBin::Folder(dir) => {
                let slot = assign_path(relative, &[], |p| dir.join(p).exists())?;
                let destination = dir.join(slot);
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
                }
                move_file(path, &destination).map_err(|e| StoreError::Trash {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                debug!(
                    path = %path.display(),
                    destination = %destination.display(),
                    "Moved to trash folder"
                );
                Ok(destination)
            }
        }
    }
}

/// Rename, falling back to copy + size check + delete across file systems.
pub fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    fs::rename(source, destination).or_else(|_| {
        let source_size = fs::metadata(source)?.len();
        fs::copy(source, destination)?;

        // Never delete the source unless the copy is complete
        let dest_size = fs::metadata(destination)?.len();
        if dest_size != source_size {
            let _ = fs::remove_file(destination);
            return Err(io::Error::other(format!(
                "Copy verification failed: source {} bytes, dest {} bytes",
                source_size, dest_size
            )));
        }

        fs::remove_file(source)
    })
}
