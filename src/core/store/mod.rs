//! # Store Module
//!
//! Owns the managed folder on disk: where files go, how they get there and
//! where they go when removed. The index never touches files directly.
//!
//! ## Guarantees
//! - Placement writes a temporary file next to the destination and persists
//!   it atomically, so a failed write leaves nothing behind
//! - Existing files are never overwritten; collisions are renamed through
//!   [`naming::assign_path`]
//! - Deletes are soft: files move to a trash folder or the system trash

pub mod naming;
pub mod normalize;
mod trash;

pub use normalize::Normalized;
pub use trash::{move_file, TrashBin};

use crate::config::LibraryConfig;
use crate::error::StoreError;
use image::DynamicImage;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Content to write into the store
#[derive(Debug, Clone, Copy)]
pub enum PlaceSource<'a> {
    /// In-memory bytes
    Bytes(&'a [u8]),
    /// An external file, copied
    File(&'a Path),
}

/// Physical storage of the managed folder
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    max_width: u32,
    trash: TrashBin,
}

/// Canonical form of `path`, also for paths that do not exist yet.
pub(crate) fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            canonical(parent).join(name)
        }
        _ => path.to_path_buf(),
    }
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, max_width: u32, trash: TrashBin) -> Self {
        let trash = match trash {
            TrashBin::Folder(dir) => TrashBin::Folder(canonical(&dir)),
            TrashBin::System => TrashBin::System,
        };
        Self {
            root: canonical(&root.into()),
            max_width,
            trash,
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(
            &config.folder,
            config.max_width,
            TrashBin::from_config(config.trash_dir.as_deref()),
        )
    }

    /// Absolute root of the managed folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Trash folder when soft deletes are folder-backed
    pub fn trash_folder(&self) -> Option<&Path> {
        self.trash.folder()
    }

    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: &Path) -> bool {
        self.absolute(relative).exists()
    }

    /// Absolute paths that exist are returned as-is; anything else is taken
    /// as relative to the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() && path.exists() {
            return path.to_path_buf();
        }
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root.join(relative)
    }

    /// Path relative to the root, for paths inside it
    pub fn relative_to_root(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return Some(relative.to_path_buf());
        }
        canonical(path)
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// First free variant of `candidate` under the root
    pub fn assign_path(&self, candidate: &Path, tokens: &[String]) -> Result<PathBuf, StoreError> {
        naming::assign_path(candidate, tokens, |p| self.exists(p))
    }

    /// Optional border trim and downscale to the configured width
    pub fn normalize(
        &self,
        image: &DynamicImage,
        trim: bool,
        shrink: bool,
    ) -> Result<Normalized, StoreError> {
        let trimmed = if trim { normalize::trim(image) } else { None };
        let current = trimmed.as_ref().unwrap_or(image);

        let shrunk = if shrink {
            normalize::shrink(current, self.max_width)?
        } else {
            None
        };

        Ok(match shrunk.or(trimmed) {
            Some(changed) => Normalized::Changed(changed),
            None => Normalized::Unchanged,
        })
    }

    /// Trim and shrink; a failure keeps the original pixels.
    ///
    /// Fingerprints are always taken from these pixels, whether or not the
    /// file itself gets rewritten.
    pub fn normalize_or_keep(&self, image: &DynamicImage, label: &Path) -> Normalized {
        self.normalize(image, true, true).unwrap_or_else(|e| {
            warn!(path = %label.display(), error = %e, "Normalization failed; keeping original pixels");
            Normalized::Unchanged
        })
    }

    /// Write `source` to `relative` atomically. Returns the absolute path.
    pub fn place(&self, source: PlaceSource<'_>, relative: &Path) -> Result<PathBuf, StoreError> {
        let relative = naming::validate_relative(relative)?;
        let destination = self.absolute(&relative);
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| StoreError::io(&parent, e))?;
        let written = match source {
            PlaceSource::Bytes(bytes) => temp.write_all(bytes),
            PlaceSource::File(path) => {
                let mut file = fs::File::open(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => StoreError::SourceMissing {
                        path: path.to_path_buf(),
                    },
                    _ => StoreError::io(path, e),
                })?;
                io::copy(&mut file, &mut temp).map(|_| ())
            }
        };
        written
            .and_then(|_| temp.flush())
            .map_err(|e| StoreError::io(&destination, e))?;

        temp.persist_noclobber(&destination)
            .map_err(|e| StoreError::io(&destination, e.error))?;

        debug!(path = %destination.display(), "Placed file");
        Ok(destination)
    }

    /// Move a stored file to a new relative path.
    ///
    /// The original extension is kept and collisions are disambiguated with
    /// `tokens`. Returns the final relative path.
    pub fn relocate(
        &self,
        from: &Path,
        to: &Path,
        tokens: &[String],
    ) -> Result<PathBuf, StoreError> {
        let from = naming::validate_relative(from)?;
        let mut to = naming::validate_relative(to)?;
        if let Some(extension) = from.extension() {
            to.set_extension(extension);
        }
        if to == from {
            return Ok(from);
        }

        let source = self.absolute(&from);
        if !source.exists() {
            return Err(StoreError::SourceMissing { path: source });
        }

        let target = self.assign_path(&to, tokens)?;
        let destination = self.absolute(&target);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        move_file(&source, &destination).map_err(|e| StoreError::io(&source, e))?;

        debug!(from = %from.display(), to = %target.display(), "Relocated file");
        Ok(target)
    }

    /// Move a file (absolute, or relative to the root) to the trash.
    pub fn soft_delete(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let absolute = self.resolve(path);
        if !absolute.exists() {
            return Err(StoreError::SourceMissing { path: absolute });
        }

        let relative = self
            .relative_to_root(&absolute)
            .or_else(|| absolute.file_name().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("unnamed"));

        self.trash.discard(&absolute, &relative)
    }
}
