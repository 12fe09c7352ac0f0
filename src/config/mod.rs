//! # Config Module
//!
//! One immutable [`LibraryConfig`] value is built at startup and handed to
//! every component constructor.
//!
//! ## Sources (later wins)
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. Command-line flags
//!
//! ## Example file
//! ```toml
//! folder = "/home/me/Pictures/imshelf"
//! hash_size = 8
//! hash_difference_threshold = 3
//! remove_unrecognized = true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default width above which stored images are downscaled
pub const DEFAULT_MAX_WIDTH: u32 = 800;

/// Default dHash grid size (64-bit fingerprints)
pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Default Hamming distance below which two images are duplicates
pub const DEFAULT_THRESHOLD: u32 = 3;

const APP_DIR: &str = "imshelf";

/// Library configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the managed image folder
    pub folder: PathBuf,
    /// SQLite index location
    pub index_path: PathBuf,
    /// dHash grid size; fingerprints are `hash_size²` bits wide
    pub hash_size: u32,
    /// 0 = exact fingerprint equality only; >0 = near-duplicate distance bound (exclusive)
    pub hash_difference_threshold: u32,
    /// Disable perceptual fingerprinting entirely
    pub skip_hash: bool,
    /// Maximum stored width when shrinking is enabled
    pub max_width: u32,
    /// Watch the managed folder and refresh on changes
    pub watch_folder: bool,
    /// Soft-delete rejected duplicates and non-image files during refresh
    pub remove_unrecognized: bool,
    /// Folder used for soft deletes; the system trash when unset
    pub trash_dir: Option<PathBuf>,
    /// Quiet period before a watched change triggers a refresh
    pub watch_debounce_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let folder = dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let index_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("index.db");

        Self {
            folder,
            index_path,
            hash_size: DEFAULT_HASH_SIZE,
            hash_difference_threshold: DEFAULT_THRESHOLD,
            skip_hash: false,
            max_width: DEFAULT_MAX_WIDTH,
            watch_folder: false,
            remove_unrecognized: true,
            trash_dir: None,
            watch_debounce_ms: 1000,
        }
    }
}

impl LibraryConfig {
    /// Defaults rooted at `folder`, with the index stored next to the other defaults
    pub fn for_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    /// Load a TOML config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&text).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    pub fn hash_size(mut self, size: u32) -> Self {
        self.hash_size = size;
        self
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.hash_difference_threshold = threshold;
        self
    }

    pub fn skip_hash(mut self, skip: bool) -> Self {
        self.skip_hash = skip;
        self
    }

    pub fn max_width(mut self, width: u32) -> Self {
        self.max_width = width;
        self
    }

    pub fn remove_unrecognized(mut self, remove: bool) -> Self {
        self.remove_unrecognized = remove;
        self
    }

    pub fn trash_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trash_dir = Some(dir.into());
        self
    }

    pub fn watch_folder(mut self, watch: bool) -> Self {
        self.watch_folder = watch;
        self
    }

    /// Check everything that must hold before the library may touch disk.
    ///
    /// The folder must exist, be a directory and accept new files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=64).contains(&self.hash_size) {
            return Err(ConfigError::InvalidHashSize {
                value: self.hash_size,
            });
        }

        if !self.folder.exists() {
            return Err(ConfigError::FolderMissing {
                path: self.folder.clone(),
            });
        }

        if !self.folder.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.folder.clone(),
            });
        }

        tempfile::tempfile_in(&self.folder).map_err(|e| ConfigError::FolderNotWritable {
            path: self.folder.clone(),
            source: e,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = LibraryConfig::default();
        assert_eq!(config.hash_size, 8);
        assert_eq!(config.hash_difference_threshold, 3);
        assert_eq!(config.max_width, 800);
        assert!(config.remove_unrecognized);
        assert!(!config.skip_hash);
        assert!(config.folder.ends_with("imshelf"));
    }

    #[test]
    fn validate_accepts_writable_folder() {
        let temp_dir = TempDir::new().unwrap();
        let config = LibraryConfig::for_folder(temp_dir.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let config = LibraryConfig::for_folder(temp_dir.path().join("nope"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FolderMissing { .. })
        ));
    }

    #[test]
    fn validate_rejects_file_as_folder() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let config = LibraryConfig::for_folder(&file);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotADirectory { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_hash_size() {
        let temp_dir = TempDir::new().unwrap();
        let config = LibraryConfig::for_folder(temp_dir.path()).hash_size(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHashSize { value: 1 })
        ));
    }

    #[test]
    fn load_fills_missing_keys_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("imshelf.toml");
        fs::write(
            &path,
            "folder = \"/srv/images\"\nhash_difference_threshold = 0\nskip_hash = true\n",
        )
        .unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.folder, PathBuf::from("/srv/images"));
        assert_eq!(config.hash_difference_threshold, 0);
        assert!(config.skip_hash);
        assert_eq!(config.hash_size, DEFAULT_HASH_SIZE);
    }

    #[test]
    fn load_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "hash_size = \"eight\"").unwrap();

        assert!(matches!(
            LibraryConfig::load(&path),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
