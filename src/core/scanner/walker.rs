//! Directory walking implementation using walkdir.

use super::{filter::ImageFilter, FolderScanner, ImageFile, ScanResult};
use crate::error::ScanError;
use crate::events::{null_sender, Event, EventSender, ScanEvent, ScanProgress};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Absolute paths (files or folders) never reported
    pub excluded: Vec<PathBuf>,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: ImageFilter,
}

impl WalkDirScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        let filter = ImageFilter::new().with_hidden(config.include_hidden);
        Self { config, filter }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.config
            .excluded
            .iter()
            .any(|excluded| path.starts_with(excluded))
    }

    fn report_error(errors: &mut Vec<ScanError>, events: &EventSender, error: ScanError, path: PathBuf) {
        events.send(Event::Scan(ScanEvent::Error {
            path,
            message: error.to_string(),
        }));
        errors.push(error);
    }
}

impl FolderScanner for WalkDirScanner {
    fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        self.scan_with_events(root, &null_sender())
    }

    fn scan_with_events(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        events.send(Event::Scan(ScanEvent::Started {
            root: root.to_path_buf(),
        }));

        let mut result = ScanResult::default();
        let mut directories_scanned = 0;

        // Prune hidden and excluded subtrees instead of visiting them
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                entry.path() == root
                    || !(self.filter.skips_hidden(entry.path()) || self.is_excluded(entry.path()))
            });

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    let error = if e.io_error().map(|e| e.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanError::PermissionDenied { path: path.clone() }
                    } else {
                        ScanError::ReadDirectory {
                            path: path.clone(),
                            source: std::io::Error::other(e.to_string()),
                        }
                    };
                    Self::report_error(&mut result.errors, events, error, path);
                    continue;
                }
            };

            let path = entry.path();

            if entry.file_type().is_dir() {
                directories_scanned += 1;
                events.send(Event::Scan(ScanEvent::Progress(ScanProgress {
                    directories_scanned,
                    images_found: result.images.len(),
                    current_path: path.to_path_buf(),
                })));
                continue;
            }

            if !self.filter.is_image(path) {
                result.others.push(path.to_path_buf());
                continue;
            }

            let relative = match path.strip_prefix(root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            match fs::metadata(path) {
                Ok(metadata) => result.images.push(ImageFile {
                    path: path.to_path_buf(),
                    relative,
                    size: metadata.len(),
                    modified: metadata
                        .modified()
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                }),
                Err(e) => {
                    let error = ScanError::ReadDirectory {
                        path: path.to_path_buf(),
                        source: e,
                    };
                    Self::report_error(&mut result.errors, events, error, path.to_path_buf());
                }
            }
        }

        // Deterministic order for callers that ingest sequentially
        result.images.sort_by(|a, b| a.relative.cmp(&b.relative));
        result.others.sort();

        events.send(Event::Scan(ScanEvent::Completed {
            total_images: result.images.len(),
            other_files: result.others.len(),
        }));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    #[test]
    fn scan_empty_directory_returns_empty_vec() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = WalkDirScanner::new(ScanConfig::default());

        let result = scanner.scan(temp_dir.path()).unwrap();

        assert!(result.images.is_empty());
        assert!(result.others.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn scan_separates_images_from_other_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "photo.jpg");
        create_file(temp_dir.path(), "photo.GIF");
        create_file(temp_dir.path(), "notes.txt");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(result.images.len(), 2);
        assert_eq!(result.others.len(), 1);
        assert!(result.others[0].ends_with("notes.txt"));
    }

    #[test]
    fn scan_traverses_nested_directories_with_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "root.png");
        create_file(temp_dir.path(), "a/b/nested.png");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(temp_dir.path()).unwrap();

        let relatives: Vec<_> = result.images.iter().map(|i| i.relative.clone()).collect();
        assert_eq!(
            relatives,
            vec![PathBuf::from("a/b/nested.png"), PathBuf::from("root.png")]
        );
    }

    #[test]
    fn scan_skips_hidden_subtrees() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "visible.jpg");
        create_file(temp_dir.path(), ".hidden.jpg");
        create_file(temp_dir.path(), ".cache/inner.jpg");

        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(result.images.len(), 1);
        assert!(result.images[0].path.ends_with("visible.jpg"));
        assert!(result.others.is_empty());
    }

    #[test]
    fn scan_skips_excluded_paths() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "keep.png");
        create_file(temp_dir.path(), "trash/old.png");
        let index = create_file(temp_dir.path(), "index.db");

        let config = ScanConfig {
            excluded: vec![temp_dir.path().join("trash"), index],
            ..Default::default()
        };
        let result = WalkDirScanner::new(config).scan(temp_dir.path()).unwrap();

        assert_eq!(result.images.len(), 1);
        assert!(result.others.is_empty());
    }

    #[test]
    fn scan_nonexistent_directory_returns_error() {
        let scanner = WalkDirScanner::new(ScanConfig::default());
        let result = scanner.scan(Path::new("/nonexistent/path/12345"));

        assert!(matches!(result, Err(ScanError::DirectoryNotFound { .. })));
    }
}
