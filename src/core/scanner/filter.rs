//! File filtering logic for the scanner.

use std::collections::HashSet;
use std::path::Path;

/// Extensions the library manages, lowercase
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "jp2", "gif"];

/// Whether a path carries a recognized image extension (case-insensitive)
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether a file or directory name starts with a dot
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Decides which walked entries belong to the library
pub struct ImageFilter {
    /// File extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl ImageFilter {
    /// Create a new filter with the managed extensions
    pub fn new() -> Self {
        Self {
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Whether a hidden entry should be skipped
    pub fn skips_hidden(&self, path: &Path) -> bool {
        !self.include_hidden && is_hidden(path)
    }

    /// Check if a file is a managed image
    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_includes_managed_extensions() {
        let filter = ImageFilter::new();
        assert!(filter.is_image(Path::new("/photos/image.jpg")));
        assert!(filter.is_image(Path::new("/photos/image.JPEG")));
        assert!(filter.is_image(Path::new("/photos/scan.jp2")));
        assert!(filter.is_image(Path::new("/photos/anim.Gif")));
    }

    #[test]
    fn filter_excludes_other_formats() {
        let filter = ImageFilter::new();
        assert!(!filter.is_image(Path::new("/photos/document.pdf")));
        assert!(!filter.is_image(Path::new("/photos/IMG_1234.HEIC")));
        assert!(!filter.is_image(Path::new("/photos/no_extension")));
    }

    #[test]
    fn hidden_entries_skipped_by_default() {
        let filter = ImageFilter::new();
        assert!(filter.skips_hidden(Path::new("/photos/.hidden.jpg")));
        assert!(!filter.with_hidden(true).skips_hidden(Path::new("/photos/.hidden.jpg")));
    }

    #[test]
    fn free_function_matches_filter() {
        assert!(is_image_path(Path::new("a/b/c.PNG")));
        assert!(!is_image_path(Path::new("a/b/c.txt")));
    }
}
