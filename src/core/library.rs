//! The library facade: one store, one index and one fingerprint engine built
//! from a single [`LibraryConfig`].

use crate::config::LibraryConfig;
use crate::core::hasher::HashEngine;
use crate::core::index::{Image, ImageExport, ImageIndex, InfoMap, SearchQuery};
use crate::core::ingest::{AddRequest, ImportReport, Ingestor, Outcome};
use crate::core::refresh::{Reconciler, RefreshReport, RehashReport};
use crate::core::scanner::{FolderScanner, ScanConfig, WalkDirScanner};
use crate::core::store::{naming, ImageStore};
use crate::error::{ConfigError, IndexError, LibraryError, Result};
use crate::events::{null_sender, EventSender};
use regex::RegexBuilder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file found by [`Library::search_filename`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilenameMatch {
    /// The file has a record
    Indexed(Image),
    /// The file exists but is not indexed yet (relative path)
    Unindexed(PathBuf),
}

/// A managed image folder and its index
pub struct Library {
    config: LibraryConfig,
    engine: HashEngine,
    store: ImageStore,
    index: ImageIndex,
}

impl Library {
    /// Open an existing library. The folder must already exist.
    pub fn open(config: LibraryConfig) -> Result<Self> {
        config.validate()?;

        let index = ImageIndex::open(&config.index_path)?;
        let library = Self {
            engine: HashEngine::from_config(&config),
            store: ImageStore::from_config(&config),
            index,
            config,
        };

        info!(
            folder = %library.store.root().display(),
            index = %library.config.index_path.display(),
            "Opened library"
        );
        Ok(library)
    }

    /// Create the managed folder if needed, then open
    pub fn open_creating(config: LibraryConfig) -> Result<Self> {
        fs::create_dir_all(&config.folder).map_err(|e| ConfigError::CreateFailed {
            path: config.folder.clone(),
            source: e,
        })?;
        Self::open(config)
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    pub fn engine(&self) -> &HashEngine {
        &self.engine
    }

    fn ingestor(&self) -> Ingestor<'_> {
        Ingestor::new(&self.engine, &self.store, &self.index)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.engine, &self.store, &self.index)
    }

    /// Add one image; see [`Outcome`] for the possible results
    pub fn add(&self, request: AddRequest) -> Result<Outcome> {
        self.ingestor().add(request)
    }

    pub fn import_folder(
        &self,
        folder: &Path,
        tags: &[String],
        skip_hash: bool,
        normalize: bool,
    ) -> Result<ImportReport> {
        self.import_folder_with_events(folder, tags, skip_hash, normalize, &null_sender())
    }

    pub fn import_folder_with_events(
        &self,
        folder: &Path,
        tags: &[String],
        skip_hash: bool,
        normalize: bool,
        events: &EventSender,
    ) -> Result<ImportReport> {
        self.ingestor()
            .import_folder_with_events(folder, tags, skip_hash, normalize, events)
    }

    pub fn refresh(&self, remove_unrecognized: bool) -> Result<RefreshReport> {
        self.refresh_with_events(remove_unrecognized, &null_sender())
    }

    pub fn refresh_with_events(
        &self,
        remove_unrecognized: bool,
        events: &EventSender,
    ) -> Result<RefreshReport> {
        self.reconciler()
            .refresh_with_events(remove_unrecognized, events)
    }

    /// Rebuild fingerprints, then refresh with the configured removal policy
    pub fn calculate_hash(&self, reset: bool) -> Result<RehashReport> {
        self.calculate_hash_with_events(reset, &null_sender())
    }

    pub fn calculate_hash_with_events(
        &self,
        reset: bool,
        events: &EventSender,
    ) -> Result<RehashReport> {
        self.reconciler()
            .calculate_hash_with_events(reset, self.config.remove_unrecognized, events)
    }

    /// Record for a path relative to the root (absolute paths under the root also work)
    pub fn get(&self, path: &Path) -> Result<Option<Image>> {
        let relative = if path.is_absolute() {
            match self.store.relative_to_root(path) {
                Some(relative) => relative,
                None => return Ok(None),
            }
        } else {
            path.to_path_buf()
        };
        Ok(self.index.get_by_path(&naming::relative_key(&relative))?)
    }

    /// Like [`Library::get`], but a missing record is an error
    pub fn require(&self, path: &Path) -> Result<Image> {
        self.get(path)?.ok_or_else(|| {
            LibraryError::Index(IndexError::NotFound {
                path: path.to_path_buf(),
            })
        })
    }

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Image>> {
        Ok(self.index.search(query)?)
    }

    /// The `count` most recently modified images
    pub fn last(&self, count: usize) -> Result<Vec<Image>> {
        self.search(&SearchQuery::new().limit(count))
    }

    /// Case-insensitive regex over the relative paths of image files on disk
    pub fn search_filename(&self, pattern: &str) -> Result<Vec<FilenameMatch>> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        let scanner = WalkDirScanner::new(ScanConfig {
            excluded: self.reconciler().excluded().to_vec(),
            ..Default::default()
        });
        let scan = scanner.scan(self.store.root())?;

        let mut matches = Vec::new();
        for file in scan.images {
            let key = naming::relative_key(&file.relative);
            if !regex.is_match(&key) {
                continue;
            }
            matches.push(match self.index.get_by_path(&key)? {
                Some(image) => FilenameMatch::Indexed(image),
                None => FilenameMatch::Unindexed(file.relative),
            });
        }
        Ok(matches)
    }

    pub fn add_tags<S: AsRef<str>>(&self, image: &Image, tags: &[S]) -> Result<Image> {
        Ok(self.index.update_tags(image, tags, &[] as &[&str])?)
    }

    pub fn remove_tags<S: AsRef<str>>(&self, image: &Image, tags: &[S]) -> Result<Image> {
        Ok(self.index.update_tags(image, &[] as &[&str], tags)?)
    }

    /// Merge scalar values into the image's info
    pub fn add_info(&self, image: &Image, info: &InfoMap) -> Result<Image> {
        Ok(self.index.update_info(image, info, &[] as &[&str])?)
    }

    pub fn remove_info<S: AsRef<str>>(&self, image: &Image, keys: &[S]) -> Result<Image> {
        Ok(self.index.update_info(image, &InfoMap::new(), keys)?)
    }

    /// Move an image inside the library; the suffix is kept and collisions
    /// are disambiguated with the image's tags.
    pub fn move_image(&self, image: &Image, new_path: &Path) -> Result<Image> {
        let tags: Vec<String> = image.tags.iter().cloned().collect();
        let moved = self.store.relocate(image.relative_path(), new_path, &tags)?;
        let key = naming::relative_key(&moved);
        if key == image.path {
            return Ok(image.clone());
        }

        let updated = self.index.update_path(image, &key)?;
        info!(from = %image.path, to = %updated.path, "Moved image");
        Ok(updated)
    }

    /// Remove the record and move its file to the trash
    pub fn delete_image(&self, image: &Image) -> Result<()> {
        if self.store.exists(image.relative_path()) {
            self.store.soft_delete(image.relative_path())?;
        } else {
            debug!(path = %image.path, "File already gone");
        }
        self.index.delete(image)?;
        info!(path = %image.path, "Deleted image");
        Ok(())
    }

    /// Every record in export shape, ascending id
    pub fn export(&self) -> Result<Vec<ImageExport>> {
        Ok(self
            .index
            .all()?
            .iter()
            .map(Image::to_export)
            .collect())
    }

    /// Absolute file location for a stored path
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.store.resolve(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::OutcomeKind;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        library: Library,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::for_folder(dir.path().join("library"))
            .index_path(dir.path().join("index.db"))
            .trash_dir(dir.path().join("trash"));
        let library = Library::open_creating(config).unwrap();
        Fixture { _dir: dir, library }
    }

    fn png(seed: u32) -> Vec<u8> {
        let image = ImageBuffer::from_fn(64, 64, |x, y| {
            if x == 0 || y == 0 || x == 63 || y == 63 {
                return Rgb([125, 125, 125]);
            }
            let block = (x / 8) * 8 + y / 8;
            let noise = block.wrapping_add(seed.wrapping_mul(97)).wrapping_mul(2_654_435_761) >> 16;
            let v = if noise & 1 == 1 { 190 } else { 60 };
            Rgb([v, v, v])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn add(library: &Library, name: &str, seed: u32) -> Image {
        let outcome = library
            .add(AddRequest::from_bytes(png(seed)).filename(name))
            .unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::Created);
        outcome.image().unwrap().clone()
    }

    #[test]
    fn open_rejects_missing_folder() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::for_folder(dir.path().join("missing"))
            .index_path(dir.path().join("index.db"));

        assert!(matches!(
            Library::open(config),
            Err(LibraryError::Config(ConfigError::FolderMissing { .. }))
        ));
    }

    #[test]
    fn get_accepts_relative_and_absolute_paths() {
        let fx = fixture();
        let image = add(&fx.library, "pets/cat.png", 1);

        let absolute = fx.library.resolve(Path::new("pets/cat.png"));
        assert_eq!(fx.library.get(Path::new("pets/cat.png")).unwrap(), Some(image.clone()));
        assert_eq!(fx.library.get(&absolute).unwrap(), Some(image));
        assert!(fx.library.require(Path::new("nope.png")).is_err());
    }

    #[test]
    fn tags_and_info_round_trip_through_facade() {
        let fx = fixture();
        let image = add(&fx.library, "cat.png", 1);

        let image = fx.library.add_tags(&image, &["pets", " "]).unwrap();
        let image = fx.library.remove_tags(&image, &["nothing"]).unwrap();
        let mut info = InfoMap::new();
        info.insert("source".into(), json!("phone"));
        let image = fx.library.add_info(&image, &info).unwrap();

        assert!(image.has_tag("pets"));
        assert_eq!(image.tags.len(), 1);
        assert_eq!(image.info().get("source"), Some(&json!("phone")));

        let image = fx.library.remove_info(&image, &["source"]).unwrap();
        assert!(image.info().is_empty());
    }

    #[test]
    fn move_image_updates_record_and_file() {
        let fx = fixture();
        let image = add(&fx.library, "cat.png", 1);

        let moved = fx
            .library
            .move_image(&image, Path::new("pets/kitty.jpeg"))
            .unwrap();

        assert_eq!(moved.id, image.id);
        assert_eq!(moved.path, "pets/kitty.png");
        assert!(fx.library.resolve(Path::new("pets/kitty.png")).exists());
        assert!(!fx.library.resolve(Path::new("cat.png")).exists());
    }

    #[test]
    fn delete_image_trashes_file() {
        let fx = fixture();
        let image = add(&fx.library, "cat.png", 1);

        fx.library.delete_image(&image).unwrap();

        assert_eq!(fx.library.index().count().unwrap(), 0);
        assert!(!fx.library.resolve(Path::new("cat.png")).exists());
        assert!(fx.library.config().trash_dir.as_ref().unwrap().join("cat.png").exists());
    }

    #[test]
    fn last_returns_most_recent_first() {
        let fx = fixture();
        add(&fx.library, "a.png", 1);
        add(&fx.library, "b.png", 2);
        add(&fx.library, "c.png", 3);

        let names: Vec<_> = fx
            .library
            .last(2)
            .unwrap()
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(names, vec!["c.png", "b.png"]);
    }

    #[test]
    fn search_filename_reports_unindexed_files() {
        let fx = fixture();
        add(&fx.library, "Page-1-1.png", 1);
        fs::write(fx.library.resolve(Path::new("page-2-1.png")), png(2)).unwrap();
        fs::write(fx.library.resolve(Path::new("other.png")), png(3)).unwrap();

        let matches = fx.library.search_filename(r"page-\d+-1\.png").unwrap();

        assert_eq!(matches.len(), 2);
        assert!(matches!(&matches[0], FilenameMatch::Indexed(i) if i.path == "Page-1-1.png"));
        assert_eq!(
            matches[1],
            FilenameMatch::Unindexed(PathBuf::from("page-2-1.png"))
        );
    }

    #[test]
    fn search_filename_rejects_bad_pattern() {
        let fx = fixture();
        assert!(matches!(
            fx.library.search_filename("("),
            Err(LibraryError::Pattern(_))
        ));
    }

    #[test]
    fn export_serializes_records() {
        let fx = fixture();
        let image = add(&fx.library, "cat.png", 1);
        fx.library.add_tags(&image, &["b", "a"]).unwrap();

        let exported = fx.library.export().unwrap();
        let value = serde_json::to_value(&exported).unwrap();

        assert_eq!(value[0]["path"], json!("cat.png"));
        assert_eq!(value[0]["tags"], json!(["a", "b"]));
        assert!(value[0]["perceptual_hash"].is_string());
    }
}
