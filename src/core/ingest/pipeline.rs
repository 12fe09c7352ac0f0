//! The add pipeline and folder import.

use super::{AddRequest, ImportSource, Outcome, OutcomeKind};
use crate::core::hasher::{Checksum, HashEngine};
use crate::core::index::{Image, ImageIndex};
use crate::core::scanner::{FolderScanner, ScanConfig, WalkDirScanner};
use crate::core::store::{naming, normalize, ImageStore, Normalized, PlaceSource};
use crate::error::{Result, StoreError};
use crate::events::{null_sender, Event, EventSender, IngestEvent, ItemProgress};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filename treated as "no name given"
const PLACEHOLDER_NAME: &str = "image.png";
/// Folder for nameless uploads
const BLOB_FOLDER: &str = "blob";

const NO_TAGS: &[&str] = &[];

/// Counters for a folder import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: usize,
    pub reused: usize,
    pub conflicts: usize,
    pub errors: usize,
    /// Items that failed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl ImportReport {
    fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Created => self.created += 1,
            OutcomeKind::Reused => self.reused += 1,
            OutcomeKind::Conflict => self.conflicts += 1,
            OutcomeKind::Error => self.errors += 1,
        }
    }
}

/// Where one incoming image is headed
#[derive(Debug)]
struct Placement {
    /// Requested (or derived) relative path
    candidate: PathBuf,
    /// Free path the content will occupy
    target: PathBuf,
    /// Source's own relative path when it already lives under the root
    in_root: Option<PathBuf>,
    /// False when the target already holds these bytes
    needs_write: bool,
}

impl Placement {
    /// Whether a record sits where this image was asked to go
    fn is_here(&self, image: &Image) -> bool {
        image.path == naming::relative_key(&self.candidate)
            || image.path == naming::relative_key(&self.target)
    }

    /// Whether a record is the very file being added
    fn is_source(&self, image: &Image) -> bool {
        self.in_root
            .as_deref()
            .map(|relative| naming::relative_key(relative) == image.path)
            .unwrap_or(false)
    }
}

/// Runs [`AddRequest`]s against one store and index
pub struct Ingestor<'a> {
    engine: &'a HashEngine,
    store: &'a ImageStore,
    index: &'a ImageIndex,
}

impl<'a> Ingestor<'a> {
    pub fn new(engine: &'a HashEngine, store: &'a ImageStore, index: &'a ImageIndex) -> Self {
        Self {
            engine,
            store,
            index,
        }
    }

    /// Add one image.
    ///
    /// Undecodable content is reported as [`Outcome::Error`]; only I/O and
    /// index failures are returned as `Err`.
    pub fn add(&self, request: AddRequest) -> Result<Outcome> {
        let (bytes, source_path) = Self::read_source(&request.source)?;
        let in_root = source_path
            .as_deref()
            .and_then(|path| self.store.relative_to_root(path));

        let candidate = naming::validate_relative(&Self::candidate_path(
            &request,
            source_path.as_deref(),
            in_root.as_deref(),
        ))?;
        let checksum = self.engine.exact_fingerprint(&bytes);
        let placement = self.plan(candidate, in_root, &checksum, &request.tags)?;
        debug!(?placement, checksum = %checksum, "Planned placement");

        if let Some(existing) = self.index.get_by_checksum(&checksum)? {
            return self.resolve_match(existing, &placement, &request, source_path.as_deref(), &bytes);
        }

        let mut fingerprint = None;
        let mut normalized = Normalized::Unchanged;

        if !(request.skip_hash || self.engine.skips_perceptual()) {
            let label = source_path
                .clone()
                .unwrap_or_else(|| placement.candidate.clone());
            let image = match self.engine.decode(&bytes, &label) {
                Ok(image) => image,
                Err(e) => {
                    warn!(path = %label.display(), error = %e, "Not a readable image");
                    return Ok(Outcome::Error(e));
                }
            };

            normalized = self.store.normalize_or_keep(&image, &label);
            let hash = match self.engine.perceptual_fingerprint(normalized.pixels(&image)) {
                Ok(hash) => hash,
                Err(e) => return Ok(Outcome::Error(e)),
            };

            let mut near = self.index.find_near(&hash, self.engine.threshold())?;
            if !near.is_empty() {
                let chosen = near.iter().position(|i| placement.is_here(i)).unwrap_or(0);
                let existing = near.swap_remove(chosen);
                return self.resolve_match(existing, &placement, &request, source_path.as_deref(), &bytes);
            }
            fingerprint = Some(hash);
        }

        // Files already under the root are never rewritten
        let rewrite = request.normalize && placement.in_root.is_none() && placement.needs_write;
        let encoded = match &normalized {
            Normalized::Changed(changed) if rewrite => {
                match normalize::encode_for(changed, &placement.target) {
                    Ok(encoded) => Some(encoded),
                    Err(e) => {
                        warn!(error = %e, "Keeping original bytes");
                        None
                    }
                }
            }
            _ => None,
        };
        let (stored_checksum, source_checksum) = match &encoded {
            Some(encoded) => (self.engine.exact_fingerprint(encoded), Some(checksum)),
            None => (checksum, None),
        };

        if encoded.is_some() {
            if let Some(existing) = self.index.get_by_checksum(&stored_checksum)? {
                return self.resolve_match(existing, &placement, &request, source_path.as_deref(), &bytes);
            }
        }

        let source = match (&encoded, source_path.as_deref()) {
            (Some(encoded), _) => PlaceSource::Bytes(encoded.as_slice()),
            (None, Some(path)) => PlaceSource::File(path),
            (None, None) => PlaceSource::Bytes(&*bytes),
        };
        let stored_at = self.write(&placement, source, &request.tags)?;
        let key = naming::relative_key(&stored_at);

        if let Some(occupant) = self.index.get_by_path(&key)? {
            let updated = self.index.update_fingerprints(
                &occupant,
                &stored_checksum,
                source_checksum.as_ref(),
                fingerprint.as_ref(),
            )?;
            let updated = self.index.update_tags(&updated, &request.tags, NO_TAGS)?;
            info!(path = %updated.path, "Updated record for changed file");
            return Ok(Outcome::Reused(updated));
        }

        let image = self.index.create(
            &key,
            &stored_checksum,
            source_checksum.as_ref(),
            fingerprint.as_ref(),
            &request.tags,
        )?;
        info!(path = %image.path, id = image.id, "Stored new image");
        Ok(Outcome::Created(image))
    }

    /// Add every image under `folder`, keyed by its path relative to `folder`
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
        let scanner = WalkDirScanner::new(ScanConfig::default());
        let scan = scanner.scan(folder)?;
        let total = scan.images.len();
        let mut report = ImportReport::default();

        events.send(Event::Ingest(IngestEvent::Started { total }));
        info!(folder = %folder.display(), total, "Importing folder");

        for (i, file) in scan.images.iter().enumerate() {
            let request = AddRequest::from_path(&file.path)
                .tags(tags.iter().cloned())
                .filename(&file.relative)
                .skip_hash(skip_hash)
                .normalize(normalize)
                .trash_rejected(false);

            match self.add(request) {
                Ok(outcome) => {
                    let kind = outcome.kind();
                    if let Outcome::Error(e) = &outcome {
                        report.failed.push((file.path.clone(), e.to_string()));
                    }
                    report.record(kind);
                    events.send(Event::Ingest(IngestEvent::Outcome {
                        path: file.path.clone(),
                        kind,
                    }));
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Import failed");
                    report.record(OutcomeKind::Error);
                    report.failed.push((file.path.clone(), e.to_string()));
                    events.send(Event::Ingest(IngestEvent::Outcome {
                        path: file.path.clone(),
                        kind: OutcomeKind::Error,
                    }));
                }
            }

            events.send(Event::Ingest(IngestEvent::Progress(ItemProgress {
                completed: i + 1,
                total,
                current_path: file.path.clone(),
            })));
        }

        events.send(Event::Ingest(IngestEvent::Completed {
            created: report.created,
            reused: report.reused,
            conflicts: report.conflicts,
            errors: report.errors,
        }));
        info!(
            created = report.created,
            reused = report.reused,
            conflicts = report.conflicts,
            errors = report.errors,
            "Import finished"
        );

        Ok(report)
    }

    /// Content plus the canonical source path for path sources
    fn read_source(source: &ImportSource) -> Result<(Cow<'_, [u8]>, Option<PathBuf>)> {
        match source {
            ImportSource::Bytes(bytes) => Ok((Cow::Borrowed(bytes.as_slice()), None)),
            ImportSource::Path(path) => {
                let missing = |e: io::Error| match e.kind() {
                    io::ErrorKind::NotFound => StoreError::SourceMissing { path: path.clone() },
                    _ => StoreError::io(path, e),
                };
                let path = fs::canonicalize(path).map_err(missing)?;
                let bytes = fs::read(&path).map_err(missing)?;
                Ok((Cow::Owned(bytes), Some(path)))
            }
        }
    }

    fn candidate_path(
        request: &AddRequest,
        source_path: Option<&Path>,
        in_root: Option<&Path>,
    ) -> PathBuf {
        let is_placeholder = |name: &Path| {
            name.as_os_str().is_empty() || name == Path::new(PLACEHOLDER_NAME)
        };

        if let Some(name) = request.filename.as_deref().filter(|n| !is_placeholder(*n)) {
            return name.to_path_buf();
        }
        if let Some(relative) = in_root {
            return relative.to_path_buf();
        }
        if let Some(name) = source_path
            .and_then(Path::file_name)
            .map(Path::new)
            .filter(|n| !is_placeholder(*n))
        {
            return name.to_path_buf();
        }

        let id = Uuid::new_v4().simple().to_string();
        PathBuf::from(BLOB_FOLDER).join(format!("{}.png", &id[..8]))
    }

    fn plan(
        &self,
        candidate: PathBuf,
        in_root: Option<PathBuf>,
        checksum: &Checksum,
        tags: &[String],
    ) -> Result<Placement> {
        let source_is_candidate = in_root.as_ref() == Some(&candidate);
        let candidate_identical = !source_is_candidate && {
            let existing = self.store.absolute(&candidate);
            existing.is_file()
                && self
                    .engine
                    .checksum_file(&existing)
                    .map(|c| &c == checksum)
                    .unwrap_or(false)
        };

        if source_is_candidate || candidate_identical {
            return Ok(Placement {
                target: candidate.clone(),
                candidate,
                in_root,
                needs_write: false,
            });
        }

        let target = self.store.assign_path(&candidate, tags)?;
        Ok(Placement {
            candidate,
            target,
            in_root,
            needs_write: true,
        })
    }

    /// Put the content at the target; returns where it ended up
    fn write(
        &self,
        placement: &Placement,
        source: PlaceSource<'_>,
        tags: &[String],
    ) -> Result<PathBuf> {
        if !placement.needs_write {
            return Ok(placement.target.clone());
        }
        if let Some(from) = &placement.in_root {
            return Ok(self.store.relocate(from, &placement.target, tags)?);
        }
        self.store.place(source, &placement.target)?;
        Ok(placement.target.clone())
    }

    fn resolve_match(
        &self,
        existing: Image,
        placement: &Placement,
        request: &AddRequest,
        source_path: Option<&Path>,
        bytes: &[u8],
    ) -> Result<Outcome> {
        if placement.is_here(&existing) {
            // Restore a record whose file went missing
            if placement.in_root.is_none() && !self.store.exists(existing.relative_path()) {
                self.store
                    .place(PlaceSource::Bytes(bytes), existing.relative_path())?;
            }
            let image = self.index.update_tags(&existing, &request.tags, NO_TAGS)?;
            debug!(path = %image.path, "Image already stored");
            return Ok(Outcome::Reused(image));
        }

        let existing = self.index.touch(&existing, None)?;
        info!(
            existing = %existing.path,
            candidate = %placement.candidate.display(),
            "Duplicate of stored image"
        );

        if request.trash_rejected && !placement.is_source(&existing) {
            if let Some(path) = source_path {
                if let Err(e) = self.store.soft_delete(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove rejected duplicate");
                }
            }
        }

        Ok(Outcome::Conflict { existing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::TrashBin;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        bin: TempDir,
        engine: HashEngine,
        store: ImageStore,
        index: ImageIndex,
    }

    impl Fixture {
        fn new(threshold: u32) -> Self {
            let root = TempDir::new().unwrap();
            let bin = TempDir::new().unwrap();
            let store = ImageStore::new(root.path(), 800, TrashBin::Folder(bin.path().to_path_buf()));
            Self {
                engine: HashEngine::new(8, threshold, false),
                index: ImageIndex::open_in_memory().unwrap(),
                store,
                root,
                bin,
            }
        }

        fn ingestor(&self) -> Ingestor<'_> {
            Ingestor::new(&self.engine, &self.store, &self.index)
        }
    }

    /// Random 8x8 blocks inside a mid-gray frame, so trimming leaves it alone
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

    #[test]
    fn same_bytes_same_name_is_idempotent() {
        let fx = Fixture::new(3);
        let bytes = png(7);

        let first = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes.clone()).filename("cat.png"))
            .unwrap();
        let second = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes).filename("cat.png"))
            .unwrap();

        assert_eq!(first.kind(), OutcomeKind::Created);
        assert_eq!(second.kind(), OutcomeKind::Reused);
        assert_eq!(fx.index.count().unwrap(), 1);
    }

    #[test]
    fn nameless_bytes_go_to_blob_folder() {
        let fx = Fixture::new(3);
        let outcome = fx
            .ingestor()
            .add(AddRequest::from_bytes(png(5)).filename("image.png"))
            .unwrap();

        let image = outcome.image().unwrap();
        assert!(image.path.starts_with("blob/"));
        assert!(image.path.ends_with(".png"));
        assert_eq!(image.filename().len(), "12345678.png".len());
    }

    #[test]
    fn same_name_different_content_is_disambiguated() {
        let fx = Fixture::new(0);
        let first = fx
            .ingestor()
            .add(AddRequest::from_bytes(png(3)).filename("img.png"))
            .unwrap();
        let second = fx
            .ingestor()
            .add(AddRequest::from_bytes(png(11)).filename("img.png").tag("Beach"))
            .unwrap();

        assert_eq!(first.image().unwrap().path, "img.png");
        assert_eq!(second.image().unwrap().path, "img-beach.png");
        assert!(fx.root.path().join("img.png").exists());
        assert!(fx.root.path().join("img-beach.png").exists());
    }

    #[test]
    fn exact_copy_elsewhere_is_a_conflict() {
        let fx = Fixture::new(3);
        let bytes = png(9);
        let created = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes.clone()).filename("cat.png"))
            .unwrap();

        let outcome = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes).filename("other.png"))
            .unwrap();

        match outcome {
            Outcome::Conflict { existing } => {
                assert_eq!(existing.id, created.image().unwrap().id);
                assert!(existing.modified >= created.image().unwrap().modified);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(!fx.root.path().join("other.png").exists());
    }

    #[test]
    fn rejected_path_source_is_trashed() {
        let fx = Fixture::new(3);
        let outside = TempDir::new().unwrap();
        let bytes = png(9);
        fx.ingestor()
            .add(AddRequest::from_bytes(bytes.clone()).filename("cat.png"))
            .unwrap();
        let copy = outside.path().join("cat_copy.png");
        fs::write(&copy, &bytes).unwrap();

        let outcome = fx.ingestor().add(AddRequest::from_path(&copy)).unwrap();

        assert_eq!(outcome.kind(), OutcomeKind::Conflict);
        assert!(!copy.exists());
        assert!(fx.bin.path().join("cat_copy.png").exists());
    }

    #[test]
    fn undecodable_bytes_are_an_error_outcome() {
        let fx = Fixture::new(3);
        let outcome = fx
            .ingestor()
            .add(AddRequest::from_bytes(b"not an image".to_vec()).filename("x.png"))
            .unwrap();

        assert_eq!(outcome.kind(), OutcomeKind::Error);
        assert_eq!(fx.index.count().unwrap(), 0);
        assert!(!fx.root.path().join("x.png").exists());
    }

    #[test]
    fn skip_hash_stores_undecodable_bytes() {
        let fx = Fixture::new(3);
        let outcome = fx
            .ingestor()
            .add(
                AddRequest::from_bytes(b"opaque".to_vec())
                    .filename("x.png")
                    .skip_hash(true),
            )
            .unwrap();

        let image = outcome.image().unwrap();
        assert!(image.perceptual_hash.is_none());
        assert_eq!(fs::read(fx.root.path().join("x.png")).unwrap(), b"opaque");
    }

    #[test]
    fn wide_images_are_shrunk_and_checksummed_as_stored() {
        let fx = Fixture::new(3);
        let wide = DynamicImage::ImageRgb8(ImageBuffer::from_fn(1600, 100, |x, _| {
            Rgb([(x % 256) as u8, 40, 90])
        }));
        let mut bytes = Vec::new();
        wide.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let outcome = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes.clone()).filename("wide.png"))
            .unwrap();
        let image = outcome.image().unwrap();
        let stored = fs::read(fx.root.path().join("wide.png")).unwrap();

        assert_eq!(image::load_from_memory(&stored).unwrap().width(), 800);
        assert_eq!(image.checksum, Checksum::of_bytes(&stored));

        let again = fx
            .ingestor()
            .add(AddRequest::from_bytes(bytes).filename("wide.png"))
            .unwrap();
        assert_eq!(again.kind(), OutcomeKind::Reused);
        assert_eq!(fx.index.count().unwrap(), 1);
    }

    #[test]
    fn import_folder_counts_outcomes() {
        let fx = Fixture::new(3);
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("sub")).unwrap();
        fs::write(source.path().join("a.png"), png(2)).unwrap();
        fs::write(source.path().join("sub/b.png"), png(13)).unwrap();
        fs::write(source.path().join("sub/copy.png"), png(2)).unwrap();
        fs::write(source.path().join("broken.png"), b"junk").unwrap();

        let report = fx
            .ingestor()
            .import_folder(source.path(), &["scan".to_string()], false, false)
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.errors, 1);
        assert!(fx.root.path().join("sub/b.png").exists());
        // Import never removes from the source folder
        assert!(source.path().join("sub/copy.png").exists());
        let b = fx.index.get_by_path("sub/b.png").unwrap().unwrap();
        assert!(b.has_tag("scan"));
    }
}
