//! Reconciliation of the index against the managed folder.

use super::{RefreshReport, RehashReport};
use crate::core::hasher::{Checksum, HashEngine, PerceptualHash};
use crate::core::index::{Image, ImageIndex};
use crate::core::ingest::{AddRequest, Ingestor, Outcome};
use crate::core::scanner::{folder_components, FolderScanner, ScanConfig, WalkDirScanner};
use crate::core::store::{canonical, ImageStore};
use crate::error::{HashError, Result};
use crate::events::{
    null_sender, Event, EventSender, ItemProgress, RefreshEvent, RefreshPhase, RehashEvent,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// SQLite side files that live next to the index database
const INDEX_SUFFIXES: [&str; 4] = ["", "-wal", "-shm", "-journal"];

/// On-disk state of an indexed file
enum FileState {
    Missing,
    Unchanged,
    Changed {
        checksum: Checksum,
        hash: Option<PerceptualHash>,
    },
    Unreadable(HashError),
}

/// Result of fingerprinting an indexed file
enum HashState {
    Missing,
    Hashed(PerceptualHash),
    Unreadable(HashError),
}

/// Runs refresh and fingerprint rebuilds over one store and index
pub struct Reconciler<'a> {
    engine: &'a HashEngine,
    store: &'a ImageStore,
    index: &'a ImageIndex,
    excluded: Vec<PathBuf>,
}

impl<'a> Reconciler<'a> {
    pub fn new(engine: &'a HashEngine, store: &'a ImageStore, index: &'a ImageIndex) -> Self {
        // The index database and the trash folder are never library content
        let db_path = canonical(index.db_path());
        let mut excluded: Vec<PathBuf> = INDEX_SUFFIXES
            .iter()
            .map(|suffix| {
                let mut name = OsString::from(db_path.as_os_str());
                name.push(suffix);
                PathBuf::from(name)
            })
            .collect();
        excluded.extend(store.trash_folder().map(Path::to_path_buf));

        Self {
            engine,
            store,
            index,
            excluded,
        }
    }

    /// Paths the folder walk skips
    pub fn excluded(&self) -> &[PathBuf] {
        &self.excluded
    }

    pub fn refresh(&self, remove_unrecognized: bool) -> Result<RefreshReport> {
        self.refresh_with_events(remove_unrecognized, &null_sender())
    }

    pub fn refresh_with_events(
        &self,
        remove_unrecognized: bool,
        events: &EventSender,
    ) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        let accounted = self.prune_and_update(remove_unrecognized, &mut report, events)?;

        let scanner = WalkDirScanner::new(ScanConfig {
            excluded: self.excluded.clone(),
            ..Default::default()
        });
        let scan = scanner.scan_with_events(self.store.root(), events)?;
        for error in &scan.errors {
            warn!(error = %error, "Skipped part of the managed folder");
        }

        let untracked: Vec<_> = scan
            .images
            .iter()
            .filter(|file| !accounted.contains(&file.path))
            .collect();
        self.discover(&untracked, remove_unrecognized, &mut report, events);

        if remove_unrecognized {
            self.sweep(&scan.others, &mut report, events);
        }

        info!(
            checked = report.checked,
            pruned = report.pruned,
            updated = report.updated,
            superseded = report.superseded,
            discovered = report.discovered,
            conflicts = report.conflicts,
            swept = report.swept,
            errors = report.errors,
            "Refresh finished"
        );
        events.send(Event::Refresh(RefreshEvent::Completed {
            report: report.clone(),
        }));

        Ok(report)
    }

    /// Phase 1. Returns the absolute paths still backed by a record.
    fn prune_and_update(
        &self,
        remove_unrecognized: bool,
        report: &mut RefreshReport,
        events: &EventSender,
    ) -> Result<HashSet<PathBuf>> {
        let records = self.index.all()?;
        let total = records.len();
        events.send(Event::Refresh(RefreshEvent::PhaseChanged {
            phase: RefreshPhase::Pruning,
            total,
        }));

        let completed = AtomicUsize::new(0);
        let states: Vec<(Image, FileState)> = records
            .into_par_iter()
            .map(|image| {
                let path = self.store.absolute(image.relative_path());
                let state = self.file_state(&image, &path);

                events.send(Event::Refresh(RefreshEvent::Progress(ItemProgress {
                    completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                    current_path: path,
                })));
                (image, state)
            })
            .collect();

        let mut accounted = HashSet::with_capacity(states.len());
        for (image, state) in states {
            report.checked += 1;
            let path = self.store.absolute(image.relative_path());

            let applied = match state {
                FileState::Missing => self.index.delete(&image).map(|_| {
                    info!(path = %image.path, "Pruned record for missing file");
                    report.pruned += 1;
                }),
                FileState::Unchanged => {
                    accounted.insert(path);
                    Ok(())
                }
                FileState::Unreadable(e) => {
                    warn!(path = %image.path, error = %e, "Could not read indexed file");
                    report.errors += 1;
                    accounted.insert(path);
                    Ok(())
                }
                FileState::Changed { checksum, hash } => {
                    accounted.insert(path);
                    self.apply_change(&image, &checksum, hash.as_ref(), remove_unrecognized, report)
                }
            };

            if let Err(e) = applied {
                warn!(path = %image.path, error = %e, "Failed to reconcile record");
                report.errors += 1;
            }
        }

        Ok(accounted)
    }

    fn file_state(&self, image: &Image, path: &Path) -> FileState {
        if !path.is_file() {
            return FileState::Missing;
        }

        let checksum = match self.engine.checksum_file(path) {
            Ok(checksum) => checksum,
            Err(e) => return FileState::Unreadable(e),
        };
        if checksum == image.checksum {
            return FileState::Unchanged;
        }

        let hash = if self.engine.skips_perceptual() {
            None
        } else {
            self.fingerprint_file(path).ok()
        };
        FileState::Changed { checksum, hash }
    }

    fn apply_change(
        &self,
        image: &Image,
        checksum: &Checksum,
        hash: Option<&PerceptualHash>,
        remove_unrecognized: bool,
        report: &mut RefreshReport,
    ) -> std::result::Result<(), crate::error::IndexError> {
        if let Some(owner) = self.index.get_by_checksum(checksum)? {
            if owner.id != image.id {
                self.index.delete(image)?;
                report.superseded += 1;
                info!(path = %image.path, owner = %owner.path, "Changed file now duplicates another record");

                if remove_unrecognized {
                    if let Err(e) = self.store.soft_delete(image.relative_path()) {
                        warn!(path = %image.path, error = %e, "Failed to trash superseded file");
                        report.errors += 1;
                    }
                }
                return Ok(());
            }
        }

        self.index.update_fingerprints(image, checksum, None, hash)?;
        debug!(path = %image.path, "Updated fingerprints for changed file");
        report.updated += 1;
        Ok(())
    }

    /// Phase 2: run untracked images through the add pipeline
    fn discover(
        &self,
        untracked: &[&crate::core::scanner::ImageFile],
        remove_unrecognized: bool,
        report: &mut RefreshReport,
        events: &EventSender,
    ) {
        let total = untracked.len();
        events.send(Event::Refresh(RefreshEvent::PhaseChanged {
            phase: RefreshPhase::Discovering,
            total,
        }));

        let ingestor = Ingestor::new(self.engine, self.store, self.index);
        for (i, file) in untracked.iter().enumerate() {
            let request = AddRequest::from_path(&file.path)
                .tags(folder_components(&file.relative))
                .normalize(false)
                .trash_rejected(remove_unrecognized);

            match ingestor.add(request) {
                Ok(Outcome::Created(image)) | Ok(Outcome::Reused(image)) => {
                    debug!(path = %image.path, "Registered untracked file");
                    report.discovered += 1;
                }
                Ok(Outcome::Conflict { existing }) => {
                    info!(
                        path = %file.relative.display(),
                        existing = %existing.path,
                        "Untracked file duplicates a stored image"
                    );
                    report.conflicts += 1;
                }
                Ok(Outcome::Error(e)) => {
                    warn!(path = %file.relative.display(), error = %e, "Skipping unreadable image");
                    report.errors += 1;
                }
                Err(e) => {
                    warn!(path = %file.relative.display(), error = %e, "Failed to add untracked file");
                    report.errors += 1;
                }
            }

            events.send(Event::Refresh(RefreshEvent::Progress(ItemProgress {
                completed: i + 1,
                total,
                current_path: file.path.clone(),
            })));
        }
    }

    /// Phase 3: trash everything that is not a recognized image
    fn sweep(&self, others: &[PathBuf], report: &mut RefreshReport, events: &EventSender) {
        let total = others.len();
        events.send(Event::Refresh(RefreshEvent::PhaseChanged {
            phase: RefreshPhase::Sweeping,
            total,
        }));

        for (i, path) in others.iter().enumerate() {
            match self.store.soft_delete(path) {
                Ok(_) => {
                    info!(path = %path.display(), "Removed unrecognized file");
                    report.swept += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove unrecognized file");
                    report.errors += 1;
                }
            }

            events.send(Event::Refresh(RefreshEvent::Progress(ItemProgress {
                completed: i + 1,
                total,
                current_path: path.clone(),
            })));
        }
    }

    /// Fingerprint of the file's pixels as they would be stored
    fn fingerprint_file(&self, path: &Path) -> std::result::Result<PerceptualHash, HashError> {
        let bytes = fs::read(path).map_err(|e| HashError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let image = self.engine.decode(&bytes, path)?;
        let normalized = self.store.normalize_or_keep(&image, path);
        self.engine.perceptual_fingerprint(normalized.pixels(&image))
    }

    pub fn calculate_hash(&self, reset: bool, remove_unrecognized: bool) -> Result<RehashReport> {
        self.calculate_hash_with_events(reset, remove_unrecognized, &null_sender())
    }

    /// Fill in missing fingerprints, oldest record first, then refresh.
    ///
    /// A record whose fingerprint lands near an earlier record is deleted and
    /// its file trashed; unreadable or missing files lose their record.
    pub fn calculate_hash_with_events(
        &self,
        reset: bool,
        remove_unrecognized: bool,
        events: &EventSender,
    ) -> Result<RehashReport> {
        let mut report = RehashReport::default();

        if reset {
            report.cleared = self.index.clear_perceptual_hashes()?;
            info!(cleared = report.cleared, "Cleared fingerprints");
        }

        let pending = self.index.missing_perceptual_hash()?;
        let total = pending.len();
        events.send(Event::Rehash(RehashEvent::Started { total }));

        let completed = AtomicUsize::new(0);
        let states: Vec<(Image, HashState)> = pending
            .into_par_iter()
            .map(|image| {
                let path = self.store.absolute(image.relative_path());
                let state = if !path.is_file() {
                    HashState::Missing
                } else {
                    match self.fingerprint_file(&path) {
                        Ok(hash) => HashState::Hashed(hash),
                        Err(e) => HashState::Unreadable(e),
                    }
                };

                events.send(Event::Rehash(RehashEvent::Progress(ItemProgress {
                    completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                    current_path: path,
                })));
                (image, state)
            })
            .collect();

        // Serial so each decision sees the fingerprints stored before it
        for (image, state) in states {
            let applied = match state {
                HashState::Missing => self.index.delete(&image).map(|_| {
                    info!(path = %image.path, "Pruned record for missing file");
                    report.pruned += 1;
                }),
                HashState::Unreadable(e) => self.index.delete(&image).map(|_| {
                    warn!(path = %image.path, error = %e, "Dropped record for unreadable image");
                    report.unreadable += 1;
                }),
                HashState::Hashed(hash) => self.apply_fingerprint(&image, &hash, &mut report),
            };

            if let Err(e) = applied {
                warn!(path = %image.path, error = %e, "Failed to store fingerprint");
            }
        }

        info!(
            hashed = report.hashed,
            duplicates = report.duplicates,
            pruned = report.pruned,
            unreadable = report.unreadable,
            "Fingerprint rebuild finished"
        );
        events.send(Event::Rehash(RehashEvent::Completed {
            report: report.clone(),
        }));

        report.refresh = self.refresh_with_events(remove_unrecognized, events)?;
        Ok(report)
    }

    fn apply_fingerprint(
        &self,
        image: &Image,
        hash: &PerceptualHash,
        report: &mut RehashReport,
    ) -> std::result::Result<(), crate::error::IndexError> {
        let earlier = self
            .index
            .find_near(hash, self.engine.threshold())?
            .into_iter()
            .find(|other| other.id != image.id);

        match earlier {
            Some(other) => {
                self.index.delete(image)?;
                report.duplicates += 1;
                info!(path = %image.path, duplicate_of = %other.path, "Removed near-duplicate");
                if let Err(e) = self.store.soft_delete(image.relative_path()) {
                    warn!(path = %image.path, error = %e, "Failed to trash near-duplicate");
                }
            }
            None => {
                self.index.set_perceptual_hash(image, hash)?;
                report.hashed += 1;
            }
        }
        Ok(())
    }
}
