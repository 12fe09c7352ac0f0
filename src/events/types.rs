//! Event type definitions for progress reporting.

use crate::core::ingest::OutcomeKind;
use crate::core::refresh::{RefreshReport, RehashReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Folder walk events
    Scan(ScanEvent),
    /// Batch ingestion events
    Ingest(IngestEvent),
    /// Reconciliation events
    Refresh(RefreshEvent),
    /// Fingerprint rebuild events
    Rehash(RehashEvent),
    /// Folder watcher events
    Watcher(WatcherEvent),
}

/// Events from the folder watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WatcherEvent {
    /// Watcher started monitoring a folder
    Started { path: PathBuf },
    /// Watcher stopped monitoring a folder
    Stopped { path: PathBuf },
    /// Images changed; a refresh follows
    Changed { paths: Vec<PathBuf> },
    /// An error occurred
    Error { message: String },
}

/// Events while walking the managed folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { root: PathBuf },
    /// Progress update during scanning
    Progress(ScanProgress),
    /// An error occurred but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed {
        total_images: usize,
        other_files: usize,
    },
}

/// Progress information during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of directories scanned so far
    pub directories_scanned: usize,
    /// Number of images found so far
    pub images_found: usize,
    /// Current directory being scanned
    pub current_path: PathBuf,
}

/// Events during batch ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    /// Ingestion has started
    Started { total: usize },
    /// One item finished
    Progress(ItemProgress),
    /// Outcome of one item
    Outcome { path: PathBuf, kind: OutcomeKind },
    /// Ingestion completed
    Completed {
        created: usize,
        reused: usize,
        conflicts: usize,
        errors: usize,
    },
}

/// Per-item progress shared by batch jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Items processed so far
    pub completed: usize,
    /// Total items in this phase
    pub total: usize,
    /// Item just processed
    pub current_path: PathBuf,
}

/// Events during reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RefreshEvent {
    /// Moving to a new phase
    PhaseChanged { phase: RefreshPhase, total: usize },
    /// Progress within the current phase
    Progress(ItemProgress),
    /// Reconciliation completed
    Completed { report: RefreshReport },
}

/// Phases of reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshPhase {
    Pruning,
    Discovering,
    Sweeping,
}

impl std::fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshPhase::Pruning => write!(f, "Checking indexed files"),
            RefreshPhase::Discovering => write!(f, "Adding new files"),
            RefreshPhase::Sweeping => write!(f, "Removing unrecognized files"),
        }
    }
}

/// Events during a fingerprint rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RehashEvent {
    /// Rebuild has started
    Started { total: usize },
    /// Progress update
    Progress(ItemProgress),
    /// Rebuild completed (the trailing refresh reports separately)
    Completed { report: RehashReport },
}
