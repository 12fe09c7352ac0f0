//! # Ingest Module
//!
//! Decides what happens to one incoming image: stored as new, recognised as
//! already stored, or rejected as a duplicate of another record.
//!
//! ## Decision order
//! 1. Exact checksum match
//! 2. Near-duplicate fingerprint match (unless fingerprinting is skipped)
//! 3. Otherwise the file is placed and a record created
//!
//! A match that lives at the requested path means the same image was added
//! again (`Reused`). A match anywhere else is a `Conflict`; the existing record
//! wins and is touched, and a rejected path source can be soft-deleted.

mod pipeline;

pub use pipeline::{ImportReport, Ingestor};

use crate::core::index::Image;
use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the incoming image comes from
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// Raw file content, e.g. an upload
    Bytes(Vec<u8>),
    /// A file on disk; relocated when under the managed folder, copied otherwise
    Path(PathBuf),
}

/// One `add` call
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub source: ImportSource,
    pub tags: Vec<String>,
    /// Desired path relative to the managed folder
    pub filename: Option<PathBuf>,
    /// Skip near-duplicate detection for this image
    pub skip_hash: bool,
    /// Trim borders and shrink wide images before storing
    pub normalize: bool,
    /// Soft-delete a rejected path source
    pub trash_rejected: bool,
}

impl AddRequest {
    fn with_source(source: ImportSource) -> Self {
        Self {
            source,
            tags: Vec::new(),
            filename: None,
            skip_hash: false,
            normalize: true,
            trash_rejected: true,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_source(ImportSource::Bytes(bytes.into()))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(ImportSource::Path(path.into()))
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn skip_hash(mut self, skip: bool) -> Self {
        self.skip_hash = skip;
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn trash_rejected(mut self, trash: bool) -> Self {
        self.trash_rejected = trash;
        self
    }
}

/// Result of adding one image
#[derive(Debug)]
pub enum Outcome {
    /// Stored as a new record
    Created(Image),
    /// The same image was already stored at the requested path
    Reused(Image),
    /// A duplicate of an image stored elsewhere
    Conflict { existing: Image },
    /// Not a readable image; nothing was stored
    Error(HashError),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Created(_) => OutcomeKind::Created,
            Outcome::Reused(_) => OutcomeKind::Reused,
            Outcome::Conflict { .. } => OutcomeKind::Conflict,
            Outcome::Error(_) => OutcomeKind::Error,
        }
    }

    /// The record this outcome refers to, if any
    pub fn image(&self) -> Option<&Image> {
        match self {
            Outcome::Created(image) | Outcome::Reused(image) => Some(image),
            Outcome::Conflict { existing } => Some(existing),
            Outcome::Error(_) => None,
        }
    }
}

/// Payload-free [`Outcome`] for events and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    Created,
    Reused,
    Conflict,
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Created => write!(f, "created"),
            OutcomeKind::Reused => write!(f, "reused"),
            OutcomeKind::Conflict => write!(f, "duplicate"),
            OutcomeKind::Error => write!(f, "error"),
        }
    }
}
