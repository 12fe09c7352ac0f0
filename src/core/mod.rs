//! # Core Module
//!
//! The front-end agnostic library engine.
//!
//! ## Modules
//! - `hasher` - Exact checksums and perceptual fingerprints
//! - `scanner` - Walks the managed folder
//! - `store` - Files under the managed folder: naming, normalization, trash
//! - `index` - SQLite records, tags and info
//! - `ingest` - The add pipeline and its duplicate decisions
//! - `refresh` - Reconciles the index with the file system
//! - `library` - Facade tying the pieces to one configuration
//! - `watcher` - Refresh on folder changes

pub mod hasher;
pub mod index;
pub mod ingest;
pub mod library;
pub mod refresh;
pub mod scanner;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use hasher::{Checksum, HashEngine, PerceptualHash};
pub use index::{Image, ImageExport, InfoMap, SearchQuery};
pub use ingest::{AddRequest, ImportReport, Outcome, OutcomeKind};
pub use library::{FilenameMatch, Library};
pub use refresh::{RefreshReport, RehashReport};
