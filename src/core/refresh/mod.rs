//! # Refresh Module
//!
//! Brings the index back in line with what is actually on disk.
//!
//! ## Phases
//! 1. **Prune/update** - drop records whose file is gone, re-fingerprint
//!    files whose content changed (checksums computed in parallel)
//! 2. **Discover** - add untracked images through the normal add pipeline,
//!    tagged with their folder names
//! 3. **Sweep** - optionally move non-image files out of the managed folder
//!
//! [`Reconciler::calculate_hash`] rebuilds missing perceptual fingerprints and
//! drops records that turn out to duplicate an earlier one.

mod reconciler;

pub use reconciler::Reconciler;

use serde::{Deserialize, Serialize};

/// What a refresh changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Records examined in the prune/update phase
    pub checked: usize,
    /// Records removed because their file is gone
    pub pruned: usize,
    /// Records whose content changed and were re-fingerprinted
    pub updated: usize,
    /// Changed records removed because the new content belongs to another record
    pub superseded: usize,
    /// New files registered
    pub discovered: usize,
    /// Untracked files rejected as duplicates
    pub conflicts: usize,
    /// Items skipped after an error (unreadable, undecodable, failed move)
    pub errors: usize,
    /// Non-image files moved to the trash
    pub swept: usize,
}

/// What a fingerprint rebuild changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehashReport {
    /// Fingerprints cleared up front
    pub cleared: usize,
    /// Fingerprints computed and stored
    pub hashed: usize,
    /// Records dropped because their file is gone
    pub pruned: usize,
    /// Records dropped because their file is not a readable image
    pub unreadable: usize,
    /// Records dropped (and files trashed) as near-duplicates of earlier records
    pub duplicates: usize,
    /// The refresh that runs afterwards
    pub refresh: RefreshReport,
}
