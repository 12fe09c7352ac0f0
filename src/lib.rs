//! # imshelf
//!
//! A personal image library that keeps one copy of every picture.
//!
//! ## Core Philosophy
//! - **One copy per image** - exact and near-duplicate fingerprints decide
//!   whether an incoming image is new
//! - **Disk is the truth** - a refresh re-derives the index from the folder
//! - **Nothing is hard-deleted** - rejected files go to a trash
//!
//! ## Architecture
//! - `core` - The library engine (store, index, ingest, refresh, watch)
//! - `config` - Startup configuration
//! - `events` - Progress reporting for batch jobs
//! - `error` - Error types with context

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use config::LibraryConfig;
pub use crate::core::{AddRequest, FilenameMatch, Image, Library, Outcome, SearchQuery};
pub use error::{LibraryError, Result};

/// Initialize tracing for the library
///
/// Called once by the binary. `RUST_LOG` wins; otherwise `verbose` picks
/// between `info` and `debug` for this crate.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "imshelf=debug" } else { "imshelf=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
