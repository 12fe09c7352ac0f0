//! # Index Module
//!
//! Persistent record store for the library, backed by SQLite.
//!
//! ## Schema
//! - `image`: one row per stored file; `path` and `checksum` are unique
//! - `image_tag`: one row per (image, tag); removed with the image
//!
//! Timestamps are RFC 3339 text with microsecond precision so they sort
//! lexically. `info` is a JSON object of scalar values.
//!
//! ## Lookups
//! - Exact duplicates: unique checksum index
//! - Near duplicates: fingerprint equality (indexed) or a linear Hamming scan

mod models;
mod sqlite;

pub use models::{clean_tags, Image, ImageExport, InfoMap, SearchQuery};
pub use sqlite::ImageIndex;
