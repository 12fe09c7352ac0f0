//! SQLite-backed image index.

use super::models::{clean_tags, Image, InfoMap, SearchQuery};
use crate::core::hasher::{is_within, Checksum, PerceptualHash};
use crate::error::IndexError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const IMAGE_COLUMNS: &str =
    "id, path, checksum, source_checksum, perceptual_hash, created, modified, info";

/// Persistent record store
///
/// Uses WAL (Write-Ahead Logging) mode. The connection sits behind a mutex so
/// there is exactly one writer; every mutation commits on its own.
pub struct ImageIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

/// Row as stored, before decoding
struct RawImage {
    id: i64,
    path: String,
    checksum: String,
    source_checksum: Option<String>,
    perceptual_hash: Option<String>,
    created: String,
    modified: String,
    info: String,
}

impl RawImage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            checksum: row.get(2)?,
            source_checksum: row.get(3)?,
            perceptual_hash: row.get(4)?,
            created: row.get(5)?,
            modified: row.get(6)?,
            info: row.get(7)?,
        })
    }

    fn into_image(self, tags: BTreeSet<String>) -> Result<Image, IndexError> {
        let perceptual_hash = self
            .perceptual_hash
            .as_deref()
            .map(PerceptualHash::from_hex)
            .transpose()
            .map_err(|e| IndexError::CorruptValue {
                column: "perceptual_hash",
                reason: e.to_string(),
            })?;

        Ok(Image {
            id: self.id,
            path: self.path,
            checksum: Checksum::from_hex(self.checksum),
            source_checksum: self.source_checksum.map(Checksum::from_hex),
            perceptual_hash,
            created: parse_timestamp("created", &self.created)?,
            modified: parse_timestamp("modified", &self.modified)?,
            tags,
            info_json: self.info,
        })
    }
}

/// Fixed-width RFC 3339 so text order equals time order
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, text: &str) -> Result<DateTime<Utc>, IndexError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| IndexError::CorruptValue {
            column,
            reason: format!("{text}: {e}"),
        })
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` substring pattern
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl ImageIndex {
    /// Open or create an index database at the given path
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| IndexError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_connection(conn, path.to_path_buf())
    }

    /// Throwaway index for tests and dry runs
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory().map_err(|e| IndexError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self, IndexError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             CREATE TABLE IF NOT EXISTS image (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 path TEXT NOT NULL UNIQUE,
                 checksum TEXT NOT NULL UNIQUE,
                 source_checksum TEXT,
                 perceptual_hash TEXT,
                 created TEXT NOT NULL,
                 modified TEXT NOT NULL,
                 info TEXT NOT NULL DEFAULT '{}'
             );
             CREATE INDEX IF NOT EXISTS idx_image_phash ON image(perceptual_hash);
             CREATE INDEX IF NOT EXISTS idx_image_modified ON image(modified);
             CREATE TABLE IF NOT EXISTS image_tag (
                 image_id INTEGER NOT NULL REFERENCES image(id) ON DELETE CASCADE,
                 tag TEXT NOT NULL,
                 PRIMARY KEY (image_id, tag)
             );
             CREATE INDEX IF NOT EXISTS idx_image_tag_tag ON image_tag(tag);",
        )?;
        Self::migrate(&conn)?;

        debug!(path = %db_path.display(), "Opened image index");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Bring indexes created by older versions up to the current schema
    fn migrate(conn: &Connection) -> Result<(), IndexError> {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('image')")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;

        if !columns.contains("source_checksum") {
            conn.execute("ALTER TABLE image ADD COLUMN source_checksum TEXT", [])?;
            debug!("Added source_checksum column");
        }
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_image_source_checksum ON image(source_checksum)",
            [],
        )?;
        Ok(())
    }

    /// Database location; `:memory:` for in-memory indexes
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::Poisoned {
            path: self.db_path.clone(),
        })
    }

    fn tags_for(conn: &Connection, id: i64) -> Result<BTreeSet<String>, IndexError> {
        let mut stmt = conn.prepare_cached("SELECT tag FROM image_tag WHERE image_id = ?")?;
        let tags = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(tags)
    }

    fn all_tags(conn: &Connection) -> Result<HashMap<i64, BTreeSet<String>>, IndexError> {
        let mut stmt = conn.prepare_cached("SELECT image_id, tag FROM image_tag")?;
        let mut rows = stmt.query([])?;
        let mut tags: HashMap<i64, BTreeSet<String>> = HashMap::new();
        while let Some(row) = rows.next()? {
            tags.entry(row.get(0)?).or_default().insert(row.get(1)?);
        }
        Ok(tags)
    }

    /// Run a single-image query and attach its tags
    fn query_one(
        conn: &Connection,
        filter: &str,
        param: &dyn rusqlite::ToSql,
    ) -> Result<Option<Image>, IndexError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM image WHERE {filter}");
        let raw = conn
            .query_row(&sql, [param], RawImage::from_row)
            .optional()?;

        match raw {
            Some(raw) => {
                let tags = Self::tags_for(conn, raw.id)?;
                Ok(Some(raw.into_image(tags)?))
            }
            None => Ok(None),
        }
    }

    /// Run a multi-image query and attach tags from one pass over the tag table
    fn query_many(
        conn: &Connection,
        sql: &str,
        params: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<Image>, IndexError> {
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params_from_iter(params.iter()), RawImage::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tags = Self::all_tags(conn)?;
        raws.into_iter()
            .map(|raw| {
                let image_tags = tags.remove(&raw.id).unwrap_or_default();
                raw.into_image(image_tags)
            })
            .collect()
    }

    fn reload(conn: &Connection, id: i64) -> Result<Image, IndexError> {
        Self::query_one(conn, "id = ?", &id)?.ok_or_else(|| IndexError::NotFound {
            path: PathBuf::from(format!("#{id}")),
        })
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Image>, IndexError> {
        let conn = self.lock()?;
        Self::query_one(&conn, "id = ?", &id)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<Image>, IndexError> {
        let conn = self.lock()?;
        Self::query_one(&conn, "path = ?", &path)
    }

    /// Exact-content lookup: the stored bytes, or the bytes a record was
    /// normalized from
    pub fn get_by_checksum(&self, checksum: &Checksum) -> Result<Option<Image>, IndexError> {
        let conn = self.lock()?;
        if let Some(image) = Self::query_one(&conn, "checksum = ?1", &checksum.as_str())? {
            return Ok(Some(image));
        }
        Self::query_one(
            &conn,
            "source_checksum = ?1 ORDER BY id LIMIT 1",
            &checksum.as_str(),
        )
    }

    /// Images whose fingerprint is within `threshold` of `hash`, closest first.
    ///
    /// `threshold == 0` is an indexed equality lookup; anything else scans
    /// every fingerprint.
    pub fn find_near(&self, hash: &PerceptualHash, threshold: u32) -> Result<Vec<Image>, IndexError> {
        let conn = self.lock()?;

        if threshold == 0 {
            let sql = format!(
                "SELECT {IMAGE_COLUMNS} FROM image WHERE perceptual_hash = ? ORDER BY id"
            );
            let params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(hash.to_hex())];
            return Self::query_many(&conn, &sql, &params);
        }

        let mut stmt = conn.prepare_cached(
            "SELECT id, perceptual_hash FROM image WHERE perceptual_hash IS NOT NULL",
        )?;
        let candidates = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut matches: Vec<(u32, i64)> = candidates
            .into_iter()
            .filter_map(|(id, hex)| match PerceptualHash::from_hex(&hex) {
                Ok(other) => is_within(hash, &other, threshold).then(|| (hash.distance(&other), id)),
                Err(e) => {
                    warn!(id, error = %e, "Skipping record with corrupt fingerprint");
                    None
                }
            })
            .collect();
        matches.sort();

        matches
            .into_iter()
            .map(|(_, id)| Self::reload(&conn, id))
            .collect()
    }

    /// Insert a new record; `created` and `modified` are now.
    ///
    /// `source` is the checksum of the submitted bytes when they were
    /// normalized before storing.
    pub fn create<S: AsRef<str>>(
        &self,
        path: &str,
        checksum: &Checksum,
        source: Option<&Checksum>,
        hash: Option<&PerceptualHash>,
        tags: &[S],
    ) -> Result<Image, IndexError> {
        let mut conn = self.lock()?;
        let now = format_timestamp(Utc::now());

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO image (path, checksum, source_checksum, perceptual_hash, created, modified, info)
             VALUES (?, ?, ?, ?, ?, ?, '{}')",
            params![
                path,
                checksum.as_str(),
                source.map(Checksum::as_str),
                hash.map(|h| h.to_hex()),
                now,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        for tag in clean_tags(tags) {
            tx.execute(
                "INSERT OR IGNORE INTO image_tag (image_id, tag) VALUES (?, ?)",
                params![id, tag],
            )?;
        }
        tx.commit()?;

        debug!(id, path, "Created image record");
        Self::reload(&conn, id)
    }

    /// Union `add`, then subtract `remove`
    pub fn update_tags<A: AsRef<str>, R: AsRef<str>>(
        &self,
        image: &Image,
        add: &[A],
        remove: &[R],
    ) -> Result<Image, IndexError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for tag in clean_tags(add) {
            tx.execute(
                "INSERT OR IGNORE INTO image_tag (image_id, tag) VALUES (?, ?)",
                params![image.id, tag],
            )?;
        }
        for tag in clean_tags(remove) {
            tx.execute(
                "DELETE FROM image_tag WHERE image_id = ? AND tag = ?",
                params![image.id, tag],
            )?;
        }
        tx.commit()?;
        Self::reload(&conn, image.id)
    }

    /// Merge scalar values into the info mapping, then drop `remove_keys`
    pub fn update_info<S: AsRef<str>>(
        &self,
        image: &Image,
        merge: &InfoMap,
        remove_keys: &[S],
    ) -> Result<Image, IndexError> {
        if let Some((key, _)) = merge
            .iter()
            .find(|(_, v)| matches!(v, Value::Array(_) | Value::Object(_)))
        {
            return Err(IndexError::NonScalarInfo { key: key.clone() });
        }

        let conn = self.lock()?;
        let current: String =
            conn.query_row("SELECT info FROM image WHERE id = ?", [image.id], |row| {
                row.get(0)
            })?;
        let mut info: InfoMap =
            serde_json::from_str(&current).map_err(|e| IndexError::CorruptValue {
                column: "info",
                reason: e.to_string(),
            })?;
        for (key, value) in merge {
            info.insert(key.clone(), value.clone());
        }
        for key in remove_keys {
            info.remove(key.as_ref());
        }

        let text = serde_json::to_string(&info).map_err(|e| IndexError::CorruptValue {
            column: "info",
            reason: e.to_string(),
        })?;
        conn.execute(
            "UPDATE image SET info = ? WHERE id = ?",
            params![text, image.id],
        )?;
        Self::reload(&conn, image.id)
    }

    /// Set `modified` to `at`, or now
    pub fn touch(&self, image: &Image, at: Option<DateTime<Utc>>) -> Result<Image, IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE image SET modified = ? WHERE id = ?",
            params![format_timestamp(at.unwrap_or_else(Utc::now)), image.id],
        )?;
        Self::reload(&conn, image.id)
    }

    /// Record new content: both fingerprints and a fresh `modified`
    pub fn update_fingerprints(
        &self,
        image: &Image,
        checksum: &Checksum,
        source: Option<&Checksum>,
        hash: Option<&PerceptualHash>,
    ) -> Result<Image, IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE image SET checksum = ?, source_checksum = ?, perceptual_hash = ?, modified = ?
             WHERE id = ?",
            params![
                checksum.as_str(),
                source.map(Checksum::as_str),
                hash.map(|h| h.to_hex()),
                format_timestamp(Utc::now()),
                image.id
            ],
        )?;
        Self::reload(&conn, image.id)
    }

    pub fn set_perceptual_hash(&self, image: &Image, hash: &PerceptualHash) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE image SET perceptual_hash = ? WHERE id = ?",
            params![hash.to_hex(), image.id],
        )?;
        Ok(())
    }

    /// Forget every fingerprint; returns how many were cleared
    pub fn clear_perceptual_hashes(&self) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let cleared = conn.execute(
            "UPDATE image SET perceptual_hash = NULL WHERE perceptual_hash IS NOT NULL",
            [],
        )?;
        Ok(cleared)
    }

    pub fn update_path(&self, image: &Image, path: &str) -> Result<Image, IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE image SET path = ? WHERE id = ?",
            params![path, image.id],
        )?;
        Self::reload(&conn, image.id)
    }

    /// Remove a record and its tags
    pub fn delete(&self, image: &Image) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM image WHERE id = ?", [image.id])?;
        debug!(id = image.id, path = %image.path, "Deleted image record");
        Ok(())
    }

    /// Every record, ascending id
    pub fn all(&self) -> Result<Vec<Image>, IndexError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM image ORDER BY id");
        Self::query_many(&conn, &sql, &[])
    }

    /// Records without a fingerprint, ascending id
    pub fn missing_perceptual_hash(&self) -> Result<Vec<Image>, IndexError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM image WHERE perceptual_hash IS NULL ORDER BY id"
        );
        Self::query_many(&conn, &sql, &[])
    }

    pub fn count(&self) -> Result<usize, IndexError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM image", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Filtered records, most recently modified first
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Image>, IndexError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(filename) = query.filename.as_deref().filter(|f| !f.is_empty()) {
            clauses.push("path LIKE ? ESCAPE '\\'");
            params.push(Box::new(like_pattern(filename)));
        }
        for tag in query.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            clauses.push(
                "EXISTS (SELECT 1 FROM image_tag t WHERE t.image_id = image.id \
                 AND t.tag LIKE ? ESCAPE '\\')",
            );
            params.push(Box::new(like_pattern(tag)));
        }
        for (key, value) in &query.info {
            clauses.push(
                "json_type(info, ?) IS NOT NULL \
                 AND CAST(json_extract(info, ?) AS TEXT) LIKE ? ESCAPE '\\'",
            );
            let json_path = format!("$.\"{}\"", key.replace('"', ""));
            params.push(Box::new(json_path.clone()));
            params.push(Box::new(json_path));
            params.push(Box::new(like_pattern(value)));
        }
        if let Some(since) = query.since {
            clauses.push("modified >= ?");
            params.push(Box::new(format_timestamp(since)));
        }
        if let Some(until) = query.until {
            clauses.push("modified <= ?");
            params.push(Box::new(format_timestamp(until)));
        }

        let mut sql = format!("SELECT {IMAGE_COLUMNS} FROM image");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY modified DESC, id DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.lock()?;
        Self::query_many(&conn, &sql, &params)
    }
}
