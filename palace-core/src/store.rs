//! Index store backed by SQLite with an FTS5 shadow index over chunk content.
//!
//! Only `files/chunks/symbols/relationships` reflect the current snapshot;
//! `scans` is append-only history. Each logical write runs in one
//! transaction, so a crash leaves either the previous or the new state
//! visible, never a partial mixture.

use crate::analyze::{Relationship, Symbol};
use crate::chunker::Chunk;
use crate::config::Guardrails;
use crate::fsutil;
use crate::stale::{self, FingerprintStatus};
use crate::PalaceError;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i32 = 1;

/// A file prepared for indexing: fingerprint plus all derivative rows.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// POSIX-relative, slash-normalized
    pub path: String,
    /// SHA-256 hex of raw bytes
    pub hash: String,
    pub size: u64,
    /// UTC unix seconds
    pub mod_time: i64,
    pub language: Option<String>,
    pub chunks: Vec<Chunk>,
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
}

/// Cheap fingerprint projection; never loads content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub hash: String,
    pub size: u64,
    pub mod_time: i64,
}

/// One full indexing pass. Append-only history row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scan {
    pub id: i64,
    pub root: String,
    pub scan_hash: String,
    pub started_at: i64,
    pub completed_at: i64,
}

/// Counts returned by a full snapshot write.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub scan_hash: String,
    pub file_count: usize,
    pub chunk_count: usize,
    pub symbol_count: usize,
    pub relationship_count: usize,
    pub started_at: i64,
    pub completed_at: i64,
}

/// Counts returned by an incremental application.
#[derive(Debug, Clone, Serialize)]
pub struct IncrementalScanSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeAction {
    Added,
    Modified,
    Deleted,
}

/// The unit consumed by incremental application.
#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileChangeAction,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
}

/// A full-text search hit over chunk content.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub path: String,
    pub chunk_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

/// A call-graph edge with the caller symbol joined in when known.
#[derive(Debug, Clone, Serialize)]
pub struct CallSite {
    pub source_file: String,
    pub target_file: Option<String>,
    pub caller: Option<String>,
    pub callee: String,
    pub kind: String,
    pub line: usize,
}

/// Index store at `<root>/.palace/index/palace.db`.
#[derive(Debug)]
pub struct IndexStore {
    root: PathBuf,
    conn: Connection,
}

impl IndexStore {
    /// Database path for a repo root.
    pub fn db_path(root: &Path) -> PathBuf {
        root.join(".palace").join("index").join("palace.db")
    }

    /// Initialize a new palace repository: write the default config, add
    /// `.palace/` to `.gitignore`, and create an empty database.
    pub fn init(root: &Path) -> crate::Result<()> {
        let palace_dir = root.join(".palace");
        let config_path = palace_dir.join("config.toml");

        if config_path.exists() {
            return Err(PalaceError::ConfigExists(config_path));
        }

        fs::create_dir_all(&palace_dir)?;
        fs::write(&config_path, crate::config::DEFAULT_CONFIG)?;

        update_gitignore(root)?;

        Self::open(root)?;
        Ok(())
    }

    /// Open or create the store for a repo root.
    pub fn open(root: &Path) -> crate::Result<Self> {
        let db_path = Self::db_path(root);
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// Open an existing store; a missing database is a distinct condition
    /// that is surfaced verbatim, never auto-recovered.
    pub fn open_existing(root: &Path) -> crate::Result<Self> {
        let db_path = Self::db_path(root);
        if !db_path.exists() {
            return Err(PalaceError::IndexMissing(db_path));
        }
        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        // WAL so one process's reader is not blocked by another's write
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version != 0 && version != SCHEMA_VERSION {
            return Err(PalaceError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS files (
                    path TEXT PRIMARY KEY,
                    hash TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    mod_time INTEGER NOT NULL,
                    indexed_at INTEGER NOT NULL,
                    language TEXT
                );

                CREATE TABLE IF NOT EXISTS chunks (
                    id INTEGER PRIMARY KEY,
                    path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                    chunk_index INTEGER NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    content TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);

                -- FTS5 shadow index over chunk content
                CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
                    content,
                    tokenize='unicode61'
                );
                CREATE TABLE IF NOT EXISTS chunk_fts_map (
                    fts_rowid INTEGER PRIMARY KEY,
                    chunk_id INTEGER REFERENCES chunks(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS symbols (
                    id INTEGER PRIMARY KEY,
                    file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    line_start INTEGER NOT NULL,
                    line_end INTEGER NOT NULL,
                    signature TEXT,
                    doc_comment TEXT,
                    exported INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);
                CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);

                CREATE TABLE IF NOT EXISTS relationships (
                    id INTEGER PRIMARY KEY,
                    source_file TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                    target_file TEXT,
                    target_symbol TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    line INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_symbol);
                CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_file);

                CREATE TABLE IF NOT EXISTS scans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    root TEXT NOT NULL,
                    scan_hash TEXT NOT NULL,
                    started_at INTEGER NOT NULL,
                    completed_at INTEGER NOT NULL
                );

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    /// Replace the current snapshot with the full record set and append a
    /// scans row. Idempotent in `scan_hash`; strictly increasing in scan id.
    pub fn write_scan(
        &mut self,
        records: &[FileRecord],
        started_at: i64,
    ) -> crate::Result<ScanSummary> {
        self.write_scan_inner(records, started_at)
            .map_err(|e| e.with_op("write_scan"))
    }

    fn write_scan_inner(
        &mut self,
        records: &[FileRecord],
        started_at: i64,
    ) -> crate::Result<ScanSummary> {
        let root = self.root.to_string_lossy().to_string();
        let scan_hash = compute_scan_hash(records);
        let now = now_unix();

        let tx = self.conn.transaction()?;

        // Children first so the cascade order never trips foreign keys
        tx.execute("DELETE FROM chunk_fts", [])?;
        tx.execute("DELETE FROM chunk_fts_map", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM symbols", [])?;
        tx.execute("DELETE FROM relationships", [])?;
        tx.execute("DELETE FROM files", [])?;

        let mut chunk_count = 0;
        let mut symbol_count = 0;
        let mut relationship_count = 0;
        for record in records {
            insert_record(&tx, record, now)?;
            chunk_count += record.chunks.len();
            symbol_count += record.symbols.len();
            relationship_count += record.relationships.len();
        }

        tx.execute(
            "INSERT INTO scans (root, scan_hash, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![root, scan_hash, started_at, now],
        )?;
        let scan_id = tx.last_insert_rowid();

        tx.commit()?;

        tracing::info!(
            scan_id,
            files = records.len(),
            chunks = chunk_count,
            "full scan written"
        );

        Ok(ScanSummary {
            scan_id,
            scan_hash,
            file_count: records.len(),
            chunk_count,
            symbol_count,
            relationship_count,
            started_at,
            completed_at: now,
        })
    }

    /// Apply a precomputed change list surgically, all in one transaction.
    /// Added/modified files get their derivative rows rebuilt via `assemble`;
    /// deleted files lose all derivative rows. Does not recompute `scan_hash`
    /// or append a `scans` row.
    pub fn incremental_scan<F>(
        &mut self,
        changes: &[FileChange],
        assemble: F,
    ) -> crate::Result<IncrementalScanSummary>
    where
        F: FnMut(&str) -> crate::Result<FileRecord>,
    {
        self.incremental_scan_inner(changes, assemble)
            .map_err(|e| e.with_op("incremental_scan"))
    }

    fn incremental_scan_inner<F>(
        &mut self,
        changes: &[FileChange],
        mut assemble: F,
    ) -> crate::Result<IncrementalScanSummary>
    where
        F: FnMut(&str) -> crate::Result<FileRecord>,
    {
        let start = Instant::now();
        let stored_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let now = now_unix();

        let mut added = 0;
        let mut modified = 0;
        let mut deleted = 0;

        let tx = self.conn.transaction()?;
        for change in changes {
            match change.action {
                FileChangeAction::Added | FileChangeAction::Modified => {
                    let record = assemble(&change.path)?;
                    delete_file_rows(&tx, &change.path)?;
                    insert_record(&tx, &record, now)?;
                    match change.action {
                        FileChangeAction::Added => added += 1,
                        _ => modified += 1,
                    }
                }
                FileChangeAction::Deleted => {
                    delete_file_rows(&tx, &change.path)?;
                    deleted += 1;
                }
            }
        }
        tx.commit()?;

        let unchanged = (stored_count as usize).saturating_sub(modified + deleted);
        tracing::info!(added, modified, deleted, unchanged, "incremental scan applied");

        Ok(IncrementalScanSummary {
            added,
            modified,
            deleted,
            unchanged,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Fingerprint projection of the current snapshot.
    pub fn load_file_metadata(&self) -> crate::Result<HashMap<String, FileMetadata>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, hash, size, mod_time FROM files")
            .map_err(PalaceError::from)
            .map_err(|e| e.with_op("load_file_metadata"))?;

        let rows = stmt.query_map([], |row| {
            let path: String = row.get(0)?;
            let hash: String = row.get(1)?;
            let size: i64 = row.get(2)?;
            let mod_time: i64 = row.get(3)?;
            Ok((
                path,
                FileMetadata {
                    hash,
                    size: size as u64,
                    mod_time,
                },
            ))
        })?;

        let mut map = HashMap::new();
        for row in rows {
            let (path, meta) = row?;
            map.insert(path, meta);
        }
        Ok(map)
    }

    /// Most recent scan, or the zero-value sentinel when none exists.
    pub fn latest_scan(&self) -> crate::Result<Scan> {
        let scan = self
            .conn
            .query_row(
                "SELECT id, root, scan_hash, started_at, completed_at
                 FROM scans ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(Scan {
                        id: row.get(0)?,
                        root: row.get(1)?,
                        scan_hash: row.get(2)?,
                        started_at: row.get(3)?,
                        completed_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(PalaceError::from)
            .map_err(|e| e.with_op("latest_scan"))?;
        Ok(scan.unwrap_or_default())
    }

    /// Full-text search over chunk content with literal-phrase semantics.
    /// The query is trimmed and quote-wrapped (internal quotes doubled) so
    /// FTS5 syntax never reaches the engine; an empty query yields no hits.
    pub fn search_chunks(&self, query: &str, limit: usize) -> crate::Result<Vec<ChunkHit>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let escaped = format!("\"{}\"", trimmed.replace('"', "\"\""));

        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.path, c.chunk_index, c.start_line, c.end_line, c.content
                 FROM chunk_fts f
                 JOIN chunk_fts_map m ON f.rowid = m.fts_rowid
                 JOIN chunks c ON m.chunk_id = c.id
                 WHERE f.content MATCH ?1
                 LIMIT ?2",
            )
            .map_err(PalaceError::from)
            .map_err(|e| e.with_op("search_chunks"))?;

        let hits = stmt
            .query_map(params![escaped, limit as i64], |row| {
                Ok(ChunkHit {
                    path: row.get(0)?,
                    chunk_index: row.get::<_, i64>(1)? as usize,
                    start_line: row.get::<_, i64>(2)? as usize,
                    end_line: row.get::<_, i64>(3)? as usize,
                    content: row.get(4)?,
                })
            })
            .map_err(PalaceError::from)
            .map_err(|e| e.with_op("search_chunks"))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(hits)
    }

    /// Call sites targeting the given symbol, ordered by (file, line).
    pub fn incoming_calls(&self, symbol: &str) -> crate::Result<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT r.source_file, r.target_file, r.target_symbol, r.kind, r.line,
                    (SELECT s.name FROM symbols s
                     WHERE s.file_path = r.source_file
                       AND r.line BETWEEN s.line_start AND s.line_end
                     ORDER BY (s.line_end - s.line_start) LIMIT 1)
             FROM relationships r
             WHERE r.target_symbol = ?1
             ORDER BY r.source_file, r.line",
            params![symbol],
        )
        .map_err(|e| e.with_op("incoming_calls"))
    }

    /// Call sites made from within the named symbol's body in `file`,
    /// ordered by line. Unknown symbols yield no results.
    pub fn outgoing_calls(&self, symbol: &str, file: &str) -> crate::Result<Vec<CallSite>> {
        self.outgoing_calls_inner(symbol, file)
            .map_err(|e| e.with_op("outgoing_calls"))
    }

    fn outgoing_calls_inner(&self, symbol: &str, file: &str) -> crate::Result<Vec<CallSite>> {
        let span: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT line_start, line_end FROM symbols
                 WHERE file_path = ?1 AND name = ?2
                 ORDER BY (line_end - line_start) LIMIT 1",
                params![file, symbol],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((line_start, line_end)) = span else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT source_file, target_file, target_symbol, kind, line
             FROM relationships
             WHERE source_file = ?1 AND line BETWEEN ?2 AND ?3
             ORDER BY source_file, line",
        )?;
        let caller = symbol.to_string();
        let sites = stmt
            .query_map(params![file, line_start, line_end], |row| {
                Ok(CallSite {
                    source_file: row.get(0)?,
                    target_file: row.get(1)?,
                    caller: None,
                    callee: row.get(2)?,
                    kind: row.get(3)?,
                    line: row.get::<_, i64>(4)? as usize,
                })
            })?
            .filter_map(|r| r.ok())
            .map(|mut site| {
                site.caller = Some(caller.clone());
                site
            })
            .collect();
        Ok(sites)
    }

    /// All call edges touching a file (as source or resolved target),
    /// ordered by (file, line).
    pub fn call_graph(&self, file: &str) -> crate::Result<Vec<CallSite>> {
        self.query_call_sites(
            "SELECT r.source_file, r.target_file, r.target_symbol, r.kind, r.line,
                    (SELECT s.name FROM symbols s
                     WHERE s.file_path = r.source_file
                       AND r.line BETWEEN s.line_start AND s.line_end
                     ORDER BY (s.line_end - s.line_start) LIMIT 1)
             FROM relationships r
             WHERE r.source_file = ?1 OR r.target_file = ?1
             ORDER BY r.source_file, r.line",
            params![file],
        )
        .map_err(|e| e.with_op("call_graph"))
    }

    fn query_call_sites(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> crate::Result<Vec<CallSite>> {
        let mut stmt = self.conn.prepare(sql)?;
        let sites = stmt
            .query_map(params, |row| {
                Ok(CallSite {
                    source_file: row.get(0)?,
                    target_file: row.get(1)?,
                    callee: row.get(2)?,
                    kind: row.get(3)?,
                    line: row.get::<_, i64>(4)? as usize,
                    caller: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(sites)
    }

    /// Walk the live tree and classify files against stored metadata:
    /// no stored entry means added, fingerprint drift means modified, stored
    /// paths absent from the filtered live tree mean deleted.
    pub fn detect_changes(&self, guardrails: &Guardrails) -> crate::Result<Vec<FileChange>> {
        let stored = self.load_file_metadata()?;
        let live = fsutil::list_files(&self.root, guardrails)?;
        let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();

        let mut changes = Vec::new();
        let mut vanished: HashSet<&str> = HashSet::new();
        for path in &live {
            let full_path = self.root.join(path);
            let stored_meta = stored.get(path);
            match stale::compare_metadata(&full_path, stored_meta)? {
                FingerprintStatus::Unchanged => {}
                FingerprintStatus::Added => changes.push(FileChange {
                    path: path.clone(),
                    action: FileChangeAction::Added,
                    old_hash: None,
                    new_hash: Some(fsutil::hash_file(&full_path)?),
                }),
                FingerprintStatus::Modified => changes.push(FileChange {
                    path: path.clone(),
                    action: FileChangeAction::Modified,
                    old_hash: stored_meta.map(|m| m.hash.clone()),
                    new_hash: Some(fsutil::hash_file(&full_path)?),
                }),
                // Disappeared between listing and stat: treat as deleted
                FingerprintStatus::Missing => {
                    vanished.insert(path.as_str());
                }
            }
        }

        for (path, meta) in &stored {
            if !live_set.contains(path.as_str()) || vanished.contains(path.as_str()) {
                changes.push(FileChange {
                    path: path.clone(),
                    action: FileChangeAction::Deleted,
                    old_hash: Some(meta.hash.clone()),
                    new_hash: None,
                });
            }
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    /// File/chunk/symbol/relationship counts plus database size, for status
    /// reporting.
    pub fn counts(&self) -> crate::Result<(usize, usize, usize, usize, u64)> {
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let chunks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let symbols: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let relationships: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        let db_size = fs::metadata(Self::db_path(&self.root))
            .map(|m| m.len())
            .unwrap_or(0);
        Ok((
            files as usize,
            chunks as usize,
            symbols as usize,
            relationships as usize,
            db_size,
        ))
    }
}

/// Current time as UTC unix seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Pure function of the set of (path, hash) pairs: order-independent, so
/// identical file sets always yield identical hashes.
pub fn compute_scan_hash(records: &[FileRecord]) -> String {
    let mut pairs: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.path.as_str(), r.hash.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (path, hash) in &pairs {
        hasher.update(format!("{}:{}\n", path, hash).as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn update_gitignore(root: &Path) -> crate::Result<()> {
    let gitignore_path = root.join(".gitignore");

    if gitignore_path.exists() {
        let content = fs::read_to_string(&gitignore_path)?;
        if !content
            .lines()
            .any(|line| line.trim() == ".palace" || line.trim() == ".palace/")
        {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            use std::io::Write;
            writeln!(file, "\n# Palace index\n.palace/")?;
        }
    } else {
        fs::write(&gitignore_path, "# Palace index\n.palace/\n")?;
    }

    Ok(())
}

fn insert_record(tx: &Transaction<'_>, record: &FileRecord, now: i64) -> crate::Result<()> {
    tx.execute(
        "INSERT INTO files (path, hash, size, mod_time, indexed_at, language)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.path,
            record.hash,
            record.size as i64,
            record.mod_time,
            now,
            record.language,
        ],
    )?;

    for chunk in &record.chunks {
        tx.execute(
            "INSERT INTO chunks (path, chunk_index, start_line, end_line, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.path,
                chunk.index as i64,
                chunk.start_line as i64,
                chunk.end_line as i64,
                chunk.content,
            ],
        )?;
        let chunk_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO chunk_fts (content) VALUES (?1)",
            params![chunk.content],
        )?;
        let fts_rowid = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO chunk_fts_map (fts_rowid, chunk_id) VALUES (?1, ?2)",
            params![fts_rowid, chunk_id],
        )?;
    }

    for symbol in &record.symbols {
        tx.execute(
            "INSERT INTO symbols (file_path, name, kind, line_start, line_end,
                                  signature, doc_comment, exported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.path,
                symbol.name,
                symbol.kind,
                symbol.line_start as i64,
                symbol.line_end as i64,
                symbol.signature,
                symbol.doc_comment,
                symbol.exported as i32,
            ],
        )?;
    }

    for relationship in &record.relationships {
        tx.execute(
            "INSERT INTO relationships (source_file, target_file, target_symbol, kind, line)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.path,
                relationship.target_file,
                relationship.target_symbol,
                relationship.kind,
                relationship.line as i64,
            ],
        )?;
    }

    Ok(())
}

/// Remove a file row and every derivative row, including FTS shadow rows
/// (which cascades cannot reach inside a virtual table).
fn delete_file_rows(tx: &Transaction<'_>, path: &str) -> crate::Result<()> {
    tx.execute(
        "DELETE FROM chunk_fts WHERE rowid IN (
            SELECT m.fts_rowid FROM chunk_fts_map m
            JOIN chunks c ON m.chunk_id = c.id
            WHERE c.path = ?1
        )",
        params![path],
    )?;
    tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{chunk_lines, ChunkBudget};
    use tempfile::TempDir;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            hash: fsutil::hash_bytes(content.as_bytes()),
            size: content.len() as u64,
            mod_time: 1_700_000_000,
            language: fsutil::language_for_path(path).map(String::from),
            chunks: chunk_lines(content, &[], &ChunkBudget::default()),
            symbols: Vec::new(),
            relationships: Vec::new(),
        }
    }

    fn symbol(name: &str, start: usize, end: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: "function".to_string(),
            line_start: start,
            line_end: end,
            signature: None,
            doc_comment: None,
            exported: true,
        }
    }

    fn call(target_symbol: &str, target_file: Option<&str>, line: usize) -> Relationship {
        Relationship {
            target_file: target_file.map(String::from),
            target_symbol: target_symbol.to_string(),
            kind: "call".to_string(),
            line,
        }
    }

    fn open_store(dir: &TempDir) -> IndexStore {
        IndexStore::open(dir.path()).unwrap()
    }

    #[test]
    fn test_open_existing_missing_db_is_distinct_error() {
        let dir = TempDir::new().unwrap();
        let err = IndexStore::open_existing(dir.path()).unwrap_err();
        assert!(matches!(err, PalaceError::IndexMissing(_)));
        assert!(err.to_string().contains("run a full scan first"));
    }

    #[test]
    fn test_write_scan_idempotent_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let records = vec![record("a.rs", "fn a() {}\n"), record("b.rs", "fn b() {}\n")];

        let first = store.write_scan(&records, now_unix()).unwrap();
        let second = store.write_scan(&records, now_unix()).unwrap();
        assert_eq!(first.scan_hash, second.scan_hash);
    }

    #[test]
    fn test_write_scan_order_independent_hash() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let forward = vec![record("a.rs", "fn a() {}\n"), record("b.rs", "fn b() {}\n")];
        let reversed: Vec<FileRecord> = forward.iter().rev().cloned().collect();

        let s1 = store.write_scan(&forward, now_unix()).unwrap();
        let s2 = store.write_scan(&reversed, now_unix()).unwrap();
        assert_eq!(s1.scan_hash, s2.scan_hash);
    }

    #[test]
    fn test_scan_ids_strictly_increase_and_latest_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let records = vec![record("a.rs", "fn a() {}\n")];

        let s1 = store.write_scan(&records, now_unix()).unwrap();
        let s2 = store.write_scan(&records, now_unix()).unwrap();
        let s3 = store.write_scan(&records, now_unix()).unwrap();
        assert!(s1.scan_id < s2.scan_id);
        assert!(s2.scan_id < s3.scan_id);
        assert_eq!(store.latest_scan().unwrap().id, s3.scan_id);
    }

    #[test]
    fn test_latest_scan_sentinel_when_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let scan = store.latest_scan().unwrap();
        assert_eq!(scan.id, 0);
        assert!(scan.scan_hash.is_empty());
    }

    #[test]
    fn test_write_scan_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store
            .write_scan(&[record("old.rs", "let old = 1;\n")], now_unix())
            .unwrap();
        store
            .write_scan(&[record("new.rs", "let new = 2;\n")], now_unix())
            .unwrap();

        let metadata = store.load_file_metadata().unwrap();
        assert!(!metadata.contains_key("old.rs"));
        assert!(metadata.contains_key("new.rs"));
        assert!(store.search_chunks("old", 10).unwrap().is_empty());
    }

    #[test]
    fn test_load_file_metadata_projection() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let rec = record("a.rs", "fn a() {}\n");
        store.write_scan(std::slice::from_ref(&rec), now_unix()).unwrap();

        let metadata = store.load_file_metadata().unwrap();
        let meta = metadata.get("a.rs").unwrap();
        assert_eq!(meta.hash, rec.hash);
        assert_eq!(meta.size, rec.size);
        assert_eq!(meta.mod_time, rec.mod_time);
    }

    #[test]
    fn test_search_chunks_single_hit() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .write_scan(&[record("greeting.txt", "hello world\nsecond line\n")], now_unix())
            .unwrap();

        let hits = store.search_chunks("hello world", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "greeting.txt");
        assert_eq!(hits[0].start_line, 1);
    }

    #[test]
    fn test_search_chunks_empty_query_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .write_scan(&[record("a.txt", "content\n")], now_unix())
            .unwrap();
        assert!(store.search_chunks("", 5).unwrap().is_empty());
        assert!(store.search_chunks("   ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_chunks_quotes_do_not_break_query() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .write_scan(
                &[record("a.rs", "let s = \"quoted value\";\n")],
                now_unix(),
            )
            .unwrap();
        // FTS5 operators and quotes must be treated literally, not as syntax
        let hits = store.search_chunks("\"quoted value\"", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search_chunks("NOT AND (", 5).is_ok());
    }

    #[test]
    fn test_search_chunks_respects_limit() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let records: Vec<FileRecord> = (0..10)
            .map(|i| record(&format!("f{}.txt", i), "needle in haystack\n"))
            .collect();
        store.write_scan(&records, now_unix()).unwrap();

        let hits = store.search_chunks("needle", 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_incremental_scan_applies_changes() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .write_scan(
                &[record("keep.rs", "fn keep() {}\n"), record("drop.rs", "fn drop_me() {}\n")],
                now_unix(),
            )
            .unwrap();

        let changes = vec![
            FileChange {
                path: "new.rs".to_string(),
                action: FileChangeAction::Added,
                old_hash: None,
                new_hash: Some("h".to_string()),
            },
            FileChange {
                path: "keep.rs".to_string(),
                action: FileChangeAction::Modified,
                old_hash: Some("old".to_string()),
                new_hash: Some("new".to_string()),
            },
            FileChange {
                path: "drop.rs".to_string(),
                action: FileChangeAction::Deleted,
                old_hash: Some("old".to_string()),
                new_hash: None,
            },
        ];

        let summary = store
            .incremental_scan(&changes, |path| {
                Ok(match path {
                    "new.rs" => record("new.rs", "fn brand_new() {}\n"),
                    _ => record("keep.rs", "fn keep_v2() {}\n"),
                })
            })
            .unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.unchanged, 0);

        let metadata = store.load_file_metadata().unwrap();
        assert!(metadata.contains_key("new.rs"));
        assert!(!metadata.contains_key("drop.rs"));
        assert_eq!(store.search_chunks("brand_new", 5).unwrap().len(), 1);
        assert_eq!(store.search_chunks("keep_v2", 5).unwrap().len(), 1);
        assert!(store.search_chunks("drop_me", 5).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_scan_rolls_back_on_midbatch_failure() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .write_scan(&[record("keep.rs", "fn keep() {}\n")], now_unix())
            .unwrap();

        // The delete lands in the transaction before the add fails; the
        // whole batch must roll back, leaving the prior snapshot intact
        let changes = vec![
            FileChange {
                path: "keep.rs".to_string(),
                action: FileChangeAction::Deleted,
                old_hash: Some("old".to_string()),
                new_hash: None,
            },
            FileChange {
                path: "new.rs".to_string(),
                action: FileChangeAction::Added,
                old_hash: None,
                new_hash: Some("h".to_string()),
            },
        ];
        let result = store.incremental_scan(&changes, |path| match path {
            "new.rs" => Err(PalaceError::FileVanished(dir.path().join("new.rs"))),
            _ => Ok(record(path, "unused\n")),
        });
        assert!(result.is_err());

        let metadata = store.load_file_metadata().unwrap();
        assert!(metadata.contains_key("keep.rs"));
        assert!(!metadata.contains_key("new.rs"));
        assert_eq!(store.search_chunks("keep", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_incremental_scan_does_not_append_scan_row() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let s1 = store
            .write_scan(&[record("a.rs", "fn a() {}\n")], now_unix())
            .unwrap();

        store
            .incremental_scan(
                &[FileChange {
                    path: "b.rs".to_string(),
                    action: FileChangeAction::Added,
                    old_hash: None,
                    new_hash: Some("h".to_string()),
                }],
                |_| Ok(record("b.rs", "fn b() {}\n")),
            )
            .unwrap();

        let latest = store.latest_scan().unwrap();
        assert_eq!(latest.id, s1.scan_id);
        assert_eq!(latest.scan_hash, s1.scan_hash);
    }

    #[test]
    fn test_detect_changes_classification() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("same.rs"), "fn same() {}\n").unwrap();
        std::fs::write(dir.path().join("touched.rs"), "fn touched() {}\n").unwrap();

        let mut store = open_store(&dir);
        let mut same = record("same.rs", "fn same() {}\n");
        let same_fp = fsutil::fingerprint(&dir.path().join("same.rs")).unwrap();
        same.mod_time = same_fp.mod_time;
        same.size = same_fp.size;
        same.hash = same_fp.hash;

        let mut touched = record("touched.rs", "fn touched() {}\n");
        let touched_fp = fsutil::fingerprint(&dir.path().join("touched.rs")).unwrap();
        touched.hash = touched_fp.hash;
        touched.size = touched_fp.size;
        touched.mod_time = touched_fp.mod_time - 100; // stored mtime drifted

        let gone = record("gone.rs", "fn gone() {}\n");
        store.write_scan(&[same, touched, gone], now_unix()).unwrap();

        std::fs::write(dir.path().join("fresh.rs"), "fn fresh() {}\n").unwrap();

        let changes = store.detect_changes(&Guardrails::empty()).unwrap();
        let by_path: HashMap<&str, FileChangeAction> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.action))
            .collect();

        assert_eq!(by_path.get("fresh.rs"), Some(&FileChangeAction::Added));
        assert_eq!(by_path.get("touched.rs"), Some(&FileChangeAction::Modified));
        assert_eq!(by_path.get("gone.rs"), Some(&FileChangeAction::Deleted));
        assert!(!by_path.contains_key("same.rs"));
    }

    #[test]
    fn test_detect_changes_respects_guardrails() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
        std::fs::write(dir.path().join("vendor/dep.rs"), "x\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

        let store = open_store(&dir);
        let guardrails = Guardrails::new(&["vendor/**".to_string()], &[]).unwrap();
        let changes = store.detect_changes(&guardrails).unwrap();
        assert!(changes.iter().all(|c| !c.path.starts_with("vendor/")));
        assert!(changes.iter().any(|c| c.path == "main.rs"));
    }

    #[test]
    fn test_call_graph_queries() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let mut lib = record("lib.rs", "fn helper() {}\nfn util() {}\n");
        lib.symbols = vec![symbol("helper", 1, 1), symbol("util", 2, 2)];

        let mut main = record(
            "main.rs",
            "fn main() {\n    helper();\n    util();\n}\n",
        );
        main.symbols = vec![symbol("main", 1, 4)];
        main.relationships = vec![
            call("helper", Some("lib.rs"), 2),
            call("util", Some("lib.rs"), 3),
        ];

        store.write_scan(&[lib, main], now_unix()).unwrap();

        let incoming = store.incoming_calls("helper").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_file, "main.rs");
        assert_eq!(incoming[0].line, 2);
        assert_eq!(incoming[0].caller.as_deref(), Some("main"));

        let outgoing = store.outgoing_calls("main", "main.rs").unwrap();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].callee, "helper");
        assert_eq!(outgoing[1].callee, "util");
        assert_eq!(outgoing[0].caller.as_deref(), Some("main"));

        let graph = store.call_graph("lib.rs").unwrap();
        assert_eq!(graph.len(), 2, "edges resolved into lib.rs");

        assert!(store.outgoing_calls("nonexistent", "main.rs").unwrap().is_empty());
    }

    #[test]
    fn test_compute_scan_hash_pure_and_order_free() {
        let a = record("a.rs", "a\n");
        let b = record("b.rs", "b\n");
        let h1 = compute_scan_hash(&[a.clone(), b.clone()]);
        let h2 = compute_scan_hash(&[b, a]);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }
}
