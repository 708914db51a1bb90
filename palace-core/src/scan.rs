//! Scan orchestration: assemble file records, write them to the store, and
//! emit the `scan.json` audit artifact.

use crate::analyze::{Analyzer, NullAnalyzer};
use crate::chunker::{self, ChunkBudget};
use crate::config::Config;
use crate::fsutil;
use crate::store::{
    now_unix, FileRecord, IncrementalScanSummary, IndexStore, ScanSummary,
};
use crate::PalaceError;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Schema version of the `scan.json` audit artifact.
const AUDIT_SCHEMA_VERSION: u32 = 1;

/// Drives full and incremental scans for one repository root.
pub struct Scanner {
    root: PathBuf,
    config: Config,
    analyzer: Box<dyn Analyzer>,
}

/// The `scan.json` audit record written next to the database after every
/// full scan.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAudit {
    pub schema_version: u32,
    pub kind: String,
    pub scan_id: String,
    pub db_scan_id: i64,
    pub started_at: String,
    pub completed_at: String,
    pub file_count: usize,
    pub chunk_count: usize,
    pub symbol_count: usize,
    pub relationship_count: usize,
    pub scan_hash: String,
    pub provenance: String,
}

impl Scanner {
    /// Build a scanner with the root's on-disk config (or defaults) and no
    /// symbol analysis.
    pub fn new(root: &Path) -> crate::Result<Self> {
        Self::with_analyzer(root, Box::new(NullAnalyzer))
    }

    pub fn with_analyzer(root: &Path, analyzer: Box<dyn Analyzer>) -> crate::Result<Self> {
        let config = Config::load_for_root(root)?;
        Ok(Scanner {
            root: root.to_path_buf(),
            config,
            analyzer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full scan: walk the guardrail-filtered tree, assemble every record,
    /// replace the snapshot in one transaction, and write the audit artifact.
    pub fn run_full(&self) -> crate::Result<ScanSummary> {
        let guardrails = self.config.guardrails()?;
        let files = fsutil::list_files(&self.root, &guardrails)?;
        let started_at = now_unix();

        tracing::info!(files = files.len(), root = %self.root.display(), "full scan started");

        let records: Vec<FileRecord> = files
            .par_iter()
            .map(|path| self.assemble_record(path))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut store = IndexStore::open(&self.root)?;
        let summary = store.write_scan(&records, started_at)?;
        self.write_audit(&summary)?;

        Ok(summary)
    }

    /// Incremental scan: diff the live tree against the stored snapshot and
    /// apply only the changed files, all in one transaction. Requires an
    /// existing index.
    pub fn run_incremental(&self) -> crate::Result<IncrementalScanSummary> {
        let guardrails = self.config.guardrails()?;
        let mut store = IndexStore::open_existing(&self.root)?;
        let changes = store.detect_changes(&guardrails)?;
        store.incremental_scan(&changes, |path| self.assemble_record(path))
    }

    /// Read, fingerprint, and chunk one file into its index record. A file
    /// that disappears between listing and read is a hard failure.
    fn assemble_record(&self, path: &str) -> crate::Result<FileRecord> {
        let full_path = self.root.join(path);
        let bytes = match fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PalaceError::FileVanished(full_path));
            }
            Err(e) => return Err(e.into()),
        };
        let (size, mod_time) = fsutil::stat_file(&full_path)?;
        let hash = fsutil::hash_bytes(&bytes);

        let content = String::from_utf8_lossy(&bytes);
        let analysis = self.analyzer.analyze(path, &content);
        let budget = ChunkBudget {
            max_lines: self.config.chunking.max_lines,
            max_bytes: self.config.chunking.max_bytes,
        };
        let chunks = chunker::chunk_lines(&content, &analysis.boundaries, &budget);

        Ok(FileRecord {
            path: path.to_string(),
            hash,
            size,
            mod_time,
            language: fsutil::language_for_path(path).map(String::from),
            chunks,
            symbols: analysis.symbols,
            relationships: analysis.relationships,
        })
    }

    fn write_audit(&self, summary: &ScanSummary) -> crate::Result<()> {
        let audit = ScanAudit {
            schema_version: AUDIT_SCHEMA_VERSION,
            kind: "full".to_string(),
            scan_id: Uuid::new_v4().to_string(),
            db_scan_id: summary.scan_id,
            started_at: format_rfc3339(summary.started_at),
            completed_at: format_rfc3339(summary.completed_at),
            file_count: summary.file_count,
            chunk_count: summary.chunk_count,
            symbol_count: summary.symbol_count,
            relationship_count: summary.relationship_count,
            scan_hash: summary.scan_hash.clone(),
            provenance: format!("palace {}", env!("CARGO_PKG_VERSION")),
        };

        let path = audit_path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&audit)?)?;
        Ok(())
    }
}

/// Path of the audit artifact for a repo root.
pub fn audit_path(root: &Path) -> PathBuf {
    root.join(".palace").join("index").join("scan.json")
}

fn format_rfc3339(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| unix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_full_scan_indexes_tree_and_writes_audit() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "src/main.rs", "fn main() {}\n");
        write_file(dir.path(), "README.md", "# readme\n");

        let scanner = Scanner::new(dir.path()).unwrap();
        let summary = scanner.run_full().unwrap();
        assert_eq!(summary.file_count, 2);
        assert!(summary.chunk_count >= 2);
        assert_eq!(summary.scan_id, 1);

        let audit: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(audit_path(dir.path())).unwrap()).unwrap();
        assert_eq!(audit["schemaVersion"], 1);
        assert_eq!(audit["kind"], "full");
        assert_eq!(audit["fileCount"], 2);
        assert_eq!(audit["dbScanId"], 1);
        assert_eq!(audit["scanHash"], summary.scan_hash);
        assert!(audit["startedAt"].as_str().unwrap().contains('T'));
        assert!(Uuid::parse_str(audit["scanId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_full_scan_skips_guardrailed_directories() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "src/lib.rs", "pub fn a() {}\n");
        write_file(dir.path(), "node_modules/dep/index.js", "x\n");

        let summary = Scanner::new(dir.path()).unwrap().run_full().unwrap();
        assert_eq!(summary.file_count, 1);
    }

    #[test]
    fn test_empty_file_indexed_with_zero_chunks() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "empty.rs", "");

        let scanner = Scanner::new(dir.path()).unwrap();
        let summary = scanner.run_full().unwrap();
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.chunk_count, 0);

        let store = IndexStore::open_existing(dir.path()).unwrap();
        let metadata = store.load_file_metadata().unwrap();
        assert!(metadata.contains_key("empty.rs"));
    }

    #[test]
    fn test_rescan_of_unchanged_tree_is_idempotent_in_hash() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.rs", "fn a() {}\n");

        let scanner = Scanner::new(dir.path()).unwrap();
        let first = scanner.run_full().unwrap();
        let second = scanner.run_full().unwrap();
        assert_eq!(first.scan_hash, second.scan_hash);
        assert!(second.scan_id > first.scan_id);
    }

    #[test]
    fn test_incremental_requires_existing_index() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.rs", "fn a() {}\n");

        let scanner = Scanner::new(dir.path()).unwrap();
        let err = scanner.run_incremental().unwrap_err();
        assert!(matches!(err, PalaceError::IndexMissing(_)));
    }

    #[test]
    fn test_incremental_applies_add_modify_delete() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "keep.rs", "fn keep() {}\n");
        write_file(dir.path(), "edit.rs", "fn old() {}\n");
        write_file(dir.path(), "drop.rs", "fn gone() {}\n");

        let scanner = Scanner::new(dir.path()).unwrap();
        scanner.run_full().unwrap();

        write_file(dir.path(), "new.rs", "fn fresh() {}\n");
        write_file(dir.path(), "edit.rs", "fn replaced() {}\n");
        // Force mtime drift past one-second granularity
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let edited = fs::File::options()
            .write(true)
            .open(dir.path().join("edit.rs"))
            .unwrap();
        edited.set_modified(past).unwrap();
        fs::remove_file(dir.path().join("drop.rs")).unwrap();

        let summary = scanner.run_incremental().unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.unchanged, 1);

        let store = IndexStore::open_existing(dir.path()).unwrap();
        let metadata: HashMap<_, _> = store.load_file_metadata().unwrap();
        assert!(metadata.contains_key("new.rs"));
        assert!(!metadata.contains_key("drop.rs"));
        assert_eq!(
            metadata["edit.rs"].hash,
            fsutil::hash_bytes(b"fn replaced() {}\n")
        );
    }
}
