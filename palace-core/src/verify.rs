//! Read-only staleness verification: resolve a scope, compare it against the
//! stored snapshot, and report what drifted. Never mutates the index.

use crate::config::Config;
use crate::scope::{self, ScopeSource};
use crate::stale::{self, VerifyMode};
use crate::store::IndexStore;
use std::path::Path;

/// One verification request.
#[derive(Debug, Clone)]
pub struct VerifyRequest<'a> {
    pub root: &'a Path,
    /// `None` verifies the whole workspace; `Some(range)` restricts the
    /// candidate set to the diff.
    pub diff_range: Option<&'a str>,
    pub mode: VerifyMode,
}

/// Outcome of a verification.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Sorted human-readable drift descriptors; empty means fresh.
    pub stale: Vec<String>,
    pub full_scope: bool,
    pub source: ScopeSource,
    pub candidate_count: usize,
}

impl VerifyReport {
    pub fn is_fresh(&self) -> bool {
        self.stale.is_empty()
    }
}

pub struct Verify;

impl Verify {
    pub fn run(store: &IndexStore, request: &VerifyRequest) -> crate::Result<VerifyReport> {
        let config = Config::load_for_root(request.root)?;
        let guardrails = config.guardrails()?;

        let scope = scope::resolve(request.root, request.diff_range, &guardrails)?;
        let stored = store.load_file_metadata()?;
        let stale = stale::detect(
            request.root,
            &scope.candidates,
            &stored,
            &guardrails,
            request.mode,
            scope.include_missing,
        )?;

        tracing::debug!(
            candidates = scope.candidates.len(),
            stale = stale.len(),
            source = ?scope.source,
            "verification complete"
        );

        Ok(VerifyReport {
            stale,
            full_scope: scope.include_missing,
            source: scope.source,
            candidate_count: scope.candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;
    use crate::scope::{change_signal_path, ChangeSignal, SignalChange};
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn indexed_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "src/main.rs", "fn main() {}\n");
        write_file(dir.path(), "src/lib.rs", "pub fn lib() {}\n");
        Scanner::new(dir.path()).unwrap().run_full().unwrap();
        dir
    }

    #[test]
    fn test_fresh_index_verifies_clean() {
        let dir = indexed_repo();
        let store = IndexStore::open_existing(dir.path()).unwrap();
        let report = Verify::run(
            &store,
            &VerifyRequest {
                root: dir.path(),
                diff_range: None,
                mode: VerifyMode::Strict,
            },
        )
        .unwrap();
        assert!(report.is_fresh());
        assert!(report.full_scope);
        assert_eq!(report.source, ScopeSource::FullWalk);
        assert_eq!(report.candidate_count, 2);
    }

    #[test]
    fn test_full_scope_reports_new_changed_and_missing() {
        let dir = indexed_repo();
        write_file(dir.path(), "src/extra.rs", "fn extra() {}\n");
        write_file(dir.path(), "src/lib.rs", "pub fn lib2() {}\n");
        fs::remove_file(dir.path().join("src/main.rs")).unwrap();

        let store = IndexStore::open_existing(dir.path()).unwrap();
        let report = Verify::run(
            &store,
            &VerifyRequest {
                root: dir.path(),
                diff_range: None,
                mode: VerifyMode::Strict,
            },
        )
        .unwrap();
        assert_eq!(
            report.stale,
            vec![
                "changed file src/lib.rs",
                "missing file src/main.rs",
                "new file src/extra.rs",
            ]
        );
    }

    #[test]
    fn test_diff_scope_ignores_drift_outside_the_diff() {
        let dir = indexed_repo();
        // Both files change, but the signal only names lib.rs
        write_file(dir.path(), "src/lib.rs", "pub fn lib2() {}\n");
        fs::remove_file(dir.path().join("src/main.rs")).unwrap();

        let signal = ChangeSignal {
            diff_range: "main..HEAD".to_string(),
            changes: vec![SignalChange {
                path: "src/lib.rs".to_string(),
                status: "modified".to_string(),
                hash: None,
            }],
            generated_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let path = change_signal_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(&signal).unwrap()).unwrap();

        let store = IndexStore::open_existing(dir.path()).unwrap();
        let report = Verify::run(
            &store,
            &VerifyRequest {
                root: dir.path(),
                diff_range: Some("main..HEAD"),
                mode: VerifyMode::Strict,
            },
        )
        .unwrap();
        assert!(!report.full_scope);
        assert_eq!(report.source, ScopeSource::ChangeSignal);
        assert_eq!(report.stale, vec!["changed file src/lib.rs"]);
    }

    #[test]
    fn test_verify_does_not_mutate_the_index() {
        let dir = indexed_repo();
        write_file(dir.path(), "src/lib.rs", "pub fn lib2() {}\n");

        let store = IndexStore::open_existing(dir.path()).unwrap();
        let before = store.latest_scan().unwrap();
        Verify::run(
            &store,
            &VerifyRequest {
                root: dir.path(),
                diff_range: None,
                mode: VerifyMode::Fast,
            },
        )
        .unwrap();
        let after = store.latest_scan().unwrap();
        assert_eq!(before.id, after.id);
        assert_eq!(before.scan_hash, after.scan_hash);

        // A second verification still reports the same drift
        let report = Verify::run(
            &store,
            &VerifyRequest {
                root: dir.path(),
                diff_range: None,
                mode: VerifyMode::Strict,
            },
        )
        .unwrap();
        assert_eq!(report.stale, vec!["changed file src/lib.rs"]);
    }
}
