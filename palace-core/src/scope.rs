//! Scope resolution: which files a scan or verification should examine.
//!
//! Full scope walks the guardrail-filtered tree and checks for deletions.
//! Diff scope takes its candidate set from a cached change signal when the
//! recorded range matches the request exactly, and from a live
//! `git diff --name-only` otherwise; files outside the diff are never
//! re-examined.

use crate::config::Guardrails;
use crate::fsutil;
use crate::PalaceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Where the candidate set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSource {
    FullWalk,
    ChangeSignal,
    GitDiff,
}

/// Resolved candidate file set for one request.
#[derive(Debug, Clone)]
pub struct Scope {
    pub candidates: Vec<String>,
    pub include_missing: bool,
    pub source: ScopeSource,
}

/// Externally generated record of a diff range's file-level changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSignal {
    pub diff_range: String,
    pub changes: Vec<SignalChange>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalChange {
    pub path: String,
    pub status: String,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Path of the cached change-signal artifact for a repo root.
pub fn change_signal_path(root: &Path) -> std::path::PathBuf {
    root.join(".palace").join("outputs").join("change-signal.json")
}

/// Resolve the candidate set for a request. `diff_range = None` means full
/// workspace scope.
pub fn resolve(
    root: &Path,
    diff_range: Option<&str>,
    guardrails: &Guardrails,
) -> crate::Result<Scope> {
    match diff_range {
        None => {
            let candidates = fsutil::list_files(root, guardrails)?;
            Ok(Scope {
                candidates,
                include_missing: true,
                source: ScopeSource::FullWalk,
            })
        }
        Some(range) => resolve_diff(root, range, guardrails),
    }
}

fn resolve_diff(root: &Path, range: &str, guardrails: &Guardrails) -> crate::Result<Scope> {
    // A signal whose recorded range matches exactly substitutes for a live
    // git invocation; any mismatch silently falls back to git
    if let Some(signal) = load_change_signal(root) {
        if signal.diff_range == range {
            let candidates = signal
                .changes
                .into_iter()
                .map(|c| c.path)
                .filter(|p| !p.is_empty() && !guardrails.excludes(p))
                .collect();
            return Ok(Scope {
                candidates,
                include_missing: false,
                source: ScopeSource::ChangeSignal,
            });
        }
        tracing::debug!(range, "change signal range mismatch, falling back to git diff");
    }

    let candidates = git_diff_names(root, range)?
        .into_iter()
        .filter(|p| !p.is_empty() && !guardrails.excludes(p))
        .collect();
    Ok(Scope {
        candidates,
        include_missing: false,
        source: ScopeSource::GitDiff,
    })
}

fn load_change_signal(root: &Path) -> Option<ChangeSignal> {
    let content = std::fs::read_to_string(change_signal_path(root)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Changed paths for a git range. An unresolvable range (invalid range, not
/// a git repository, git unavailable) is a hard failure naming the range;
/// diff scope never widens to full scope.
pub fn git_diff_names(root: &Path, range: &str) -> crate::Result<Vec<String>> {
    let output = Command::new("git")
        .args(["diff", "--name-only", range])
        .current_dir(root)
        .output()
        .map_err(|_| PalaceError::DiffRange(range.to_string()))?;

    if !output.status.success() {
        return Err(PalaceError::DiffRange(range.to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
