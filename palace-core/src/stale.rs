//! Fingerprint comparison and read-only staleness detection.
//!
//! Both consumers of "has this file changed" live here so the mutating
//! reindex path and the read-only verifier cannot drift apart:
//! [`compare_fingerprint`] backs the verifier's Fast/Strict modes, and
//! [`compare_metadata`] backs the change detector's reindex decisions.

use crate::config::Guardrails;
use crate::fsutil;
use crate::store::FileMetadata;
use crate::PalaceError;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

/// Verification mode for staleness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Trust a (size, mod_time) match as proof of no change; hash content
    /// only when either differs.
    Fast,
    /// Always hash content, ignoring size/mod_time shortcuts.
    Strict,
}

/// Outcome of comparing a live candidate against stored metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintStatus {
    Unchanged,
    Added,
    Modified,
    Missing,
}

/// Compare a live file against its stored fingerprint.
///
/// Fast mode never reads file content when (size, mod_time) match the stored
/// entry; Strict mode always hashes. A candidate that neither exists on disk
/// nor in the store is Unchanged (nothing to report either way).
pub fn compare_fingerprint(
    full_path: &Path,
    stored: Option<&FileMetadata>,
    mode: VerifyMode,
) -> crate::Result<FingerprintStatus> {
    let stat = match fsutil::stat_file(full_path) {
        Ok(stat) => stat,
        Err(PalaceError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            return Ok(if stored.is_some() {
                FingerprintStatus::Missing
            } else {
                FingerprintStatus::Unchanged
            });
        }
        Err(e) => return Err(e),
    };

    let Some(stored) = stored else {
        return Ok(FingerprintStatus::Added);
    };

    if mode == VerifyMode::Fast && stat.0 == stored.size && stat.1 == stored.mod_time {
        return Ok(FingerprintStatus::Unchanged);
    }

    let hash = fsutil::hash_file(full_path)?;
    Ok(if hash == stored.hash {
        FingerprintStatus::Unchanged
    } else {
        FingerprintStatus::Modified
    })
}

/// Metadata-only comparison for the mutating reindex path: any drift in
/// (size, mod_time) counts as modified so the stored fingerprint gets
/// refreshed, without ever hashing here.
pub fn compare_metadata(
    full_path: &Path,
    stored: Option<&FileMetadata>,
) -> crate::Result<FingerprintStatus> {
    let stat = match fsutil::stat_file(full_path) {
        Ok(stat) => stat,
        Err(PalaceError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            return Ok(if stored.is_some() {
                FingerprintStatus::Missing
            } else {
                FingerprintStatus::Unchanged
            });
        }
        Err(e) => return Err(e),
    };

    let Some(stored) = stored else {
        return Ok(FingerprintStatus::Added);
    };

    Ok(if stat.0 == stored.size && stat.1 == stored.mod_time {
        FingerprintStatus::Unchanged
    } else {
        FingerprintStatus::Modified
    })
}

/// Read-only staleness detection over a candidate set.
///
/// Returns sorted human-readable descriptors ("missing file X", "new file Y",
/// "changed file Z"). Guardrail-matched and empty candidates are skipped;
/// duplicate candidates are each evaluated independently. When
/// `include_missing` is set, stored paths absent from the candidate set are
/// reported as missing (full-workspace scope only).
pub fn detect(
    root: &Path,
    candidates: &[String],
    stored: &HashMap<String, FileMetadata>,
    guardrails: &Guardrails,
    mode: VerifyMode,
    include_missing: bool,
) -> crate::Result<Vec<String>> {
    let mut stale = Vec::new();

    for candidate in candidates {
        if candidate.is_empty() || guardrails.excludes(candidate) {
            continue;
        }
        let full_path = root.join(candidate);
        match compare_fingerprint(&full_path, stored.get(candidate), mode)? {
            FingerprintStatus::Unchanged => {}
            FingerprintStatus::Added => stale.push(format!("new file {}", candidate)),
            FingerprintStatus::Modified => stale.push(format!("changed file {}", candidate)),
            FingerprintStatus::Missing => stale.push(format!("missing file {}", candidate)),
        }
    }

    if include_missing {
        let candidate_set: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        for path in stored.keys() {
            if candidate_set.contains(path.as_str()) || guardrails.excludes(path) {
                continue;
            }
            stale.push(format!("missing file {}", path));
        }
    }

    stale.sort();
    Ok(stale)
}
