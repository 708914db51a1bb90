//! Filesystem primitives: fingerprints, normalized paths, guardrail-pruned
//! traversal.

use crate::config::Guardrails;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// The (hash, size, modTime) triple identifying a file's indexed content.
/// `mod_time` is UTC unix seconds, truncated to second precision so coarse
/// filesystem mtime resolution never causes spurious staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// SHA-256 hex of the raw bytes
    pub hash: String,
    pub size: u64,
    pub mod_time: i64,
}

/// Hash a file's raw bytes to SHA-256 hex.
pub fn hash_file(path: &Path) -> crate::Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash in-memory content to SHA-256 hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Stat a file for its (size, mod_time) pair without reading content.
pub fn stat_file(path: &Path) -> crate::Result<(u64, i64)> {
    let meta = fs::metadata(path)?;
    let mod_time = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((meta.len(), mod_time))
}

/// Compute the full fingerprint for a file.
pub fn fingerprint(path: &Path) -> crate::Result<Fingerprint> {
    let (size, mod_time) = stat_file(path)?;
    let hash = hash_file(path)?;
    Ok(Fingerprint {
        hash,
        size,
        mod_time,
    })
}

/// Slash-normalize a relative path for use as an index key.
pub fn normalize_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.contains('\\') {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Relative, slash-normalized form of `path` under `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    normalize_path(path.strip_prefix(root).unwrap_or(path))
}

/// List regular files under `root`, excluding guardrail matches.
///
/// Guardrail-matched directories are pruned entirely (never descended).
/// Symlinked directories are not followed; broken symlinks are skipped;
/// symlinks to regular files are included. Returns sorted relative paths.
pub fn list_files(root: &Path, guardrails: &Guardrails) -> crate::Result<Vec<String>> {
    let root = root.to_path_buf();
    let mut builder = WalkBuilder::new(&root);
    builder.hidden(false);
    builder.follow_links(false);
    builder.git_ignore(true);
    builder.git_global(true);
    builder.git_exclude(true);

    let filter_root = root.clone();
    let filter_guardrails = guardrails.clone();
    builder.filter_entry(move |entry| {
        let relative = relative_path(&filter_root, entry.path());
        if relative.is_empty() {
            return true;
        }
        !filter_guardrails.excludes(&relative)
    });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();

        if entry.path_is_symlink() {
            // Resolve once: symlinked regular files are included, symlinked
            // directories and broken links are not
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }
        } else {
            match entry.file_type() {
                Some(ft) if ft.is_file() => {}
                _ => continue,
            }
        }

        let relative = relative_path(&root, path);
        if relative.is_empty() || guardrails.excludes(&relative) {
            continue;
        }
        files.push(relative);
    }

    files.sort();
    Ok(files)
}

/// Language tag derived from the file extension, when known.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    let language = match ext {
        "rs" => "rust",
        "go" => "go",
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "rb" => "ruby",
        "md" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "sh" => "shell",
        _ => return None,
    };
    Some(language)
}
