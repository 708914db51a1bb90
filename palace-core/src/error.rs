//! Error types for palace operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PalaceError {
    #[error("Index missing at {}: run a full scan first", .0.display())]
    IndexMissing(PathBuf),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("Cannot resolve diff range '{0}': not a valid git range in this repository")]
    DiffRange(String),

    #[error("File vanished during scan: {}", .0.display())]
    FileVanished(PathBuf),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Delete .palace/index and run a full scan.")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PalaceError {
    /// Attach the failing store operation's name to a database error.
    pub(crate) fn with_op(self, op: &'static str) -> Self {
        match self {
            PalaceError::Database(source) => PalaceError::Store { op, source },
            other => other,
        }
    }
}
