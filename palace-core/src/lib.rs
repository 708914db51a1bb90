//! Palace Core - Codebase indexing and staleness detection
//!
//! This library maintains a durable, queryable representation of a codebase
//! (content chunks, symbols, call relationships) and decides cheaply and
//! correctly whether that representation has drifted from the live file tree.

pub mod analyze;
pub mod chunker;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod scan;
pub mod scope;
pub mod stale;
pub mod store;
pub mod verify;

pub use analyze::{Analyzer, FileAnalysis, NullAnalyzer, Relationship, Symbol, SymbolBoundary};
pub use chunker::{chunk_lines, Chunk, ChunkBudget};
pub use config::{Config, Guardrails};
pub use error::PalaceError;
pub use fsutil::Fingerprint;
pub use scan::{ScanAudit, Scanner};
pub use scope::{ChangeSignal, Scope, ScopeSource, SignalChange};
pub use stale::{compare_fingerprint, compare_metadata, FingerprintStatus, VerifyMode};
pub use store::{
    CallSite, ChunkHit, FileChange, FileChangeAction, FileMetadata, FileRecord,
    IncrementalScanSummary, IndexStore, Scan, ScanSummary,
};
pub use verify::{Verify, VerifyReport, VerifyRequest};

/// Result type alias for palace operations
pub type Result<T> = std::result::Result<T, PalaceError>;
