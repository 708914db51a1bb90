//! Pluggable symbol/relationship extraction seam.
//!
//! Per-language parsing lives outside this crate. The engine only consumes
//! the output contract: given file content, produce safe chunk split points,
//! stored symbols, and call edges.

use serde::{Deserialize, Serialize};

/// A safe split point hint for the chunker, produced by a language analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolBoundary {
    pub name: String,
    pub kind: String,
    /// 1-indexed, inclusive
    pub start_line: usize,
    pub end_line: usize,
}

/// A stored symbol definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: String,
    pub line_start: usize,
    pub line_end: usize,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub exported: bool,
}

/// A directed edge for call-graph queries. The source file is the file the
/// analysis ran on; the target file is only known when the analyzer resolved
/// the callee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub target_file: Option<String>,
    pub target_symbol: String,
    pub kind: String,
    pub line: usize,
}

/// Everything an analyzer extracts from one file.
#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    pub boundaries: Vec<SymbolBoundary>,
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
}

/// Language analyzer capability: given file content, produce symbol
/// boundaries and call edges.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, path: &str, content: &str) -> FileAnalysis;
}

/// Analyzer that extracts nothing. Chunking falls back to the line/byte
/// splitter and the symbol/relationship tables stay empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnalyzer;

impl Analyzer for NullAnalyzer {
    fn analyze(&self, _path: &str, _content: &str) -> FileAnalysis {
        FileAnalysis::default()
    }
}
