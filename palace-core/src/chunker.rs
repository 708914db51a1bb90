//! Content-aware chunking: line-bounded, symbol-respecting segments.
//!
//! Output is always a deterministic, ordered, gap-free partition of the file:
//! concatenating chunk contents reproduces the input byte-for-byte.

use crate::analyze::SymbolBoundary;
use serde::Serialize;

/// Size budget for a single chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            max_lines: 120,
            max_bytes: 8192,
        }
    }
}

/// A contiguous line range of a file stored for full-text search.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Ordinal within the file
    pub index: usize,
    /// 1-indexed, inclusive
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

/// A candidate region between two symbol break points.
struct Region {
    start: usize,
    end: usize,
    /// Line span of the symbol this region was cut around, if any
    symbol: Option<(usize, usize)>,
}

/// Split file text into chunks, honoring symbol boundaries when supplied.
pub fn chunk_lines(content: &str, symbols: &[SymbolBoundary], budget: &ChunkBudget) -> Vec<Chunk> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if lines.is_empty() {
        return Vec::new();
    }
    let n = lines.len();

    let spans = sanitize_symbols(symbols, n);
    let mut chunks = if spans.is_empty() {
        split_greedy(&lines, 1, n, budget)
    } else {
        chunk_with_symbols(&lines, &spans, budget)
    };

    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.index = i;
    }
    chunks
}

/// Sort boundaries by start line, clamp to the file, and drop nested or
/// overlapping entries so the remaining spans are strictly increasing.
fn sanitize_symbols(symbols: &[SymbolBoundary], total_lines: usize) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = symbols
        .iter()
        .filter(|s| s.start_line >= 1 && s.start_line <= total_lines && s.end_line >= s.start_line)
        .map(|s| (s.start_line, s.end_line.min(total_lines)))
        .collect();
    spans.sort_unstable();

    let mut kept: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for span in spans {
        match kept.last() {
            Some(&(_, prev_end)) if span.0 <= prev_end => {}
            _ => kept.push(span),
        }
    }
    kept
}

fn chunk_with_symbols(
    lines: &[&str],
    spans: &[(usize, usize)],
    budget: &ChunkBudget,
) -> Vec<Chunk> {
    let n = lines.len();

    // Break points between consecutive symbols: a wide gap breaks one line
    // before the next symbol, a tight one breaks at the current symbol's end.
    let mut breaks: Vec<usize> = Vec::with_capacity(spans.len());
    for pair in spans.windows(2) {
        let (_, cur_end) = pair[0];
        let (next_start, _) = pair[1];
        if next_start - cur_end > 1 {
            breaks.push(next_start - 1);
        } else {
            breaks.push(cur_end);
        }
    }
    // Final break: the larger of the last symbol's end or end-of-file, which
    // with spans clamped to the file is always end-of-file.
    breaks.push(n);

    let mut regions: Vec<Region> = Vec::with_capacity(breaks.len());
    let mut start = 1;
    for (i, &brk) in breaks.iter().enumerate() {
        let end = brk.min(n);
        if end < start {
            continue;
        }
        regions.push(Region {
            start,
            end,
            symbol: Some(spans[i]),
        });
        start = end + 1;
    }
    if start <= n {
        regions.push(Region {
            start,
            end: n,
            symbol: None,
        });
    }

    // Greedily merge consecutive regions while the combined span stays within
    // budget; a region that alone exceeds budget is split around its symbol.
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < regions.len() {
        let region = &regions[i];
        if !fits(lines, region.start, region.end, budget) {
            chunks.extend(split_oversized_region(lines, region, budget));
            i += 1;
            continue;
        }

        let group_start = region.start;
        let mut group_end = region.end;
        i += 1;
        while i < regions.len() && fits(lines, group_start, regions[i].end, budget) {
            group_end = regions[i].end;
            i += 1;
        }
        chunks.push(make_chunk(lines, group_start, group_end));
    }
    chunks
}

/// Split a region that exceeds the budget. The symbol span stays intact (an
/// oversized symbol becomes its own oversized chunk); the uncovered lines
/// around it fall back to the line/byte splitter.
fn split_oversized_region(lines: &[&str], region: &Region, budget: &ChunkBudget) -> Vec<Chunk> {
    let Some((sym_start, sym_end)) = region.symbol else {
        return split_greedy(lines, region.start, region.end, budget);
    };

    let mut chunks = Vec::new();
    if sym_start > region.start {
        chunks.extend(split_greedy(lines, region.start, sym_start - 1, budget));
    }
    chunks.push(make_chunk(lines, sym_start, sym_end));
    if sym_end < region.end {
        chunks.extend(split_greedy(lines, sym_end + 1, region.end, budget));
    }
    chunks
}

/// Greedy line/byte splitter: accumulate lines until adding the next would
/// exceed the budget, then flush. A single line over the byte budget still
/// forms its own chunk.
fn split_greedy(lines: &[&str], start: usize, end: usize, budget: &ChunkBudget) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_start = start;
    let mut line_count = 0usize;
    let mut byte_count = 0usize;

    for line_no in start..=end {
        let len = lines[line_no - 1].len();
        if line_count > 0
            && (line_count + 1 > budget.max_lines || byte_count + len > budget.max_bytes)
        {
            chunks.push(make_chunk(lines, chunk_start, line_no - 1));
            chunk_start = line_no;
            line_count = 0;
            byte_count = 0;
        }
        line_count += 1;
        byte_count += len;
    }
    chunks.push(make_chunk(lines, chunk_start, end));
    chunks
}

fn fits(lines: &[&str], start: usize, end: usize, budget: &ChunkBudget) -> bool {
    if end - start + 1 > budget.max_lines {
        return false;
    }
    let bytes: usize = lines[start - 1..end].iter().map(|l| l.len()).sum();
    bytes <= budget.max_bytes
}

fn make_chunk(lines: &[&str], start: usize, end: usize) -> Chunk {
    Chunk {
        index: 0,
        start_line: start,
        end_line: end,
        content: lines[start - 1..end].concat(),
    }
}
