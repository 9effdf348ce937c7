//! Separator-aware text chunker with a fixed character overlap.
//!
//! Splits extracted text into [`Chunk`]s of at most `chunk_size` characters.
//! Splitting happens on a configurable separator (a newline by default) so
//! that lines are never cut in half.
//!
//! # Algorithm
//!
//! 1. Split the text on `separator`, dropping empty units.
//! 2. Greedily pack consecutive units, joined by the separator, while the
//!    chunk stays within `chunk_size` characters.
//! 3. Every chunk after the first begins with the last `chunk_overlap`
//!    characters of the previous chunk, then the separator, then its own
//!    units. The prefix counts towards `chunk_size`; when the next unit would
//!    not fit behind a full prefix, the prefix is shortened.
//! 4. A unit longer than `chunk_size` becomes a chunk of its own, without a
//!    prefix and without truncation.
//!
//! Lengths are counted in `char`s, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_text, ChunkingParams};
//!
//! let params = ChunkingParams { chunk_size: 12, chunk_overlap: 4, separator: "\n".into() };
//! let chunks = chunk_text("alpha\nbravo\ncharlie", &params).unwrap();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "alpha\nbravo");
//! assert_eq!(chunks[1].text, "ravo\ncharlie");
//! assert_eq!(chunks[1].fresh_text(), "charlie");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Chunking settings, decoupled from application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    /// Maximum characters per chunk (oversized single units excepted).
    pub chunk_size: usize,
    /// Characters carried over from the end of the previous chunk.
    pub chunk_overlap: usize,
    pub separator: String,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separator: "\n".to_string(),
        }
    }
}

impl ChunkingParams {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separator.is_empty() {
            return Err(Error::Configuration(
                "chunk separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A non-empty piece of text between two separators.
struct Unit<'a> {
    text: &'a str,
    offset: usize,
    chars: usize,
}

fn split_units<'a>(text: &'a str, separator: &str) -> Vec<Unit<'a>> {
    let mut units = Vec::new();
    let mut offset = 0;
    for piece in text.split(separator) {
        if !piece.is_empty() {
            units.push(Unit {
                text: piece,
                offset,
                chars: piece.chars().count(),
            });
        }
        offset += piece.len() + separator.len();
    }
    units
}

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector when the text contains nothing but separators.
///
/// # Errors
///
/// [`Error::Configuration`] when `chunk_size` is zero, `chunk_overlap` is not
/// smaller than `chunk_size`, or the separator is empty.
pub fn chunk_text(text: &str, params: &ChunkingParams) -> Result<Vec<Chunk>> {
    params.validate()?;

    let sep = params.separator.as_str();
    let sep_chars = sep.chars().count();
    let units = split_units(text, sep);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut next = 0;

    while next < units.len() {
        let first = &units[next];

        if first.chars > params.chunk_size {
            tracing::warn!(
                chars = first.chars,
                chunk_size = params.chunk_size,
                "split unit longer than chunk_size; emitting it as its own chunk"
            );
            chunks.push(make_chunk(chunks.len(), first.text.to_string(), first.offset, 0, 0));
            next += 1;
            continue;
        }

        let mut buf = String::new();
        let mut len = 0usize;
        let mut overlap_prev = 0usize;

        if let Some(prev) = chunks.last() {
            let room = params
                .chunk_size
                .saturating_sub(sep_chars)
                .saturating_sub(first.chars);
            let want = params.chunk_overlap.min(room).min(prev.char_len());
            if want > 0 {
                buf.push_str(tail_chars(&prev.text, want));
                buf.push_str(sep);
                len = want + sep_chars;
                overlap_prev = want;
            }
        }

        let source_offset = first.offset;
        let mut packed = 0usize;
        while next < units.len() {
            let unit = &units[next];
            let added = if packed == 0 {
                unit.chars
            } else {
                sep_chars + unit.chars
            };
            if packed > 0 && len + added > params.chunk_size {
                break;
            }
            if packed > 0 {
                buf.push_str(sep);
            }
            buf.push_str(unit.text);
            len += added;
            packed += 1;
            next += 1;
        }

        let sep_len = if overlap_prev > 0 { sep.len() } else { 0 };
        chunks.push(make_chunk(chunks.len(), buf, source_offset, overlap_prev, sep_len));
    }

    tracing::debug!(chunks = chunks.len(), units = units.len(), "chunked text");
    Ok(chunks)
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let start = s
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

fn make_chunk(
    index: usize,
    text: String,
    source_offset: usize,
    overlap_prev: usize,
    overlap_sep_len: usize,
) -> Chunk {
    Chunk {
        index,
        text,
        source_offset: Some(source_offset),
        overlap_prev,
        overlap_sep_len,
    }
}
