//! Recursive, boundary-preferring text splitter.
//!
//! Splits a document's combined text into overlapping windows of at most
//! `chunk_size` characters. Coarse boundaries are preferred: the splitter
//! breaks on paragraphs first, then line breaks, then sentence ends, then
//! spaces, and only falls back to raw characters when a piece still does
//! not fit.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from [`SEPARATORS`] that occurs in the text.
//!    The empty separator always matches and splits into characters.
//! 2. Split on it, keeping each separator attached to the start of the
//!    piece that follows it, so joining pieces reproduces the text.
//! 3. Pieces shorter than `chunk_size` are buffered. A piece that is too
//!    long flushes the buffer and is split again with the finer separators.
//! 4. Buffered pieces are merged into windows. When the next piece would
//!    overflow the window, the window is emitted and pieces are dropped
//!    from its front until at most `chunk_overlap` characters remain; those
//!    remaining pieces start the next window.
//! 5. Windows are trimmed; empty windows are dropped.
//!
//! # Example
//!
//! ```rust
//! use hybrid_rag_core::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(10, 5).unwrap();
//! let windows = splitter.split_text("aaaa bbbb cccc dddd");
//! assert_eq!(windows, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
//! ```

use std::collections::VecDeque;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

/// Separators tried in order, coarsest first.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits text into overlapping windows on the coarsest boundary that fits.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    /// Create a splitter producing windows of at most `chunk_size`
    /// characters, with up to `chunk_overlap` characters carried over
    /// between consecutive windows.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into windows. Empty or whitespace-only text yields no
    /// windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut windows = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                windows.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                if let Some(window) = join_pieces([piece]) {
                    windows.push(window);
                }
            } else {
                windows.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            windows.extend(self.merge(&pending));
        }

        windows
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = join_pieces(current.iter().copied()) {
                    windows.push(window);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(window) = join_pieces(current.iter().copied()) {
            windows.push(window);
        }

        windows
    }
}

/// SHA-256 of `text` as lowercase hex. Used as the dedup key for both
/// documents and chunks.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching each separator to the piece after it.
/// An empty separator splits into single characters. Empty pieces are
/// dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_pieces<'a>(pieces: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let joined: String = pieces.into_iter().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_window() {
        let splitter = RecursiveSplitter::new(500, 100).unwrap();
        assert_eq!(splitter.split_text("alpha beta"), vec!["alpha beta"]);
    }

    #[test]
    fn test_empty_text() {
        let splitter = RecursiveSplitter::new(500, 100).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = RecursiveSplitter::new(12, 0).unwrap();
        let windows = splitter.split_text("para one.\n\npara two.");
        assert_eq!(windows, vec!["para one.", "para two."]);
    }

    #[test]
    fn test_overlap_between_windows() {
        let splitter = RecursiveSplitter::new(10, 5).unwrap();
        let windows = splitter.split_text("aaaa bbbb cccc dddd");
        assert_eq!(windows, vec!["aaaa bbbb", "bbbb cccc", "cccc dddd"]);
    }

    #[test]
    fn test_falls_back_to_characters() {
        let splitter = RecursiveSplitter::new(4, 0).unwrap();
        let windows = splitter.split_text("abcdefghij");
        assert_eq!(windows, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_windows_respect_max_size() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} talks about retrieval.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = RecursiveSplitter::new(80, 20).unwrap();
        let windows = splitter.split_text(&text);
        assert!(windows.len() > 1);
        for w in &windows {
            assert!(w.chars().count() <= 80, "window too long: {:?}", w);
        }
    }

    #[test]
    fn test_long_paragraph_split_on_lines() {
        let text = "first line here\nsecond line here\nthird line here\n\nshort";
        let splitter = RecursiveSplitter::new(20, 0).unwrap();
        let windows = splitter.split_text(text);
        assert_eq!(
            windows,
            vec!["first line here", "second line here", "third line here", "short"]
        );
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let splitter = RecursiveSplitter::new(5, 1).unwrap();
        let windows = splitter.split_text(text);
        assert!(!windows.is_empty());
        for w in &windows {
            assert!(w.chars().count() <= 5);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(10, 10).is_err());
        assert!(RecursiveSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("alpha beta"), content_hash("alpha beta"));
        assert_ne!(content_hash("alpha beta"), content_hash("alpha  beta"));
        assert_eq!(content_hash("").len(), 64);
    }
}
