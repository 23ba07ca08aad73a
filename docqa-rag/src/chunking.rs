//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: cuts at paragraph breaks, then line breaks, then
//!   sentence ends, then spaces, falling back to raw characters
//! - [`FixedSizeChunker`]: cuts purely by character count
//!
//! Both produce overlapping windows over the document text: chunk *i+1*
//! starts with the last `chunk_overlap` characters of chunk *i*, so dropping
//! the first `chunk_overlap` characters of every chunk after the first and
//! concatenating reconstructs the original text. Lengths are measured in
//! `char`s, never bytes, and no chunk is longer than `chunk_size`.

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separator levels in priority order. Within a level the cut nearest to the
/// window end wins.
pub const DEFAULT_SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// A strategy for splitting documents into chunks.
///
/// Returns an empty `Vec` if the document has empty text.
pub trait Chunker: Send + Sync {
    /// Split a document into ordered chunks.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text at the highest-priority separator that keeps each chunk
/// within `chunk_size`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from an already validated configuration.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let windows =
            split_windows(&document.text, self.chunk_size, self.chunk_overlap, DEFAULT_SEPARATORS);
        into_chunks(document, windows)
    }
}

/// Splits text into fixed-size character windows with overlap.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let windows = split_windows(&document.text, self.chunk_size, self.chunk_overlap, &[]);
        into_chunks(document, windows)
    }
}

fn into_chunks(document: &Document, windows: Vec<(usize, String)>) -> Vec<Chunk> {
    windows
        .into_iter()
        .enumerate()
        .map(|(i, (offset, text))| {
            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), i.to_string());
            Chunk {
                id: format!("{}_{i}", document.id),
                text,
                source_document_id: document.id.clone(),
                offset,
                metadata,
            }
        })
        .collect()
}

/// Produce `(char_offset, text)` windows covering `text`.
///
/// Every window except the last is longer than `chunk_overlap`, so each
/// following window starts exactly `chunk_overlap` characters before the
/// previous one ends.
fn split_windows(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&[&str]],
) -> Vec<(usize, String)> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char, plus the end of the text.
    let bounds: Vec<usize> =
        text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect();
    let total = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let limit = (start + chunk_size).min(total);
        let end = if limit == total {
            total
        } else {
            find_cut(text, &bounds, start, start + chunk_overlap, limit, separators)
        };
        windows.push((start, text[bounds[start]..bounds[end]].to_string()));
        if end == total {
            break;
        }
        start = end - chunk_overlap;
    }
    windows
}

/// Choose a cut in `(floor, limit]` (char positions), preferring the last
/// occurrence of the highest-priority separator level. Falls back to a hard
/// cut at `limit`.
fn find_cut(
    text: &str,
    bounds: &[usize],
    start: usize,
    floor: usize,
    limit: usize,
    separators: &[&[&str]],
) -> usize {
    let window = &text[bounds[start]..bounds[limit]];
    for level in separators {
        let best = level
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| bounds[start] + pos + sep.len()))
            .map(|byte| bounds.binary_search(&byte).unwrap_or_else(|i| i))
            .filter(|&cut| cut > floor)
            .max();
        if let Some(cut) = best {
            return cut;
        }
    }
    limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc", text, "documents/doc.txt", "txt")
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(10, 2).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn short_document_is_single_chunk() {
        let chunker = RecursiveChunker::new(500, 50).unwrap();
        let chunks = chunker.chunk(&doc("A short note."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short note.");
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].id, "doc_0");
    }

    #[test]
    fn prefers_paragraph_break() {
        let text = "First paragraph here.\n\nSecond paragraph follows with more words.";
        let chunker = RecursiveChunker::new(40, 5).unwrap();
        let chunks = chunker.chunk(&doc(text));
        assert_eq!(chunks[0].text, "First paragraph here.\n\n");
        assert!(chunks[1].text.starts_with("re.\n\nSecond"));
    }

    #[test]
    fn falls_back_to_sentence_then_word() {
        let text = "One two three. Four five six seven eight nine ten eleven";
        let chunker = RecursiveChunker::new(20, 0).unwrap();
        let chunks = chunker.chunk(&doc(text));
        assert_eq!(chunks[0].text, "One two three. ");
        assert_eq!(chunks[1].text, "Four five six seven ");
    }

    #[test]
    fn unbroken_text_is_cut_by_characters() {
        let text = "x".repeat(25);
        let chunker = RecursiveChunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![10, 10, 10, 4]);
        assert_eq!(chunks[1].offset, 7);
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let text = "é".repeat(12);
        let chunker = FixedSizeChunker::new(5, 1).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 5));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn chunks_inherit_metadata() {
        let chunker = RecursiveChunker::new(10, 0).unwrap();
        let chunks = chunker.chunk(&doc("alpha beta gamma delta"));
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.get("chunk_index"), Some(&i.to_string()));
            assert_eq!(chunk.source(), "documents/doc.txt");
            assert_eq!(chunk.source_document_id, "doc");
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(RecursiveChunker::new(0, 0).is_err());
        assert!(RecursiveChunker::new(10, 10).is_err());
        assert!(FixedSizeChunker::new(10, 12).is_err());
    }
}
