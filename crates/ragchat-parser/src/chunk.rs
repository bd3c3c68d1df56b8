//! Fixed-size overlapping chunking
//!
//! A window of `size` characters slides over the text starting at offset 0
//! and advances by `size - overlap` until its start reaches the end of the
//! text. Windows are trimmed and blank windows are dropped. Offsets count
//! characters, not bytes, so a window never splits a multi-byte character.

use std::ops::Range;

use crate::{ParserError, Result};

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl ChunkConfig {
    /// Create a chunk configuration; requires `0 < overlap < size`
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if overlap == 0 || overlap >= size {
            return Err(ParserError::InvalidChunkConfig { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    /// Window length in characters
    pub fn size(&self) -> usize {
        self.size
    }

    /// Characters shared by consecutive windows
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Character ranges of the raw windows over a text of `char_len` characters
    pub fn windows(&self, char_len: usize) -> impl Iterator<Item = Range<usize>> {
        let size = self.size;
        (0..char_len)
            .step_by(self.stride())
            .map(move |start| start..(start + size).min(char_len))
    }

    /// Split a text into trimmed, non-empty chunks with offsets
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        // Byte offset of every character, plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let mut chunks = Vec::new();
        for window in self.windows(char_len) {
            let content = text[boundaries[window.start]..boundaries[window.end]].trim();
            if content.is_empty() {
                continue;
            }
            chunks.push(TextChunk {
                content: content.to_string(),
                index: chunks.len() as u32,
                start_offset: window.start,
                end_offset: window.end,
            });
        }
        chunks
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 700,
            overlap: 80,
        }
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Trimmed chunk content
    pub content: String,

    /// Index among the retained chunks of the document
    pub index: u32,

    /// Character offset where the untrimmed window starts
    pub start_offset: usize,

    /// Character offset where the untrimmed window ends (exclusive)
    pub end_offset: usize,
}

/// Split `text` into trimmed windows of `size` characters overlapping by
/// `overlap`; requires `0 < overlap < size`
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    let config = ChunkConfig::new(size, overlap)?;
    Ok(config
        .chunk(text)
        .into_iter()
        .map(|chunk| chunk.content)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_config_bounds() {
        assert!(ChunkConfig::new(10, 0).is_err());
        assert!(ChunkConfig::new(10, 10).is_err());
        assert!(ChunkConfig::new(10, 11).is_err());
        assert!(ChunkConfig::new(10, 9).is_ok());
        assert_eq!(ChunkConfig::default().stride(), 620);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("  Refunds are processed within 30 days.\n", 700, 80).unwrap();
        assert_eq!(chunks, vec!["Refunds are processed within 30 days."]);
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(chunk_text("", 700, 80).unwrap().is_empty());
        assert!(chunk_text(" \n\t  ", 700, 80).unwrap().is_empty());
    }

    #[test]
    fn test_windows_advance_by_stride() {
        let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
        // starts at 0, 3, 6, 9
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "j"]);
    }

    #[test]
    fn test_blank_windows_dropped_and_reindexed() {
        let config = ChunkConfig::new(4, 2).unwrap();
        let chunks = config.chunk("ab          cd");
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["ab", "cd", "cd"]);
        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[1].start_offset, 10);
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "연차휴가 신청은 인사시스템에서";
        let chunks = chunk_text(text, 5, 2).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5);
            assert!(text.contains(chunk.as_str()));
        }
    }

    proptest! {
        #[test]
        fn prop_windows_cover_every_character(
            text in "\\PC{0,400}",
            size in 2usize..64,
            overlap_seed in 1usize..64,
        ) {
            let overlap = 1 + overlap_seed % (size - 1);
            let config = ChunkConfig::new(size, overlap).unwrap();
            let char_len = text.chars().count();
            let windows: Vec<_> = config.windows(char_len).collect();

            for position in 0..char_len {
                prop_assert!(windows.iter().any(|w| w.contains(&position)));
            }
            for window in &windows {
                prop_assert!(window.len() <= size);
            }
        }

        #[test]
        fn prop_chunks_are_trimmed_substrings(
            text in "[a-z \\n]{0,300}",
            size in 2usize..40,
            overlap_seed in 1usize..40,
        ) {
            let overlap = 1 + overlap_seed % (size - 1);
            let chunks = chunk_text(&text, size, overlap).unwrap();
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert_eq!(chunk.trim(), chunk.as_str());
                prop_assert!(text.contains(chunk.as_str()));
            }
            // Same arguments, same output.
            prop_assert_eq!(chunks, chunk_text(&text, size, overlap).unwrap());
        }

        #[test]
        fn prop_non_blank_characters_are_retained(
            text in "[a-z \\n]{0,300}",
            size in 2usize..40,
            overlap_seed in 1usize..40,
        ) {
            let overlap = 1 + overlap_seed % (size - 1);
            let config = ChunkConfig::new(size, overlap).unwrap();
            let chunks = config.chunk(&text);
            for (position, c) in text.chars().enumerate() {
                if !c.is_whitespace() {
                    prop_assert!(chunks
                        .iter()
                        .any(|chunk| chunk.start_offset <= position && position < chunk.end_offset));
                }
            }
        }
    }
}
