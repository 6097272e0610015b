//! Chunked delivery of already-produced text.
//!
//! The streaming path does not synthesize tokens; it splits a finished answer
//! into word chunks and paces them with a small delay so clients render
//! progressively.

use std::time::Duration;

/// Chunking parameters for the streaming response path.
#[derive(Debug, Clone, Copy)]
pub struct StreamingConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Delay between chunks.
    pub delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            delay: Duration::from_millis(10),
        }
    }
}

/// Split text into word chunks. Every chunk except the last carries a
/// trailing space so concatenating the chunks reproduces the text.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();

    for start in (0..words.len()).step_by(chunk_size) {
        let end = (start + chunk_size).min(words.len());
        let mut chunk = words[start..end].join(" ");
        if end < words.len() {
            chunk.push(' ');
        }
        chunks.push(chunk);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_reassemble_to_normalized_text() {
        let text = "one two three four five six seven";
        let chunks = chunk_text(text, 5);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "one two three four five ");
        assert_eq!(chunks[1], "six seven");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn exact_multiple_has_no_trailing_space() {
        let chunks = chunk_text("a b c d", 2);
        assert_eq!(chunks, vec!["a b ", "c d"]);
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_text("hi", 5), vec!["hi"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 5).is_empty());
        assert!(chunk_text("words here", 0).is_empty());
    }
}
