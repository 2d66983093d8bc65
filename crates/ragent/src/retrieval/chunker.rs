//! Splitting source documents into overlapping chunks for indexing.

use serde_json::json;

use super::SourceDocument;

/// Approximate characters per token for English prose.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: 800,
            overlap_tokens: 200,
        }
    }
}

impl SplitterConfig {
    fn max_chars(&self) -> usize {
        (self.chunk_tokens * CHARS_PER_TOKEN).max(1)
    }

    fn overlap_chars(&self) -> usize {
        self.overlap_tokens * CHARS_PER_TOKEN
    }
}

/// Split every document into chunks, carrying its metadata plus a `chunk_index`
/// counted across the whole output.
pub fn split_documents(documents: &[SourceDocument], config: SplitterConfig) -> Vec<SourceDocument> {
    let mut chunks = Vec::new();
    for document in documents {
        for text in sliding_window(&document.text, config.max_chars(), config.overlap_chars()) {
            let mut chunk = SourceDocument {
                text,
                metadata: document.metadata.clone(),
            };
            chunk
                .metadata
                .insert("chunk_index".to_string(), json!(chunks.len()));
            chunks.push(chunk);
        }
    }
    chunks
}

/// Overlapping windows of at most `max_chars` bytes, cut at natural boundaries when possible.
fn sliding_window(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = floor_char_boundary(text, (start + max_chars).min(text.len()));
        let chunk_end = if end < text.len() {
            find_break_point(&text[start..end])
                .map(|offset| start + offset)
                .unwrap_or(end)
        } else {
            end
        };
        // a window narrower than one char still has to make progress
        let chunk_end = if chunk_end <= start {
            next_char_boundary(text, start)
        } else {
            chunk_end
        };

        let chunk = text[start..chunk_end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if chunk_end >= text.len() {
            break;
        }

        let step = chunk_end - start;
        let next = if step <= overlap {
            chunk_end
        } else {
            floor_char_boundary(text, chunk_end - overlap)
        };
        // rounding down to a char boundary can land back on `start`
        start = next.max(next_char_boundary(text, start));
    }

    chunks
}

/// Offset just past the best break in `text`: paragraph, then sentence, then line, then word.
fn find_break_point(text: &str) -> Option<usize> {
    let len = text.len();

    if let Some(pos) = text.rfind("\n\n") {
        if pos > len / 3 {
            return Some(pos + 2);
        }
    }

    for pattern in &[". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(pos) = text.rfind(pattern) {
            if pos > len / 3 {
                return Some(pos + pattern.len());
            }
        }
    }

    if let Some(pos) = text.rfind('\n') {
        if pos > len / 3 {
            return Some(pos + 1);
        }
    }

    text.rfind(' ').filter(|pos| *pos > len / 3).map(|pos| pos + 1)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    let mut next = index + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next.min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_document_is_one_chunk() {
        let docs = vec![SourceDocument::new("Short page").with_metadata("page", json!(1))];
        let chunks = split_documents(&docs, SplitterConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Short page");
        assert_eq!(chunks[0].metadata["page"], json!(1));
        assert_eq!(chunks[0].metadata["chunk_index"], json!(0));
    }

    #[test]
    fn test_empty_pages_produce_nothing() {
        let docs = vec![SourceDocument::new("   \n ")];
        assert!(split_documents(&docs, SplitterConfig::default()).is_empty());
    }

    #[test]
    fn test_large_text_overlaps() {
        let text = "This is a test. ".repeat(100);
        let chunks = sliding_window(&text, 200, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 200);
        }
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len().saturating_sub(20)..];
            assert!(pair[1].contains(tail.trim()));
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let first = "a".repeat(150);
        let second = "b".repeat(150);
        let text = format!("{}\n\n{}", first, second);
        let chunks = sliding_window(&text, 200, 0);
        assert_eq!(chunks[0], first);
        assert_eq!(chunks[1], second);
    }

    #[test]
    fn test_multibyte_text_does_not_split_chars() {
        let text = "é".repeat(300);
        let chunks = sliding_window(&text, 101, 11);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'é')));
    }

    #[test]
    fn test_multibyte_start_with_early_space_terminates() {
        let text = format!("中{} {}", "a".repeat(797), "b".repeat(3000));
        let chunks = sliding_window(&text, 3200, 800);
        assert!(chunks.len() >= 2 && chunks.len() < 10);
        assert!(chunks[0].starts_with('中'));
        assert!(chunks.last().unwrap().ends_with('b'));
        for chunk in &chunks {
            assert!(chunk.len() <= 3200);
        }
    }

    #[test]
    fn test_word_break_needs_a_full_third() {
        assert_eq!(find_break_point("ab cdefghijkl"), None);
        assert_eq!(find_break_point("abcdefgh ijkl"), Some(9));
    }

    #[test]
    fn test_chunk_index_runs_across_documents() {
        let config = SplitterConfig {
            chunk_tokens: 50,
            overlap_tokens: 10,
        };
        let docs = vec![
            SourceDocument::new("Culture matters. ".repeat(30)).with_metadata("page", json!(1)),
            SourceDocument::new("Returns matter.").with_metadata("page", json!(2)),
        ];
        let chunks = split_documents(&docs, config);
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata["page"], json!(2));
        assert_eq!(last.metadata["chunk_index"], json!(chunks.len() - 1));
    }
}
