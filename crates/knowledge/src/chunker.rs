//! Splitting documents into retrievable passages.

use text_splitter::TextSplitter;

/// A slice of a document, addressed by byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// `<document uri>#<start>-<end>`
    pub source_id: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Build the stable identifier of a byte range within a document.
pub fn chunk_source_id(document_uri: &str, start: usize, end: usize) -> String {
    format!("{}#{}-{}", document_uri, start, end)
}

/// Split `text` into passages of at most `max_chars` characters.
///
/// Boundaries prefer paragraphs, then sentences, then words. Blank chunks are
/// skipped; offsets refer to the trimmed chunk inside `text`.
pub fn split_into_passages(document_uri: &str, text: &str, max_chars: usize) -> Vec<DocumentChunk> {
    if text.trim().is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let splitter = TextSplitter::new(max_chars);
    let chunks: Vec<DocumentChunk> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .map(|(start, chunk)| {
            let end = start + chunk.len();
            DocumentChunk {
                source_id: chunk_source_id(document_uri, start, end),
                text: chunk.to_string(),
                start,
                end,
            }
        })
        .collect();

    tracing::debug!(
        "Split {} into {} passages (max {} chars)",
        document_uri,
        chunks.len(),
        max_chars
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_document_is_one_passage() {
        let chunks = split_into_passages("wiki:Paris", "Paris is the capital of France.", 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_id, "wiki:Paris#0-31");
        assert_eq!(chunks[0].text, "Paris is the capital of France.");
    }

    #[test]
    fn test_long_document_respects_limit() {
        let text = "Rust is a systems programming language. ".repeat(50);
        let chunks = split_into_passages("doc:rust", &text, 120);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 120);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
    }

    #[test]
    fn test_source_ids_are_unique_and_stable() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let first = split_into_passages("doc:x", text, 25);
        let second = split_into_passages("doc:x", text, 25);

        assert_eq!(first, second);
        let mut ids: Vec<_> = first.iter().map(|c| c.source_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), first.len());
    }

    #[test]
    fn test_empty_document() {
        assert!(split_into_passages("doc:empty", "   \n ", 100).is_empty());
        assert!(split_into_passages("doc:x", "text", 0).is_empty());
    }
}
