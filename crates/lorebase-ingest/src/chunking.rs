//! Overlapping text chunks with sentence-aware breakpoints.

use lorebase_core::Document;

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// One embeddable piece of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id: `doc_{doc_id}_chunk_{chunk_index}`.
    pub id: String,
    pub doc_id: i64,
    pub chunk_index: usize,
    /// Document title, suffixed with ` - Part {n}` when the document spans
    /// more than one chunk.
    pub title: String,
    pub text: String,
}

/// Split a document's extracted text into chunks with stable ids and titles.
pub fn chunk_document(
    document: &Document,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let pieces = chunk_text(text, chunk_size, overlap);
    let multi = pieces.len() > 1;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: format!("doc_{}_chunk_{}", document.id, i),
            doc_id: document.id,
            chunk_index: i,
            title: if multi {
                format!("{} - Part {}", document.title, i + 1)
            } else {
                document.title.clone()
            },
            text,
        })
        .collect()
}

/// Split text into overlapping windows of at most `chunk_size` bytes.
///
/// Text at or under the size limit comes back as a single chunk, untrimmed.
/// Larger text is windowed; each window prefers to end at the last sentence
/// or line break when one falls within `overlap` bytes of the window end.
/// Empty windows (all whitespace) are dropped without consuming an index.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        if end < text.len() {
            if let Some(pos) = text[start..end].rfind(['.', '\n']) {
                let breakpoint = start + pos;
                if breakpoint > start && end - breakpoint < overlap {
                    end = breakpoint + 1;
                }
            }
        }

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        let mut next = if end < text.len() {
            let mut next = end.saturating_sub(overlap);
            while !text.is_char_boundary(next) {
                next -= 1;
            }
            next
        } else {
            text.len()
        };
        // Overlap larger than the progress made would loop forever.
        if next <= start {
            next = end;
        }
        start = next;
    }
    chunks
}
