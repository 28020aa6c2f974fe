//! Overlapping-window text chunker.
//!
//! Splits document text into fixed-size character windows where each window
//! repeats the last `overlap` characters of the previous one. Windows never
//! cross document boundaries, and the trailing window is never shorter than
//! the overlap (a fragment that small would be wholly contained in the
//! previous window).
//!
//! Each chunk carries its document's tags plus a SHA-256 dedup hash over
//! (source, collection, content).

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{DocumentChunk, TaggedDocument};

/// Split a tagged document into overlapping chunks.
/// Returns chunks with contiguous indices starting at 0; empty text
/// produces no chunks.
pub fn chunk_document(
    doc: &TaggedDocument,
    chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    split_windows(&doc.text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(index, content)| make_chunk(doc, index as i64, content))
        .collect()
}

/// Character windows of `chunk_size`, each starting `chunk_size - overlap`
/// after the previous. Operates on characters, not bytes, so multi-byte
/// text never splits mid-character.
fn split_windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

pub fn make_chunk(doc: &TaggedDocument, index: i64, content: String) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(doc.source.as_bytes());
    hasher.update(doc.collection.as_bytes());
    hasher.update(content.as_bytes());
    let content_hash = hex::encode(hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        source: doc.source.clone(),
        role: doc.role.clone(),
        collection: doc.collection.clone(),
        chunk_index: index,
        content,
        content_hash,
    }
}
