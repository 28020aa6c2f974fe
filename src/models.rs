//! Core data models for the ingestion and retrieval pipeline.

/// A document loaded from disk, tagged before chunking.
///
/// `role` is the display tag derived from the source folder (for example
/// "Finance"); `collection` is the retrieval tag the access policy speaks
/// in (for example "finance_docs").
#[derive(Debug, Clone)]
pub struct TaggedDocument {
    pub source: String,
    pub role: String,
    pub collection: String,
    pub text: String,
}

/// A bounded span of a tagged document, ready for embedding and storage.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub role: String,
    pub collection: String,
    pub chunk_index: i64,
    pub content: String,
    /// Dedup key over (source, collection, content).
    pub content_hash: String,
}
