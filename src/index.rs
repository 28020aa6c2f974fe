//! Vector index storage and retrieval over SQLite.
//!
//! Chunks live in a single `chunks` table with their embedding stored as a
//! little-endian f32 BLOB. Retrieval is a brute-force scan: fetch every row
//! in the allowed collections, compute cosine similarity in Rust, sort
//! descending, keep the top k. At the index sizes this serves (thousands of
//! chunks) a scan beats maintaining an ANN structure.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::DocumentChunk;

/// Counts reported by [`insert_chunks`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertSummary {
    pub inserted: u64,
    pub skipped: u64,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub source: String,
    pub role: String,
    pub collection: String,
    pub chunk_index: i64,
    pub content: String,
    pub score: f32,
}

/// Insert chunks with their embeddings, skipping duplicates.
///
/// The `content_hash` column carries a UNIQUE constraint; re-ingesting
/// unchanged content is a no-op counted in `skipped`.
pub async fn insert_chunks(
    pool: &SqlitePool,
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
    model: &str,
) -> Result<InsertSummary> {
    anyhow::ensure!(
        chunks.len() == embeddings.len(),
        "chunk/embedding count mismatch: {} vs {}",
        chunks.len(),
        embeddings.len()
    );

    let now = chrono::Utc::now().timestamp();
    let mut summary = InsertSummary::default();

    for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
        let result = sqlx::query(
            r#"
            INSERT INTO chunks
                (id, source, role, collection, chunk_index, content,
                 content_hash, embedding, dims, model, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.source)
        .bind(&chunk.role)
        .bind(&chunk.collection)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(&chunk.content_hash)
        .bind(vec_to_blob(embedding))
        .bind(embedding.len() as i64)
        .bind(model)
        .bind(now)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            summary.inserted += 1;
        } else {
            summary.skipped += 1;
        }
    }

    Ok(summary)
}

/// Top-k similarity search restricted to the allowed collections.
///
/// An empty allowed set returns no rows; callers never see chunks from
/// collections outside the set. Ties keep the scan order of the result set.
pub async fn search(
    pool: &SqlitePool,
    query_vec: &[f32],
    allowed_collections: &[String],
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    if allowed_collections.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; allowed_collections.len()].join(", ");
    let sql = format!(
        "SELECT id, source, role, collection, chunk_index, content, embedding \
         FROM chunks WHERE collection IN ({})",
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for collection in allowed_collections {
        query = query.bind(collection);
    }
    let rows = query.fetch_all(pool).await?;

    let mut scored: Vec<ScoredChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            ScoredChunk {
                id: row.get("id"),
                source: row.get("source"),
                role: row.get("role"),
                collection: row.get("collection"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                score: cosine_similarity(query_vec, &vec),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);

    Ok(scored)
}

/// Count indexed chunks per collection, for status output.
pub async fn collection_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT collection, COUNT(*) AS n FROM chunks GROUP BY collection ORDER BY collection",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("collection"), row.get("n")))
        .collect())
}
