//! Document ingestion pipeline.
//!
//! Walks a directory tree, tags every file with a role derived from its
//! parent folder name, extracts text, chunks it, embeds the chunks, and
//! writes them to the vector index. Content-hash dedup makes re-running
//! over an unchanged tree a no-op.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::extract;
use crate::index;
use crate::migrate;
use crate::models::TaggedDocument;

/// Department keywords checked in order; the first substring match wins.
/// The order is a tie-break policy for folder names matching more than one.
const ROLE_KEYWORDS: &[(&str, &str)] = &[
    ("marketing", "Marketing"),
    ("finance", "Finance"),
    ("employee", "Employee"),
    ("management", "Management"),
];

/// Map a folder name to a role tag.
///
/// Case-insensitive substring match against the keyword list; names
/// matching nothing fall back to `"General"`. `"Finance_Reports"` and
/// `"finance-2024"` both map to `"Finance"`.
pub fn derive_role(folder_name: &str) -> String {
    let lower = folder_name.to_lowercase();
    for (keyword, role) in ROLE_KEYWORDS {
        if lower.contains(keyword) {
            return (*role).to_string();
        }
    }
    "General".to_string()
}

/// Collection tag a role's documents are indexed under.
pub fn collection_for_role(role: &str) -> String {
    format!("{}_docs", role.to_lowercase())
}

/// Run the ingestion pipeline over `dir`.
///
/// With `dry_run` the tree is scanned and chunk counts estimated without
/// touching the index or the embedding provider.
pub async fn run_ingest(config: &Config, dir: &Path, dry_run: bool) -> Result<()> {
    if !dir.exists() {
        bail!("Ingest directory does not exist: {}", dir.display());
    }

    let files = scan_directory(dir, config)?;

    let mut documents = Vec::new();
    let mut files_failed = 0u64;

    for path in &files {
        match load_document(path, dir) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file");
                files_failed += 1;
            }
        }
    }

    if dry_run {
        let estimated: usize = documents
            .iter()
            .map(|doc| chunk_document(doc, config.chunking.chunk_size, config.chunking.overlap).len())
            .sum();
        println!("ingest {} (dry-run)", dir.display());
        println!("  files found: {}", documents.len());
        println!("  files skipped: {}", files_failed);
        println!("  estimated chunks: {}", estimated);
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let provider = embedding::create_provider(&config.embedding)?;

    let mut chunks_written = 0u64;
    let mut duplicates_skipped = 0u64;

    for doc in &documents {
        let chunks = chunk_document(doc, config.chunking.chunk_size, config.chunking.overlap);
        if chunks.is_empty() {
            continue;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = provider.embed(&texts).await?;

        let summary = index::insert_chunks(&pool, &chunks, &embeddings, provider.model_name()).await?;
        chunks_written += summary.inserted;
        duplicates_skipped += summary.skipped;

        tracing::debug!(
            source = %doc.source,
            role = %doc.role,
            chunks = chunks.len(),
            "ingested file"
        );
    }

    println!("ingest {}", dir.display());
    println!("  files scanned: {}", documents.len());
    println!("  files skipped: {}", files_failed);
    println!("  chunks written: {}", chunks_written);
    println!("  duplicates skipped: {}", duplicates_skipped);
    println!("  index totals:");
    for (collection, count) in index::collection_counts(&pool).await? {
        println!("    {}: {} chunks", collection, count);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Walk `dir` and return the files passing the include/exclude globs,
/// sorted for deterministic ordering.
fn scan_directory(dir: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.ingest.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.ingest.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(dir).follow_links(config.ingest.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Read one file into a role-tagged document.
fn load_document(path: &Path, _root: &Path) -> Result<TaggedDocument> {
    let bytes = std::fs::read(path)?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let text = extract::extract_text(&bytes, &extension)?;

    let folder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let role = derive_role(&folder);
    let collection = collection_for_role(&role);

    Ok(TaggedDocument {
        source: path.display().to_string(),
        role,
        collection,
        text,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
