//! Role-scoped retrieval-augmented answering.
//!
//! A [`RagChain`] binds one role's allowed collections to the shared
//! embedding provider, generation provider, and index pool. Answering a
//! question embeds it, retrieves the top matching chunks from the allowed
//! collections only, assembles a bounded prompt, and invokes generation.
//!
//! The HTTP gateway keeps one chain per role in a [`ChainCache`] with a
//! bounded lifetime; the `ask` command builds a chain on demand. Providers
//! and the pool are loaded once at startup and shared by every chain.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, embed_query, EmbeddingProvider};
use crate::generate::{self, GenerationError, GenerationProvider, EMPTY_CONTEXT};
use crate::index::{self, ScoredChunk};
use crate::migrate;
use crate::policy;

/// Separator between chunk bodies in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Appended when the context is cut to the budget.
pub const TRUNCATION_MARKER: &str = "\n\n[...context truncated...]";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline initialization failed: {0}")]
    Initialization(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// One cited source in a query response.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub role: String,
    pub content_snippet: String,
}

/// The result of answering one question.
#[derive(Debug, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// A retrieval-and-generation pipeline scoped to one role.
pub struct RagChain {
    role: String,
    collections: Vec<String>,
    top_k: usize,
    context_budget: usize,
    snippet_chars: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    pool: SqlitePool,
}

impl RagChain {
    pub fn new(
        role: &str,
        collections: Vec<String>,
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            role: role.to_string(),
            collections,
            top_k: config.retrieval.top_k,
            context_budget: config.rag.context_budget,
            snippet_chars: config.rag.snippet_chars,
            embedder,
            generator,
            pool,
        }
    }

    /// Answer a question from the chunks this role is allowed to see.
    ///
    /// Zero retrieval matches is not an error; the generator sees the
    /// no-context placeholder and declines.
    pub async fn answer(&self, question: &str) -> Result<RagAnswer, PipelineError> {
        let query_vec = embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;

        let chunks = index::search(&self.pool, &query_vec, &self.collections, self.top_k)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;

        tracing::debug!(
            role = %self.role,
            matches = chunks.len(),
            "retrieved context chunks"
        );

        let context = build_context(&chunks, self.context_budget);
        let prompt = build_prompt(&self.role, &context, question);
        let answer = self.generator.generate(&prompt).await?;
        let sources = collect_sources(&chunks, self.snippet_chars);

        Ok(RagAnswer { answer, sources })
    }
}

/// Join chunk bodies into a prompt context, bounded by `budget` characters.
///
/// Empty retrieval yields the placeholder. An over-budget context is cut to
/// exactly `budget` characters with the truncation marker appended.
pub fn build_context(chunks: &[ScoredChunk], budget: usize) -> String {
    if chunks.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let joined = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    if joined.chars().count() <= budget {
        return joined;
    }

    let mut cut: String = joined.chars().take(budget).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Assemble the generation prompt: instruction header, role line, context,
/// question, trailing answer cue.
pub fn build_prompt(role: &str, context: &str, question: &str) -> String {
    format!(
        "You are an assistant that MUST use ONLY the supplied Context to answer. \
         If the answer does not appear in the Context, respond: \
         \"I don't have enough information to answer that.\"\n\n\
         Role: {}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        role, context, question
    )
}

fn collect_sources(chunks: &[ScoredChunk], snippet_chars: usize) -> Vec<SourceRef> {
    chunks
        .iter()
        .map(|chunk| SourceRef {
            source: chunk.source.clone(),
            role: chunk.role.clone(),
            content_snippet: chunk.content.chars().take(snippet_chars).collect(),
        })
        .collect()
}

/// Per-role cache of built chains with a bounded lifetime.
///
/// Expired entries are rebuilt from the shared resources on the next
/// lookup; the providers themselves are never reloaded.
pub struct ChainCache {
    ttl: Duration,
    chains: RwLock<HashMap<String, (Instant, Arc<RagChain>)>>,
}

impl ChainCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            chains: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, role: &str) -> Option<Arc<RagChain>> {
        let chains = self.chains.read().unwrap();
        chains.get(role).and_then(|(built, chain)| {
            if built.elapsed() < self.ttl {
                Some(chain.clone())
            } else {
                None
            }
        })
    }

    /// Return the cached chain for `role`, building (and caching) a fresh
    /// one if absent or expired.
    pub fn get_or_build<F>(&self, role: &str, build: F) -> Arc<RagChain>
    where
        F: FnOnce() -> RagChain,
    {
        if let Some(chain) = self.get(role) {
            return chain;
        }

        let chain = Arc::new(build());
        let mut chains = self.chains.write().unwrap();
        chains.insert(role.to_string(), (Instant::now(), chain.clone()));
        chain
    }
}

/// One-shot query through the full chain, without HTTP.
pub async fn run_ask(config: &Config, question: &str, role: &str) -> anyhow::Result<()> {
    let policy = policy::load_policy(&config.policy)?;
    let collections = policy.allowed_collections(role).to_vec();
    if collections.is_empty() {
        anyhow::bail!("Role '{}' has no allowed collections", role);
    }

    let embedder = embedding::create_provider(&config.embedding)
        .map_err(|e| PipelineError::Initialization(e.to_string()))?;
    let generator = generate::create_generator(&config.generation)
        .map_err(|e| PipelineError::Initialization(e.to_string()))?;
    let pool = db::connect(config)
        .await
        .map_err(|e| PipelineError::Initialization(e.to_string()))?;
    migrate::run_migrations(&pool).await?;

    let chain = RagChain::new(role, collections, config, embedder, generator, pool.clone());
    let result = chain.answer(question).await?;

    println!("role: {}", role);
    println!("question: {}", question);
    println!();
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!();
        println!("sources:");
        for src in &result.sources {
            println!("  - {} ({})", src.source, src.role);
        }
    }

    pool.close().await;
    Ok(())
}
