use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Built-in signing secret used when neither the config file nor the
/// environment supplies one. Fine for local development, nothing else.
const DEV_SECRET: &str = "rolegate-dev-secret-change-me";

/// Environment variable consulted when `[auth].secret` is absent.
pub const SECRET_ENV: &str = "ROLEGATE_SECRET";

/// Environment variable consulted when `[policy].path` is absent.
pub const POLICY_PATH_ENV: &str = "ROLEGATE_POLICY_PATH";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// SQLite file holding chunk text, metadata, and embedding vectors.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Token signing secret. Falls back to the `ROLEGATE_SECRET` environment
    /// variable, then to a built-in development secret.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

fn default_token_ttl() -> i64 {
    30
}

impl AuthConfig {
    /// Resolve the signing secret: config file, then environment, then the
    /// built-in development fallback (with a warning).
    pub fn resolve_secret(&self) -> String {
        if let Some(secret) = &self.secret {
            if !secret.is_empty() {
                return secret.clone();
            }
        }
        if let Ok(secret) = std::env::var(SECRET_ENV) {
            if !secret.is_empty() {
                return secret;
            }
        }
        tracing::warn!(
            "no signing secret configured ([auth].secret or {}), using built-in development secret",
            SECRET_ENV
        );
        DEV_SECRET.to_string()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    /// Optional JSON file mapping role names to allowed collection tags.
    /// When absent (and `ROLEGATE_POLICY_PATH` is unset) the built-in
    /// default table is used.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `hash`, `ollama`, `openai`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// One of `extractive`, `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Upper bound on generated output, in model tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "extractive".to_string()
}
fn default_max_output_tokens() -> usize {
    300
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Maximum characters of retrieved context allowed into a prompt.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    /// How long a cached per-role chain stays valid.
    #[serde(default = "default_chain_ttl")]
    pub chain_ttl_secs: u64,
    /// Length of the content snippet cited per source.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            context_budget: default_context_budget(),
            chain_ttl_secs: default_chain_ttl(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_context_budget() -> usize {
    3000
}
fn default_chain_ttl() -> u64 {
    300
}
fn default_snippet_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" => {}
        "ollama" | "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, ollama, or openai.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "extractive" => {}
        "ollama" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be extractive or ollama.",
            other
        ),
    }
    if config.generation.max_output_tokens == 0 {
        anyhow::bail!("generation.max_output_tokens must be > 0");
    }

    // Validate rag
    if config.rag.context_budget == 0 {
        anyhow::bail!("rag.context_budget must be > 0");
    }

    // Validate auth
    if config.auth.token_ttl_minutes <= 0 {
        anyhow::bail!("auth.token_ttl_minutes must be > 0");
    }

    Ok(config)
}

/// All-defaults config pointing at the given index file.
#[cfg(test)]
pub fn test_config(index_path: PathBuf) -> Config {
    Config {
        index: IndexConfig { path: index_path },
        server: ServerConfig::default(),
        auth: AuthConfig::default(),
        policy: PolicyConfig::default(),
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
        rag: RagConfig::default(),
        ingest: IngestConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("rolegate.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[index]\npath = \"data/index.sqlite\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 150);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.generation.provider, "extractive");
        assert_eq!(config.rag.context_budget, 3000);
        assert_eq!(config.auth.token_ttl_minutes, 30);
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[index]\npath = \"x.sqlite\"\n\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[index]\npath = \"x.sqlite\"\n\n[embedding]\nprovider = \"quantum\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn ollama_generation_requires_model() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[index]\npath = \"x.sqlite\"\n\n[generation]\nprovider = \"ollama\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("generation.model"));
    }

    #[test]
    fn config_file_secret_wins_over_fallback() {
        let auth = AuthConfig {
            secret: Some("from-file".to_string()),
            token_ttl_minutes: 30,
        };
        assert_eq!(auth.resolve_secret(), "from-file");
    }
}
