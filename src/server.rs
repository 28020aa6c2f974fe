//! HTTP gateway: authentication and role-scoped document QA.
//!
//! Every shared resource — index pool, policy table, embedding and
//! generation providers, token service — is loaded once in [`build_state`]
//! and cloned into handlers as `Arc`s. Query handlers obtain a per-role
//! [`RagChain`] from a TTL cache instead of rebuilding the pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/auth/signup` | Register a username with a role |
//! | `POST` | `/auth/login` | Exchange credentials for a bearer token |
//! | `POST` | `/rag/query` | Ask a question scoped to the caller's role |
//! | `GET`  | `/me/collections` | Show the caller's allowed collections |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "Invalid or expired token" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `pipeline_error` (500), `internal` (500). Pipeline errors carry a generic
//! message; the full cause goes to the server log only.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::generate::{self, GenerationProvider};
use crate::migrate;
use crate::password;
use crate::policy::{self, RolePolicy};
use crate::rag::{ChainCache, PipelineError, RagChain, SourceRef};
use crate::token::{Claims, TokenService};
use crate::users::{MemoryUserRepository, User, UserRepository};

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    users: Arc<dyn UserRepository>,
    policy: Arc<RolePolicy>,
    tokens: Arc<TokenService>,
    chains: Arc<ChainCache>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
}

/// Load every shared resource once: index pool, policy, providers, token
/// service, chain cache. Fails fast on a broken configuration.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let pool = db::connect(&config).await?;
    migrate::run_migrations(&pool).await?;

    let policy = Arc::new(policy::load_policy(&config.policy)?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let generator = generate::create_generator(&config.generation)?;

    let secret = config.auth.resolve_secret();
    let tokens = Arc::new(TokenService::new(&secret, config.auth.token_ttl_minutes));
    let chains = Arc::new(ChainCache::new(Duration::from_secs(
        config.rag.chain_ttl_secs,
    )));

    Ok(AppState {
        config: Arc::new(config),
        pool,
        users: Arc::new(MemoryUserRepository::new()),
        policy,
        tokens,
        chains,
        embedder,
        generator,
    })
}

/// Assemble the router over prepared state. Split from [`run_server`] so
/// tests can drive the full stack in process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/signup", post(handle_signup))
        .route("/auth/login", post(handle_login))
        .route("/rag/query", post(handle_query))
        .route("/me/collections", get(handle_collections))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP gateway.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = build_state(config.clone()).await?;
    let app = build_router(state);

    println!("rolegate listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Pipeline failures map to 500 with a generic message per class; the full
/// cause is logged, never returned to the client.
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        tracing::error!(error = %err, "query pipeline failure");
        let message = match err {
            PipelineError::Initialization(_) => "Pipeline initialization error",
            PipelineError::Retrieval(_) | PipelineError::Generation(_) => "Query execution failed",
        };
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "pipeline_error".to_string(),
            message: message.to_string(),
        }
    }
}

/// Pull and validate the bearer token from the request headers.
fn bearer_claims(headers: &HeaderMap, state: &AppState) -> Result<Claims, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing bearer token"))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Malformed Authorization header"))?;
    state
        .tokens
        .validate(token)
        .ok_or_else(|| unauthorized("Invalid or expired token"))
}

// ============ POST /auth/signup ============

#[derive(Deserialize)]
struct SignupRequest {
    username: String,
    role: String,
    password: String,
}

#[derive(Serialize)]
struct SignupResponse {
    msg: String,
}

async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    if req.username.trim().is_empty() || req.role.trim().is_empty() || req.password.is_empty() {
        return Err(bad_request("username, role, and password are required"));
    }

    let password_hash = password::hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        internal("Signup failed")
    })?;

    let user = User {
        username: req.username.clone(),
        password_hash,
        role: req.role.clone(),
    };
    state
        .users
        .insert(user)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    tracing::info!(username = %req.username, role = %req.role, "user registered");

    Ok(Json(SignupResponse {
        msg: format!("user {} created with role {}", req.username, req.role),
    }))
}

// ============ POST /auth/login ============

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: String,
    role: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .users
        .find_by_username(&req.username)
        .await
        .ok_or_else(|| unauthorized("Invalid username or password"))?;

    if !password::verify_password(&req.password, &user.password_hash) {
        return Err(unauthorized("Invalid username or password"));
    }

    let access_token = state.tokens.issue(&user.username, &user.role).map_err(|e| {
        tracing::error!(error = %e, "token issuing failed");
        internal("Login failed")
    })?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        role: user.role,
    }))
}

// ============ POST /rag/query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponse {
    role: String,
    question: String,
    answer: String,
    sources: Vec<SourceRef>,
}

async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let claims = bearer_claims(&headers, &state)?;

    if claims.role.trim().is_empty() {
        return Err(forbidden("User role missing"));
    }
    let collections = state.policy.allowed_collections(&claims.role).to_vec();
    if collections.is_empty() {
        return Err(forbidden("User role missing"));
    }

    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    tracing::info!(role = %claims.role, "query received");

    let chain = state.chains.get_or_build(&claims.role, || {
        RagChain::new(
            &claims.role,
            collections,
            &state.config,
            state.embedder.clone(),
            state.generator.clone(),
            state.pool.clone(),
        )
    });

    let result = chain.answer(&req.question).await?;

    Ok(Json(QueryResponse {
        role: claims.role,
        question: req.question,
        answer: result.answer,
        sources: result.sources,
    }))
}

// ============ GET /me/collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    username: String,
    role: String,
    allowed_collections: Vec<String>,
}

async fn handle_collections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CollectionsResponse>, AppError> {
    let claims = bearer_claims(&headers, &state)?;
    let allowed = state.policy.allowed_collections(&claims.role).to_vec();

    Ok(Json(CollectionsResponse {
        username: claims.sub,
        role: claims.role,
        allowed_collections: allowed,
    }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
