//! # Rolegate
//!
//! Role-gated document question answering over a local vector index.
//!
//! Rolegate ingests a folder tree of documents, tags every file with the
//! role derived from its parent folder name, and serves role-scoped
//! retrieval-augmented answers over HTTP: users sign up with a role, log in
//! for a signed bearer token, and ask questions; retrieval only ever touches
//! the collections that role is allowed to read.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌─────────┐
//! │ Folder tree │──▶│  Pipeline   │──▶│ SQLite  │
//! │ (role tags) │   │ Chunk+Embed │   │ vectors │
//! └────────────┘   └─────────────┘   └───┬─────┘
//!                                        │
//!                     ┌──────────────────┤
//!                     ▼                  ▼
//!                ┌───────────┐     ┌──────────┐
//!                │    CLI    │     │   HTTP   │
//!                │ (rolegate)│     │ gateway  │
//!                └───────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rolegate init                      # create database
//! rolegate ingest ./docs             # index a role-tagged folder tree
//! rolegate ask "What is the Q1 budget?" --role Finance
//! rolegate serve                     # start the HTTP gateway
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF / Markdown / plain-text extraction |
//! | [`chunk`] | Overlapping character-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generate`] | Answer generation providers |
//! | [`index`] | Vector index storage and retrieval |
//! | [`ingest`] | Role-tagging ingestion pipeline |
//! | [`policy`] | Role-access policy |
//! | [`password`] | Password hashing and verification |
//! | [`token`] | Signed bearer tokens |
//! | [`users`] | User repository |
//! | [`rag`] | Retrieval-augmented answering |
//! | [`server`] | HTTP gateway |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod password;
pub mod policy;
pub mod rag;
pub mod server;
pub mod token;
pub mod users;
