//! # Hybrid RAG
//!
//! Question answering over an ingested corpus. Retrieval fuses two
//! independent signals, BM25 over the chunk text and embedding similarity,
//! with reciprocal rank fusion, and the fused chunks become the context of
//! a generated answer.
//!
//! The ranking logic (splitter, BM25, fusion, retrievers, ingestion) lives
//! in `hybrid-rag-core`. This crate supplies the SQLite store, the HTTP
//! embedding and generation providers, the chat use case and the
//! `rag` CLI / HTTP surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ JSON items   │──▶│ Split+Embed  │──▶│  SQLite  │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                   ┌────────────────────────┤
//!                   ▼                        ▼
//!             ┌──────────┐  RRF  ┌──────────────┐
//!             │   BM25   │──────▶│   Generator  │
//!             │ + cosine │       │ (chat/cache) │
//!             └──────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag ingest faq.json
//! rag search "refund policy"
//! rag ask "how do refunds work?"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite chunk and document store |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generators |
//! | [`cache`] | Response cache and chat history |
//! | [`pipeline`] | Lazily initialized hybrid retrieval + generation |
//! | [`chat`] | Conversational use case |
//! | [`services`] | Wiring shared by CLI and server |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod cache;
pub mod chat;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;
