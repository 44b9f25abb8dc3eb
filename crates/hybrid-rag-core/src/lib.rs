//! # Hybrid RAG Core
//!
//! Runtime-agnostic logic for Hybrid RAG: data models, the recursive text
//! splitter, the BM25 lexical index, reciprocal rank fusion, the retriever
//! trait with its lexical/semantic/hybrid variants, the store and embedding
//! abstractions, and the content-addressed ingestion pipeline.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete stores and providers live in the `hybrid-rag` app crate.

pub mod chunk;
pub mod embedding;
pub mod fusion;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod retriever;
pub mod store;
