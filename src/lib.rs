//! # Papershelf
//!
//! A local-first library for academic PDFs. Papers are found on arXiv (or
//! dropped into a downloads folder), their text and metadata are extracted,
//! long texts are split into chunks, and every chunk is stored in a vector
//! collection for semantic search.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ arXiv API   │──▶│  Downloads  │──▶│   Extract    │──▶│ Collection │
//! │ search/pdf  │   │   folder    │   │ dedup+chunk  │   │  SQLite    │
//! └─────────────┘   └─────────────┘   └──────────────┘   └─────┬──────┘
//!                                                              │
//!                                                        ┌─────▼─────┐
//!                                                        │    CLI    │
//!                                                        │  (shelf)  │
//!                                                        └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and id conventions |
//! | [`extract`] | PDF text and metadata extraction |
//! | [`chunk`] | Sentence-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`collection`] | Vector collections (SQLite, in-memory) |
//! | [`store`] | Document store: dedup, chunking, grouping |
//! | [`arxiv`] | arXiv search and PDF download |
//! | [`ingest`] | Bulk download/add loops with cancellation |
//! | [`library`] | The local downloads folder |
//! | [`progress`] | Progress reporting for bulk loops |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod arxiv;
pub mod arxiv_cmd;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod library;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod search;
pub mod stats;
pub mod store;
