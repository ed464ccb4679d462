//! # PDF Q&A
//!
//! Ask questions about a set of PDF documents. Uploaded PDFs are reduced to
//! text, split into overlapping chunks, embedded into an in-memory vector
//! index, and each question is answered by a hosted chat model from the
//! chunks most similar to it, with the running conversation kept per session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//! │   PDFs   │──▶│  Extract  │──▶│   Chunk   │──▶│ Embed+Index  │
//! └──────────┘   └───────────┘   └───────────┘   └──────┬───────┘
//!                                                       │ per session
//!                      ┌────────────────────────────────┤
//!                      ▼                                ▼
//!                 ┌──────────┐   retrieve+prompt   ┌──────────┐
//!                 │   CLI    │────────────────────▶│   LLM    │
//!                 │  / HTTP  │◀────────────────────│   API    │
//!                 └──────────┘       answer        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! pdfqa chat ./papers            # interactive terminal chat
//! pdfqa serve                    # HTTP API on 0.0.0.0:8000
//! pdfqa ingest ./papers          # extraction/chunking dry run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`prompt`] | Prompt templates |
//! | [`llm`] | Chat-completion clients |
//! | [`session`] | Session storage |
//! | [`assistant`] | Retrieval pipeline |
//! | [`files`] | Loading PDFs from disk |
//! | [`chat`] | Interactive terminal chat |
//! | [`ingest`] | Extraction dry run |
//! | [`server`] | HTTP API |

pub mod assistant;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod files;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod server;
pub mod session;
