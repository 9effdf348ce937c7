//! # docqa
//!
//! Conversational question answering over user-supplied documents.
//!
//! Upload PDF, DOCX, or text files; docqa extracts their text, splits it
//! into overlapping chunks, embeds the chunks into an in-memory vector
//! index, and answers questions with a language model conditioned on the
//! retrieved chunks and the conversation so far.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌─────────┐   ┌──────────────┐
//! │ Extractor │──▶│ Chunker │──▶│ Indexer │──▶│ Conversation │
//! │ PDF/DOCX  │   │         │   │ cosine  │   │    engine    │
//! └───────────┘   └─────────┘   └─────────┘   └──────┬───────┘
//!                                                    │
//!                              ┌─────────────────────┤
//!                              ▼                     ▼
//!                         ┌──────────┐         ┌──────────┐
//!                         │   CLI    │         │   HTTP   │
//!                         │ (docqa)  │         │ sessions │
//!                         └──────────┘         └──────────┘
//! ```
//!
//! Chunking, indexing, prompting, and the conversation engine live in
//! [`docqa_core`]. This crate adds document extraction, concrete model
//! providers, the session controller, and the CLI and HTTP surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction from PDF, DOCX, and plain text |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, Hugging Face, local) |
//! | [`generation`] | Language model providers |
//! | [`session`] | Per-user index and conversation state |
//! | [`progress`] | Upload progress reporting |
//! | [`chat`] | CLI commands |
//! | [`server`] | HTTP server |

pub mod chat;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
mod http;
pub mod progress;
pub mod server;
pub mod session;

pub use docqa_core::{Error, Result};
