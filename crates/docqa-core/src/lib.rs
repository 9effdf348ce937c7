//! # docqa core
//!
//! Runtime-free logic for docqa: data models, the error taxonomy, text
//! chunking, the embedding and generation capability traits, the in-memory
//! vector index, prompt construction, and the conversation engine.
//!
//! This crate contains no tokio, HTTP, filesystem I/O, or other native-only
//! dependencies. Concrete providers, document extraction, and the session
//! controller live in the `docqa` application crate.

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;

pub use error::{Error, Result};
