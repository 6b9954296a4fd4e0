//! Gemini provider adapter
//!
//! Reference implementation of the provider contract for Google's Gemini
//! API: request translation, retry with exponential backoff, SSE event
//! conversion, file-upload preprocessing, and error classification.

pub mod config;
pub mod convert;
pub mod error;
pub mod files;
pub mod streaming;
pub mod types;

mod client;

pub use client::GeminiProvider;
pub use config::GeminiConfig;
pub use files::{FILE_TTL, FileStore};
