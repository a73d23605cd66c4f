//! cursus-providers: text insight provider integrations.
//!
//! Implements the `TextInsightProvider` trait for Gemini, OpenAI-compatible
//! endpoints and Ollama, plus an offline mock, and loads `cursus.toml`.

pub mod config;
pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, CursusConfig, ProviderConfig};
pub use cursus_core::error::ProviderError;
