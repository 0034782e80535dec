//! Completion capability for RAGent.
//!
//! A provider-agnostic abstraction over language-model completion. The
//! pipeline depends only on the [`LlmClient`] trait, so tests can swap in
//! deterministic stand-ins.
//!
//! # Providers
//! - **Ollama**: local runtime (default)
//! - **OpenAI-compatible**: api.openai.com or any server with the same route
//!
//! # Example
//! ```no_run
//! use ragent_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2").with_max_tokens(64);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
