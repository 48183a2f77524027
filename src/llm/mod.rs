//! Text generation client abstraction.
//!
//! The engine only needs "prompt in, text out". [`LLMClient`] is that seam;
//! [`AnthropicClient`] is the bundled HTTP implementation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use narrative_memory::llm::{AnthropicClient, ClientConfig, CompletionRequest, LLMClient};
//!
//! let client = AnthropicClient::new(
//!     ClientConfig::new("your-api-key").with_default_model("claude-3-5-sonnet-20241022"),
//! )?;
//! let response = client.complete(CompletionRequest::prompt("Hello")).await?;
//! ```

mod client;
mod types;

pub use client::{AnthropicClient, ClientConfig, LLMClient};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, StopReason, TokenUsage,
};
