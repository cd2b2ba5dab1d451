//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for LLM backends and the [`ChatModel`] handle
//! the agents hold: a provider bound to one set of generation options.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docagent_core::provider::{ChatModel, GenerationOptions};
//!
//! let model = ChatModel::new(Arc::new(OllamaProvider::from_config(OllamaConfig::default())), GenerationOptions {
//!     model: "qwen3:8b".into(),
//!     temperature: 0.0,
//!     ..Default::default()
//! });
//! let completion = model.complete(&messages).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "qwen3:8b", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Context window the model is run with, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

const fn default_temperature() -> f32 { 0.7 }
const fn default_max_tokens() -> u32 { 2048 }
const fn default_top_p() -> f32 { 0.9 }
const fn default_context_window() -> u32 { 8192 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "qwen3:8b".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
            context_window: default_context_window(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,
}

impl Completion {
    /// A completion holding plain text
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
        }
    }
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agents work exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Estimate token count for text (provider-specific tokenization)
    #[allow(clippy::cast_possible_truncation)]
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Default: rough estimate of ~4 chars per token
        (text.len() / 4) as u32
    }
}

/// A provider bound to one model and its generation options.
///
/// Cheap to clone; every agent built for a request shares the same provider.
#[derive(Clone)]
pub struct ChatModel {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl ChatModel {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    /// Model identifier, e.g. `qwen3:8b`
    pub fn model_id(&self) -> &str {
        &self.options.model
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Context window in tokens
    pub const fn context_window(&self) -> u32 {
        self.options.context_window
    }

    /// Complete with the model's own options
    pub async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        self.provider.complete(messages, &self.options).await
    }

    /// Complete with extra stop sequences appended to the model's options
    pub async fn complete_until(&self, messages: &[Message], stop: &[&str]) -> Result<Completion> {
        let mut options = self.options.clone();
        options
            .stop_sequences
            .extend(stop.iter().map(|s| (*s).to_string()));
        self.provider.complete(messages, &options).await
    }

    /// Whether the model backend answers; failures count as unavailable
    pub async fn backend_available(&self) -> bool {
        self.provider.health_check().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Model backend health check failed");
            false
        })
    }

    /// Models the backend can serve
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.provider.list_models().await
    }

    /// Token estimate for a message, using the provider's tokenizer
    pub fn estimate_message_tokens(&self, message: &Message) -> u32 {
        self.provider.estimate_tokens(&message.content) + 4
    }
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
