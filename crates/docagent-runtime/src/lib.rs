//! # docagent-runtime
//!
//! Runtime collaborators for the docagent session.
//!
//! ## Components
//!
//! - **Ollama** (default feature): local LLM inference through `ollama-rs`
//! - **Model factory**: resolves `provider:model` names into chat models
//! - **MCP connector**: spawns the documentation tool server and wraps its tools
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docagent_runtime::{ChatModelFactory, McpConnector, ToolServerConfig};
//!
//! let session = SessionManager::new(
//!     Arc::new(McpConnector::new(ToolServerConfig::from_lookup(|key| std::env::var(key).ok()))),
//!     Arc::new(ChatModelFactory::from_name("ollama:qwen3:8b", options)),
//! );
//! let ready = session.initialize().await?;
//! ```

pub mod mcp;
pub mod models;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use mcp::{McpConnector, ToolServerConfig};
pub use models::{ChatModelFactory, ModelSpec};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
