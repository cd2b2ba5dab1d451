//! # docagent-core
//!
//! Core agent logic for the documentation agents: provider-agnostic chat
//! models, token-bounded memory, tools discovered from a tool server, and the
//! session that ties them together.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionManager                          │
//! │  ┌───────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │ ToolConnector │──│ ToolRegistry  │  │ ChatModel        │  │
//! │  │ (tool server) │  │ (discovered)  │  │ (LlmProvider)    │  │
//! │  └───────────────┘  └───────┬───────┘  └────────┬─────────┘  │
//! └─────────────────────────────┼───────────────────┼────────────┘
//!                 ┌─────────────┴───────┬───────────┘
//!          ┌──────┴──────┐       ┌──────┴──────┐
//!          │ ReActAgent  │       │ GraphAgent  │
//!          │ (RunEvents) │       │ (invoke)    │
//!          └─────────────┘       └─────────────┘
//! ```
//!
//! Concrete providers and the MCP connector live in `docagent-runtime`.

pub mod error;
pub mod graph;
pub mod memory;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{AgentError, Result};
pub use graph::{create_react_agent, GraphAgent, GraphState};
pub use memory::TokenMemory;
pub use message::{Message, Role};
pub use provider::{ChatModel, GenerationOptions, LlmProvider};
pub use reasoning::{ReActAgent, RunEvent, UpdateEvent, UpdateKey, UpdateValue};
pub use session::{ModelFactory, ReadySession, SessionManager, ToolConnector, ToolSession};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
