//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Parse error (e.g., tool call parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tool server connection or handshake failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Session could not be brought up; everything acquired was released
    #[error("Session initialization failed: {0}")]
    Initialization(#[source] Box<AgentError>),

    /// Message role the agent runtime cannot represent
    #[error("Unsupported role {0}")]
    UnsupportedRole(String),

    /// Malformed request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Wrap any failure from the session bring-up sequence.
    pub fn initialization(cause: Self) -> Self {
        match cause {
            already @ Self::Initialization(_) => already,
            other => Self::Initialization(Box::new(other)),
        }
    }

    /// Whether the error was caused by the caller's request rather than the agent
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedRole(_) | Self::InvalidInput(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::MaxIterations(_) => "The request took too long to process. Please try a simpler query.".into(),
            Self::Connection(_) | Self::Initialization(_) => {
                "The documentation tools are not available right now. Please try again.".into()
            }
            Self::UnsupportedRole(role) => format!("Messages with role '{role}' are not supported."),
            Self::InvalidInput(msg) => format!("Invalid request: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
