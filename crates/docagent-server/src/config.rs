//! Server Configuration

use docagent_core::{AgentError, GenerationOptions, Result};
use docagent_runtime::{models::DEFAULT_MODEL_NAME, OllamaConfig, ToolServerConfig};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// `provider:model` name of the chat model
    pub model_name: String,

    pub temperature: f32,

    pub ollama: OllamaConfig,

    pub tool_server: ToolServerConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let temperature = match lookup("MODEL_TEMPERATURE") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AgentError::Config(format!("MODEL_TEMPERATURE must be a number, got '{raw}'")))?,
            None => 0.0,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            model_name: lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.into()),
            temperature,
            ollama: OllamaConfig::from_lookup(&lookup),
            tool_server: ToolServerConfig::from_lookup(&lookup),
        })
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            ..Default::default()
        }
    }
}
