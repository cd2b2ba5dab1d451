//! Model Factory
//!
//! Builds [`ChatModel`] handles from `provider:model` names such as
//! `ollama:qwen3:8b`.

use std::sync::Arc;

use docagent_core::{
    error::{AgentError, Result},
    provider::{ChatModel, GenerationOptions},
    session::ModelFactory,
};

#[cfg(feature = "ollama")]
use crate::ollama::{OllamaConfig, OllamaProvider};

pub const DEFAULT_MODEL_NAME: &str = "ollama:qwen3:8b";

/// A parsed `provider:model` name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    /// Split at the first `:`; the model part may contain further colons.
    pub fn parse(name: &str) -> Result<Self> {
        let (provider, model) = name
            .split_once(':')
            .ok_or_else(|| AgentError::Config(format!("model name '{name}' is not of the form provider:model")))?;

        if model.trim().is_empty() {
            return Err(AgentError::Config(format!("model name '{name}' has no model")));
        }

        Ok(Self {
            provider: provider.trim().to_lowercase(),
            model: model.trim().to_string(),
        })
    }
}

/// [`ModelFactory`] resolving a configured model name
#[derive(Clone, Debug)]
pub struct ChatModelFactory {
    name: String,
    options: GenerationOptions,
    #[cfg(feature = "ollama")]
    ollama: OllamaConfig,
}

impl ChatModelFactory {
    /// The name is only parsed by [`ModelFactory::create`], so a bad name
    /// surfaces as a session initialization failure.
    pub fn from_name(name: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            name: name.into(),
            options,
            #[cfg(feature = "ollama")]
            ollama: OllamaConfig::default(),
        }
    }

    #[cfg(feature = "ollama")]
    #[must_use]
    pub fn with_ollama(mut self, config: OllamaConfig) -> Self {
        self.ollama = config;
        self
    }
}

impl ModelFactory for ChatModelFactory {
    fn create(&self) -> Result<ChatModel> {
        let spec = ModelSpec::parse(&self.name)?;
        let options = GenerationOptions {
            model: spec.model.clone(),
            ..self.options.clone()
        };

        match spec.provider.as_str() {
            #[cfg(feature = "ollama")]
            "ollama" => {
                tracing::debug!(model = %spec.model, host = %self.ollama.base_url(), "Creating Ollama chat model");
                let provider = OllamaProvider::from_config(&self.ollama);
                Ok(ChatModel::new(Arc::new(provider), options))
            }
            other => Err(AgentError::Config(format!("unsupported model provider '{other}'"))),
        }
    }
}
