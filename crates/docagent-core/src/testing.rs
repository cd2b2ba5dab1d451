//! Scripted collaborators for tests.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to downstream crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{ChatModel, Completion, GenerationOptions, LlmProvider, ModelInfo};
use crate::session::{ModelFactory, ToolConnector, ToolSession};
use crate::tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema};

/// Provider that replays canned completions in order
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    seen_options: Mutex<Vec<GenerationOptions>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    offline: bool,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Provider whose backend reports itself unavailable
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    /// Options passed to every `complete` call so far
    pub fn seen_options(&self) -> Vec<GenerationOptions> {
        self.seen_options.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Prompts passed to every `complete` call so far
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn health_check(&self) -> Result<bool> {
        Ok(!self.offline)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.seen_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(options.clone());
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.map(|content| Completion::text(options.model.clone(), content))
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if self.offline {
            return Err(AgentError::ProviderUnavailable("scripted backend offline".into()));
        }
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            name: "scripted".into(),
        }])
    }
}

/// Chat model backed by a [`ScriptedProvider`]
pub fn scripted_model<I, S>(responses: I) -> ChatModel
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ChatModel::new(
        Arc::new(ScriptedProvider::new(responses)),
        GenerationOptions {
            model: "scripted".into(),
            temperature: 0.0,
            ..Default::default()
        },
    )
}

/// Tool that always returns the same output
pub struct StaticTool {
    name: String,
    output: String,
    required: Vec<String>,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            required: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_required(mut self, param: impl Into<String>) -> Self {
        self.required.push(param.into());
        self
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: format!("Static tool {}", self.name),
            parameters: self
                .required
                .iter()
                .map(|param| ParameterSchema {
                    name: param.clone(),
                    param_type: "string".into(),
                    description: String::new(),
                    required: true,
                    default: None,
                    enum_values: None,
                })
                .collect(),
        }
    }

    async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
        Ok(ToolResult::success(self.name.clone(), self.output.clone()))
    }
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    discoveries: AtomicUsize,
}

/// Connector that counts connects, discoveries and closes
pub struct CountingConnector {
    tools: Vec<String>,
    refuse: bool,
    fail_discovery: bool,
    gate: Option<Arc<Notify>>,
    counters: Arc<Counters>,
}

impl CountingConnector {
    pub fn with_tools<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            refuse: false,
            fail_discovery: false,
            gate: None,
            counters: Arc::default(),
        }
    }

    /// Connector whose every connect attempt fails
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::with_tools(Vec::<String>::new())
        }
    }

    /// Connector whose sessions connect but fail tool discovery
    pub fn failing_discovery() -> Self {
        Self {
            fail_discovery: true,
            ..Self::with_tools(["fetch_docs"])
        }
    }

    /// Hold every connect attempt until `gate` is notified
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn discoveries(&self) -> usize {
        self.counters.discoveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolConnector for CountingConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.refuse {
            return Err(AgentError::Connection("connection refused".into()));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSession {
            tools: self.tools.clone(),
            fail_discovery: self.fail_discovery,
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
        }))
    }
}

struct CountingSession {
    tools: Vec<String>,
    fail_discovery: bool,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

#[async_trait]
impl ToolSession for CountingSession {
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        self.counters.discoveries.fetch_add(1, Ordering::SeqCst);
        if self.fail_discovery {
            return Err(AgentError::Connection("tool listing failed".into()));
        }
        Ok(self
            .tools
            .iter()
            .map(|name| Arc::new(StaticTool::new(name.clone(), format!("{name} result"))) as Arc<dyn Tool>)
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Connector whose connect attempts never complete, like a stalled tool server
pub struct PendingConnector;

#[async_trait]
impl ToolConnector for PendingConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        std::future::pending().await
    }
}

/// Factory handing out clones of one model
pub struct StaticModelFactory {
    model: ChatModel,
}

impl StaticModelFactory {
    pub const fn new(model: ChatModel) -> Self {
        Self { model }
    }
}

impl Default for StaticModelFactory {
    fn default() -> Self {
        Self::new(scripted_model(Vec::<String>::new()))
    }
}

impl ModelFactory for StaticModelFactory {
    fn create(&self) -> Result<ChatModel> {
        Ok(self.model.clone())
    }
}

/// Factory that fails a fixed number of times before succeeding
pub struct FlakyModelFactory {
    failures_left: AtomicUsize,
}

impl FlakyModelFactory {
    pub const fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
        }
    }
}

impl ModelFactory for FlakyModelFactory {
    fn create(&self) -> Result<ChatModel> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AgentError::Config("model backend not configured".into()));
        }
        Ok(scripted_model(Vec::<String>::new()))
    }
}
