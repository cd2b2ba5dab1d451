//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern as a stream of typed events.
//! The model answers in instruction lines (`Thought:`, `Function Name:`,
//! `Function Input:`, `Final Answer:`); the agent executes requested
//! functions, feeds back `Function Output:` lines and reports every parsed
//! field as an [`UpdateEvent`] while the run is in progress.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::memory::TokenMemory;
use crate::message::Message;
use crate::provider::ChatModel;
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

const THOUGHT: &str = "Thought:";
const FUNCTION_NAME: &str = "Function Name:";
const FUNCTION_INPUT: &str = "Function Input:";
const FUNCTION_OUTPUT: &str = "Function Output:";
const FINAL_ANSWER: &str = "Final Answer:";

/// Which part of a ReAct step an update carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKey {
    Thought,
    ToolName,
    ToolInput,
    ToolOutput,
    FinalAnswer,
}

impl UpdateKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::ToolName => "tool_name",
            Self::ToolInput => "tool_input",
            Self::ToolOutput => "tool_output",
            Self::FinalAnswer => "final_answer",
        }
    }
}

impl std::fmt::Display for UpdateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateValue {
    Text(String),
    Structured(serde_json::Value),
}

impl UpdateValue {
    /// Text rendering; structured values become compact JSON
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(serde_json::Value::String(text)) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// One field of a ReAct step, reported as soon as it is known
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub key: UpdateKey,
    pub value: UpdateValue,
}

impl UpdateEvent {
    pub fn text(key: UpdateKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: UpdateValue::Text(value.into()),
        }
    }

    pub const fn structured(key: UpdateKey, value: serde_json::Value) -> Self {
        Self {
            key,
            value: UpdateValue::Structured(value),
        }
    }
}

/// Events emitted by [`ReActAgent::run`]
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// A new reasoning iteration started (1-based)
    Start { iteration: usize },
    /// A step field was produced
    Update(UpdateEvent),
    /// The run finished with an answer
    Success { answer: String, iterations: usize },
}

/// One parsed model turn
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReActStep {
    pub thought: Option<String>,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
    pub final_answer: Option<String>,
    /// The turn as the model wrote it, minus any hallucinated function output
    pub raw: String,
}

#[derive(Clone, Copy)]
enum Field {
    Thought,
    ToolName,
    ToolInput,
    FinalAnswer,
}

impl ReActStep {
    /// Parse instruction lines out of a model turn.
    ///
    /// Lines that do not start with a known label continue the current
    /// field. Anything from a `Function Output:` line on is dropped, since
    /// the model must not write tool results itself. A turn without any
    /// known label is taken as the final answer.
    pub fn parse(content: &str) -> Self {
        let content = strip_think_blocks(content);
        let mut step = Self::default();
        let mut current: Option<Field> = None;
        let mut kept = Vec::new();
        let mut saw_label = false;

        for line in content.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with(FUNCTION_OUTPUT) {
                break;
            }
            kept.push(line);

            let labelled = [
                (THOUGHT, Field::Thought),
                (FUNCTION_NAME, Field::ToolName),
                (FUNCTION_INPUT, Field::ToolInput),
                (FINAL_ANSWER, Field::FinalAnswer),
            ]
            .into_iter()
            .find_map(|(label, field)| trimmed.strip_prefix(label).map(|rest| (field, rest)));

            match (labelled, current) {
                (Some((field, rest)), _) => {
                    saw_label = true;
                    current = Some(field);
                    *step.slot(field) = Some(rest.trim().to_string());
                }
                (None, Some(field)) => {
                    if let Some(value) = step.slot(field) {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(line.trim_end());
                    }
                }
                (None, None) => {}
            }
        }

        step.raw = kept.join("\n").trim().to_string();
        if !saw_label && !step.raw.is_empty() {
            step.final_answer = Some(step.raw.clone());
        }
        step
    }

    const fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Thought => &mut self.thought,
            Field::ToolName => &mut self.tool_name,
            Field::ToolInput => &mut self.tool_input,
            Field::FinalAnswer => &mut self.final_answer,
        }
    }

    /// Function arguments; an empty input means no arguments
    pub fn tool_arguments(&self) -> Result<HashMap<String, serde_json::Value>> {
        let raw = self.tool_input.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(HashMap::new());
        }
        let raw = raw
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        serde_json::from_str(raw)
            .map_err(|e| AgentError::Parse(format!("Function Input is not a JSON object: {e}")))
    }
}

/// Remove `<think>...</think>` sections some reasoning models emit
fn strip_think_blocks(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Instructions placed ahead of the communication rules
    pub instructions: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.into(),
            max_iterations: 10,
        }
    }
}

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant that answers questions using the documentation functions available to you.";

const COMMUNICATION_RULES: &str = r#"# Communication structure
You communicate only in instruction lines. The format is: "Instruction: expected output". You must only use these instruction lines and must not enter empty lines or anything else between instruction lines.
You must skip the instruction lines Function Name, Function Input and Function Output if no function calling is required.

Thought: Your reasoning about how to answer the user's question.
Function Name: Name of the function to call. It must be one of the available functions.
Function Input: The input to the function as a valid JSON object.
Function Output: Output of the function. It is written by the system, never by you.
Final Answer: The answer to the user's question.

Always start with a Thought. End with a Final Answer once you have enough information."#;

/// ReAct agent bound to one model, one tool set and one memory
pub struct ReActAgent {
    model: ChatModel,
    tools: Arc<ToolRegistry>,
    memory: TokenMemory,
    config: AgentConfig,
}

impl ReActAgent {
    /// Create with default configuration
    pub fn new(model: ChatModel, tools: Arc<ToolRegistry>, memory: TokenMemory) -> Self {
        Self::with_config(model, tools, memory, AgentConfig::default())
    }

    pub const fn with_config(
        model: ChatModel,
        tools: Arc<ToolRegistry>,
        memory: TokenMemory,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            tools,
            memory,
            config,
        }
    }

    pub const fn memory(&self) -> &TokenMemory {
        &self.memory
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.instructions.clone();
        prompt.push_str("\n\n");
        prompt.push_str(COMMUNICATION_RULES);
        prompt.push_str("\n\n# Available functions\n");
        if self.tools.is_empty() {
            prompt.push_str("No functions are available.\n");
        } else {
            prompt.push_str(&self.tools.describe_tools());
        }
        prompt
    }

    /// Run the agent over the current memory.
    ///
    /// The stream ends after [`RunEvent::Success`] or the first error. The
    /// final answer is appended to memory; intermediate steps are not.
    pub fn run(&mut self) -> impl Stream<Item = Result<RunEvent>> + Send + '_ {
        try_stream! {
            let system = Message::system(self.build_system_prompt());
            let max_iterations = self.config.max_iterations;
            let mut scratchpad: Vec<Message> = Vec::new();
            let mut finished = false;

            for iteration in 1..=max_iterations {
                yield RunEvent::Start { iteration };

                let prompt: Vec<Message> = std::iter::once(system.clone())
                    .chain(self.memory.messages().iter().cloned())
                    .chain(scratchpad.iter().cloned())
                    .collect();

                let completion = self.model.complete_until(&prompt, &[FUNCTION_OUTPUT]).await?;
                let step = ReActStep::parse(&completion.content);
                tracing::debug!(iteration, model = %completion.model, raw = %step.raw, "ReAct step");

                if let Some(thought) = step.thought.as_ref().filter(|t| !t.is_empty()) {
                    yield RunEvent::Update(UpdateEvent::text(UpdateKey::Thought, thought.clone()));
                }

                if let Some(name) = step.tool_name.clone().filter(|n| !n.is_empty()) {
                    yield RunEvent::Update(UpdateEvent::text(UpdateKey::ToolName, name.clone()));

                    let (call_id, result) = match step.tool_arguments() {
                        Ok(arguments) => {
                            let call = ToolCall::new(name.clone(), arguments);
                            yield RunEvent::Update(UpdateEvent::structured(
                                UpdateKey::ToolInput,
                                call.arguments_json(),
                            ));
                            tracing::debug!(tool = %call.name, "Executing tool");
                            (call.id.clone(), self.execute_tool(&call).await)
                        }
                        Err(e) => {
                            let raw = step.tool_input.clone().unwrap_or_default();
                            yield RunEvent::Update(UpdateEvent::text(UpdateKey::ToolInput, raw));
                            (None, ToolResult::failure(name.clone(), e.to_string()))
                        }
                    };

                    yield RunEvent::Update(UpdateEvent::text(UpdateKey::ToolOutput, result.output.clone()));

                    scratchpad.push(Message::assistant(step.raw.clone()));
                    scratchpad.push(Message::tool(
                        format!("{FUNCTION_OUTPUT} {}", result.output),
                        name,
                        call_id,
                    ));
                    continue;
                }

                if let Some(answer) = step.final_answer.clone() {
                    yield RunEvent::Update(UpdateEvent::text(UpdateKey::FinalAnswer, answer.clone()));
                    self.memory.add(Message::assistant(answer.clone()));
                    yield RunEvent::Success { answer, iterations: iteration };
                    finished = true;
                    break;
                }

                // A thought on its own; let the model continue from it
                if !step.raw.is_empty() {
                    scratchpad.push(Message::assistant(step.raw.clone()));
                }
            }

            if !finished {
                Err::<(), _>(AgentError::MaxIterations(max_iterations))?;
            }
        }
    }

    /// Execute a tool call; failures are reported to the model, not raised
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(mut result) => {
                result.id.clone_from(&call.id);
                result
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult {
                    name: call.name.clone(),
                    id: call.id.clone(),
                    success: false,
                    output: format!("Error: {e}"),
                    data: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::testing::{scripted_model, StaticTool};
    use futures::{pin_mut, StreamExt};
    use serde_json::json;

    fn updates(events: &[RunEvent]) -> Vec<(UpdateKey, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Update(u) => Some((u.key, u.value.to_text())),
                _ => None,
            })
            .collect()
    }

    async fn collect(agent: &mut ReActAgent) -> Result<Vec<RunEvent>> {
        let stream = agent.run();
        pin_mut!(stream);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }
        Ok(events)
    }

    #[test]
    fn test_parse_tool_call() {
        let step = ReActStep::parse(
            "Thought: I should look at the docs.\nFunction Name: fetch_docs\nFunction Input: {\"url\": \"https://agentcommunicationprotocol.dev/llms.txt\"}\nFunction Output: made up",
        );

        assert_eq!(step.thought.as_deref(), Some("I should look at the docs."));
        assert_eq!(step.tool_name.as_deref(), Some("fetch_docs"));
        assert_eq!(
            step.tool_arguments().unwrap().get("url"),
            Some(&json!("https://agentcommunicationprotocol.dev/llms.txt"))
        );
        assert!(!step.raw.contains("made up"));
        assert!(step.final_answer.is_none());
    }

    #[test]
    fn test_parse_multiline_final_answer() {
        let step = ReActStep::parse("<think>hmm</think>\nThought: Known.\nFinal Answer: Line one\nLine two");
        assert_eq!(step.final_answer.as_deref(), Some("Line one\nLine two"));
        assert!(!step.raw.contains("hmm"));
    }

    #[test]
    fn test_parse_unlabelled_text_is_final_answer() {
        let step = ReActStep::parse("ACP is an open protocol.");
        assert_eq!(step.final_answer.as_deref(), Some("ACP is an open protocol."));
        assert!(step.thought.is_none());
    }

    #[test]
    fn test_parse_bad_function_input() {
        let step = ReActStep::parse("Function Name: fetch_docs\nFunction Input: not json");
        assert!(matches!(step.tool_arguments(), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_update_value_to_text() {
        assert_eq!(UpdateValue::Text("a".into()).to_text(), "a");
        assert_eq!(UpdateValue::Structured(json!("b")).to_text(), "b");
        assert_eq!(UpdateValue::Structured(json!({"url": "x"})).to_text(), r#"{"url":"x"}"#);
    }

    #[tokio::test]
    async fn test_run_with_tool_call() {
        let model = scripted_model([
            "Thought: I need the sources.\nFunction Name: list_doc_sources\nFunction Input: {}",
            "Thought: I know now.\nFinal Answer: ACP is the Agent Communication Protocol.",
        ]);
        let tools = Arc::new(ToolRegistry::from_tools([Arc::new(StaticTool::new(
            "list_doc_sources",
            "ACP Documentation",
        )) as Arc<dyn crate::tool::Tool>]));
        let mut memory = TokenMemory::new(model.clone());
        memory.add(Message::user("What is ACP?"));
        let mut agent = ReActAgent::new(model, tools, memory);

        let events = collect(&mut agent).await.unwrap();

        assert_eq!(
            updates(&events),
            vec![
                (UpdateKey::Thought, "I need the sources.".to_string()),
                (UpdateKey::ToolName, "list_doc_sources".to_string()),
                (UpdateKey::ToolInput, "{}".to_string()),
                (UpdateKey::ToolOutput, "ACP Documentation".to_string()),
                (UpdateKey::Thought, "I know now.".to_string()),
                (UpdateKey::FinalAnswer, "ACP is the Agent Communication Protocol.".to_string()),
            ]
        );
        assert!(matches!(events.first(), Some(RunEvent::Start { iteration: 1 })));
        assert!(matches!(events.last(), Some(RunEvent::Success { iterations: 2, .. })));

        let last = agent.memory().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let model = scripted_model([
            "Function Name: missing\nFunction Input: {}",
            "Final Answer: done",
        ]);
        let mut agent = ReActAgent::new(
            model.clone(),
            Arc::new(ToolRegistry::new()),
            TokenMemory::new(model),
        );

        let events = collect(&mut agent).await.unwrap();
        let outputs: Vec<_> = updates(&events)
            .into_iter()
            .filter(|(k, _)| *k == UpdateKey::ToolOutput)
            .collect();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].1.contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_invalid_function_input_is_reported_to_model() {
        let provider = Arc::new(crate::testing::ScriptedProvider::new([
            "Thought: Fetch it.\nFunction Name: fetch_docs\nFunction Input: not json",
            "Final Answer: could not fetch",
        ]));
        let model = ChatModel::new(provider.clone(), crate::provider::GenerationOptions::default());
        let tools = Arc::new(ToolRegistry::from_tools([Arc::new(StaticTool::new(
            "fetch_docs",
            "should not run",
        )) as Arc<dyn crate::tool::Tool>]));
        let mut agent = ReActAgent::new(model.clone(), tools, TokenMemory::new(model));

        let events = collect(&mut agent).await.unwrap();
        let updates = updates(&events);

        assert_eq!(updates[0], (UpdateKey::Thought, "Fetch it.".to_string()));
        assert_eq!(updates[1], (UpdateKey::ToolName, "fetch_docs".to_string()));
        assert_eq!(updates[2], (UpdateKey::ToolInput, "not json".to_string()));
        assert_eq!(updates[3].0, UpdateKey::ToolOutput);
        assert!(updates[3].1.contains("not a JSON object"));
        assert_eq!(updates[4], (UpdateKey::FinalAnswer, "could not fetch".to_string()));
        assert!(matches!(events.last(), Some(RunEvent::Success { iterations: 2, .. })));

        // The failure is fed back before the second completion
        let second_prompt = &provider.prompts()[1];
        let feedback = second_prompt.last().unwrap();
        assert_eq!(feedback.role, Role::Tool);
        assert!(feedback.content.starts_with("Function Output:"));
        assert!(!feedback.content.contains("should not run"));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let model = scripted_model(["Thought: still thinking", "Thought: still thinking"]);
        let config = AgentConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let mut agent = ReActAgent::with_config(
            model.clone(),
            Arc::new(ToolRegistry::new()),
            TokenMemory::new(model),
            config,
        );

        let err = collect(&mut agent).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn test_provider_error_ends_run() {
        let model = scripted_model(Vec::<String>::new());
        let mut agent = ReActAgent::new(
            model.clone(),
            Arc::new(ToolRegistry::new()),
            TokenMemory::new(model),
        );

        let err = collect(&mut agent).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
