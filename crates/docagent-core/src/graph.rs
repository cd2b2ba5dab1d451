//! Graph Agent
//!
//! A prebuilt two-node state graph: the `agent` node asks the model, the
//! `tools` node runs the tool call the model asked for. The graph loops
//! between them until the model answers without a tool call.
//!
//! ```text
//!   START ──▶ agent ──(tool call?)──▶ tools
//!               ▲  └──(no)──▶ END       │
//!               └───────────────────────┘
//! ```

use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::ChatModel;
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant answering questions from the available documentation.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Graph state: the running message list
#[derive(Clone, Debug, Default)]
pub struct GraphState {
    pub messages: Vec<Message>,
}

impl GraphState {
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
        }
    }

    /// The last assistant message, i.e. the answer after `invoke`
    pub fn final_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Node {
    Agent,
    Tools,
    End,
}

/// Graph configuration
#[derive(Clone, Debug)]
pub struct GraphConfig {
    pub system_prompt: String,

    /// Maximum node visits before the run is aborted
    pub recursion_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            recursion_limit: 25,
        }
    }
}

/// Prebuilt ReAct-style graph agent
pub struct GraphAgent {
    model: ChatModel,
    tools: Arc<ToolRegistry>,
    config: GraphConfig,
}

/// Build the prebuilt tool-calling graph with default configuration
pub fn create_react_agent(model: ChatModel, tools: Arc<ToolRegistry>) -> GraphAgent {
    GraphAgent::new(model, tools, GraphConfig::default())
}

impl GraphAgent {
    pub const fn new(model: ChatModel, tools: Arc<ToolRegistry>, config: GraphConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if !self.tools.is_empty() {
            prompt.push_str("\n\n## Available Tools\n\n");
            prompt.push_str(&self.tools.describe_tools());
        }

        prompt
    }

    /// Run the graph to completion and return the final state
    pub async fn invoke(&self, input: GraphState) -> Result<GraphState> {
        let mut state = input;
        if state.messages.first().map(|m| m.role) != Some(Role::System) {
            state.messages.insert(0, Message::system(self.build_system_prompt()));
        }

        let mut node = Node::Agent;
        let mut visits = 0;
        let mut pending: Option<ToolCall> = None;

        while node != Node::End {
            visits += 1;
            if visits > self.config.recursion_limit {
                return Err(AgentError::MaxIterations(self.config.recursion_limit));
            }

            node = match node {
                Node::Agent => {
                    let completion = self.model.complete(&state.messages).await?;
                    pending = parse_tool_call(&completion.content);
                    state.messages.push(Message::assistant(completion.content));
                    if pending.is_some() { Node::Tools } else { Node::End }
                }
                Node::Tools => {
                    if let Some(call) = pending.take() {
                        tracing::debug!(tool = %call.name, "Executing tool");
                        let result = self.execute_tool(&call).await;
                        state.messages.push(Message::tool(
                            format_tool_result(&result),
                            call.name.clone(),
                            call.id.clone(),
                        ));
                    }
                    Node::Agent
                }
                Node::End => Node::End,
            };
        }

        Ok(state)
    }

    /// Execute a tool call
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(mut result) => {
                result.id.clone_from(&call.id);
                result
            }
            Err(e) => ToolResult {
                name: call.name.clone(),
                id: call.id.clone(),
                success: false,
                output: format!("Error: {e}"),
                data: None,
            },
        }
    }
}

/// Parse a tool call from LLM response
fn parse_tool_call(content: &str) -> Option<ToolCall> {
    // Look for ```tool ... ``` blocks
    let tool_start = "```tool";
    let tool_end = "```";

    if let Some(start_idx) = content.find(tool_start) {
        let after_marker = &content[start_idx + tool_start.len()..];
        if let Some(end_idx) = after_marker.find(tool_end) {
            let json_str = after_marker[..end_idx].trim();

            if let Ok(mut call) = serde_json::from_str::<ToolCall>(json_str) {
                if call.id.is_none() {
                    call.id = Some(uuid::Uuid::new_v4().to_string());
                }
                return Some(call);
            }
        }
    }

    // Fallback: try to find raw JSON with "tool" key
    parse_inline_tool_call(content)
}

/// Try to parse inline JSON tool call
fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;

    if end <= start {
        return None;
    }

    let mut call = serde_json::from_str::<ToolCall>(&content[start..=end]).ok()?;
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }
    Some(call)
}

/// Format tool result for conversation
fn format_tool_result(result: &ToolResult) -> String {
    if result.success {
        format!("[Tool '{}' returned]\n{}", result.name, result.output)
    } else {
        format!("[Tool '{}' failed]\n{}", result.name, result.output)
    }
}
