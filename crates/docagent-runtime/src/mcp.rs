//! MCP Tool Connector
//!
//! Connects to a documentation tool server spoken to over stdio MCP. The
//! server runs as a child process; its tools are discovered with
//! `tools/list` and invoked with `tools/call`.

use std::sync::Arc;

use async_trait::async_trait;
use docagent_core::{
    error::{AgentError, Result},
    session::{ToolConnector, ToolSession},
    tool::{Tool, ToolCall, ToolResult, ToolSchema},
};
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject},
    service::{DynService, Peer, RoleClient, RunningService, ServiceExt},
    transport::TokioChildProcess,
};
use tokio::process::Command;
use tokio::sync::Mutex;

type ClientService = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

/// How to start the tool server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolServerConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: "python".into(),
            args: vec!["mcpdoctool.py".into()],
        }
    }
}

impl ToolServerConfig {
    /// Read `MCP_SERVER_COMMAND` and whitespace-separated `MCP_SERVER_ARGS`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let command = lookup("MCP_SERVER_COMMAND")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults.command);
        let args = lookup("MCP_SERVER_ARGS")
            .map(|a| a.split_whitespace().map(String::from).collect())
            .unwrap_or(defaults.args);

        Self { command, args }
    }
}

/// [`ToolConnector`] spawning the tool server as a child process
#[derive(Clone, Debug, Default)]
pub struct McpConnector {
    config: ToolServerConfig,
}

impl McpConnector {
    pub const fn new(config: ToolServerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        let mut command = Command::new(&self.config.command);
        command.args(&self.config.args);

        let transport = TokioChildProcess::new(command).map_err(|e| {
            AgentError::Connection(format!("failed to spawn '{}': {e}", self.config.command))
        })?;

        let service = ClientInfo::default()
            .into_dyn()
            .serve(transport)
            .await
            .map_err(|e| AgentError::Connection(format!("MCP handshake failed: {e}")))?;

        tracing::info!(
            command = %self.config.command,
            args = ?self.config.args,
            "Connected to MCP tool server"
        );

        let peer = service.peer().clone();
        Ok(Box::new(McpSession {
            service: Mutex::new(Some(service)),
            peer,
        }))
    }
}

/// A live MCP client session
pub struct McpSession {
    service: Mutex<Option<ClientService>>,
    peer: Peer<RoleClient>,
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| AgentError::Connection(format!("tools/list failed: {e}")))?;

        tracing::debug!(count = tools.len(), "Discovered MCP tools");

        Ok(tools
            .into_iter()
            .map(|tool| Arc::new(McpTool::new(self.peer.clone(), &tool)) as Arc<dyn Tool>)
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };

        let reason = service
            .cancel()
            .await
            .map_err(|e| AgentError::Connection(format!("failed to stop MCP session: {e}")))?;
        tracing::debug!(?reason, "MCP session closed");
        Ok(())
    }
}

/// A tool exposed by the MCP server
pub struct McpTool {
    peer: Peer<RoleClient>,
    schema: ToolSchema,
}

impl McpTool {
    fn new(peer: Peer<RoleClient>, tool: &rmcp::model::Tool) -> Self {
        Self {
            peer,
            schema: schema_from_mcp(tool),
        }
    }
}

fn schema_from_mcp(tool: &rmcp::model::Tool) -> ToolSchema {
    let input_schema = serde_json::Value::Object((*tool.input_schema).clone());
    ToolSchema::from_json_schema(
        tool.name.to_string(),
        tool.description.as_deref().unwrap_or_default(),
        &input_schema,
    )
}

/// Join the text items of a tool result
fn text_content(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|item| item.as_text().map(|t| t.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn to_tool_result(name: &str, result: CallToolResult) -> ToolResult {
    let text = text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = if text.is_empty() {
            "MCP tool returned an error result".to_string()
        } else {
            text
        };
        return ToolResult::failure(name, message);
    }

    match result.structured_content {
        Some(data) if text.is_empty() => ToolResult::success(name, data.to_string()).with_data(data),
        Some(data) => ToolResult::success(name, text).with_data(data),
        None => ToolResult::success(name, text),
    }
}

#[async_trait]
impl Tool for McpTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let arguments: JsonObject = call.arguments.clone().into_iter().collect();

        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: self.schema.name.clone().into(),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{}: {e}", self.schema.name)))?;

        Ok(to_tool_result(&self.schema.name, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = ToolServerConfig::from_lookup(|_| None);
        assert_eq!(config, ToolServerConfig::default());
        assert_eq!(config.command, "python");
        assert_eq!(config.args, vec!["mcpdoctool.py"]);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ToolServerConfig::from_lookup(|key| match key {
            "MCP_SERVER_COMMAND" => Some("uvx".into()),
            "MCP_SERVER_ARGS" => Some("  mcpdoc --urls  ACP:https://agentcommunicationprotocol.dev/llms.txt ".into()),
            _ => None,
        });

        assert_eq!(config.command, "uvx");
        assert_eq!(
            config.args,
            vec!["mcpdoc", "--urls", "ACP:https://agentcommunicationprotocol.dev/llms.txt"]
        );
    }

    #[test]
    fn test_schema_from_mcp_tool() {
        let input_schema = json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "title": "Url"}
            },
            "required": ["url"]
        });
        let serde_json::Value::Object(input_schema) = input_schema else {
            unreachable!()
        };
        let tool = rmcp::model::Tool::new("fetch_docs", "Fetch a documentation page", input_schema);

        let schema = schema_from_mcp(&tool);
        assert_eq!(schema.name, "fetch_docs");
        assert_eq!(schema.description, "Fetch a documentation page");
        assert_eq!(schema.parameters.len(), 1);
        assert_eq!(schema.parameters[0].name, "url");
        assert!(schema.parameters[0].required);
    }

    #[test]
    fn test_text_content_is_joined() {
        let result = CallToolResult::success(vec![Content::text("ACP"), Content::text("Documentation")]);
        let tool_result = to_tool_result("list_doc_sources", result);

        assert!(tool_result.success);
        assert_eq!(tool_result.output, "ACP\nDocumentation");
    }

    #[test]
    fn test_error_result_is_failure() {
        let result = CallToolResult::error(vec![Content::text("domain not allowed")]);
        let tool_result = to_tool_result("fetch_docs", result);

        assert!(!tool_result.success);
        assert_eq!(tool_result.output, "domain not allowed");
    }
}
