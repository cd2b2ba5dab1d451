//! Tool System
//!
//! Tools are discovered at session start (from the tool server) and invoked
//! by the agent runtimes through the [`ToolRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: HashMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Arguments as a JSON object
    pub fn arguments_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

/// Tool definition schema (shown to the LLM)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Build a schema from a JSON Schema object describing the arguments.
    ///
    /// Only top-level `properties` are kept; nested schemas collapse to their
    /// `type`.
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: &serde_json::Value,
    ) -> Self {
        let required: Vec<&str> = input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(param, spec)| ParameterSchema {
                        name: param.clone(),
                        param_type: spec
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("string")
                            .to_string(),
                        description: spec
                            .get("description")
                            .or_else(|| spec.get("title"))
                            .and_then(|d| d.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        required: required.contains(&param.as_str()),
                        default: spec.get("default").cloned(),
                        enum_values: spec.get("enum").and_then(|e| e.as_array()).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools, ordered by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from discovered tools
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register_boxed(tool);
        }
        registry
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            tracing::warn!(tool = %schema.name, "Duplicate tool name, keeping the last one");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self.get(&call.name).ok_or_else(|| {
            AgentError::ToolNotFound(call.name.clone())
        })?;

        tool.validate(call)?;

        tool.execute(call).await
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Markdown description of every tool, for system prompts.
    ///
    /// Says nothing about the call syntax; each agent adds its own.
    pub fn describe_tools(&self) -> String {
        let mut prompt = String::new();

        for schema in self.schemas() {
            let _ = writeln!(prompt, "### {}", schema.name);
            let _ = writeln!(prompt, "{}", schema.description);

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    let _ = writeln!(
                        prompt,
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    );
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticTool;
    use serde_json::json;

    #[test]
    fn test_schema_from_json_schema() {
        let schema = ToolSchema::from_json_schema(
            "fetch_docs",
            "Fetch a documentation page",
            &json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page to fetch"},
                    "max_chars": {"type": "integer", "default": 4000}
                },
                "required": ["url"]
            }),
        );

        assert_eq!(schema.parameters.len(), 2);
        let url = schema.parameters.iter().find(|p| p.name == "url").unwrap();
        assert!(url.required);
        assert_eq!(url.description, "Page to fetch");
        let max = schema.parameters.iter().find(|p| p.name == "max_chars").unwrap();
        assert!(!max.required);
        assert_eq!(max.param_type, "integer");
        assert_eq!(max.default, Some(json!(4000)));
    }

    #[test]
    fn test_schema_without_properties() {
        let schema = ToolSchema::from_json_schema("list_doc_sources", "", &json!({"type": "object"}));
        assert!(schema.parameters.is_empty());
    }

    #[tokio::test]
    async fn test_tool_registry() {
        let registry = ToolRegistry::from_tools([
            Arc::new(StaticTool::new("list_doc_sources", "ACP Documentation")) as Arc<dyn Tool>,
            Arc::new(StaticTool::new("fetch_docs", "page").with_required("url")),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["fetch_docs", "list_doc_sources"]);
        assert!(registry.get("unknown").is_none());

        let missing = registry
            .execute(&ToolCall::new("fetch_docs", HashMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(missing, AgentError::ToolValidation(_)));

        let unknown = registry
            .execute(&ToolCall::new("nope", HashMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(unknown, AgentError::ToolNotFound(_)));

        let result = registry
            .execute(&ToolCall::new("list_doc_sources", HashMap::new()))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "ACP Documentation");
    }

    #[test]
    fn test_tool_call_accepts_tool_key() {
        let call: ToolCall =
            serde_json::from_str(r#"{"tool": "fetch_docs", "arguments": {"url": "x"}}"#).unwrap();
        assert_eq!(call.name, "fetch_docs");
        assert_eq!(call.arguments_json(), json!({"url": "x"}));
    }

    #[test]
    fn test_describe_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("fetch_docs", "page").with_required("url"));

        let prompt = registry.describe_tools();
        assert!(prompt.contains("### fetch_docs"));
        assert!(prompt.contains("- `url` (string) (required)"));
    }
}
