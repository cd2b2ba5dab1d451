//! ACP wire types
//!
//! Request and response bodies of the Agent Communication Protocol surface:
//! messages made of parts, runs, agent manifests and the server-sent events
//! of a streamed run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_role() -> String {
    "user".into()
}

fn default_content_type() -> String {
    "text/plain".into()
}

/// One part of a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,

    /// Per-part role; takes precedence over the message role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl MessagePart {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            name: None,
            content_type: default_content_type(),
            content: Some(content.into()),
            content_url: None,
            role: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Some("assistant".into()),
            ..Self::text(content)
        }
    }
}

/// A message exchanged with an agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn new(role: impl Into<String>, parts: Vec<MessagePart>) -> Self {
        Self {
            role: role.into(),
            parts,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", vec![MessagePart::text(content)])
    }

    /// Role of the first part if it carries one, else the message role
    pub fn effective_role(&self) -> &str {
        self.parts
            .first()
            .and_then(|p| p.role.as_deref())
            .unwrap_or(&self.role)
    }

    /// Text of all parts, concatenated in order
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.content.as_deref())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sync,
    Stream,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunCreateRequest {
    pub agent_name: String,

    #[serde(default)]
    pub input: Vec<Message>,

    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

/// Error body, also embedded in failed runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    pub status: RunStatus,

    #[serde(default)]
    pub output: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(agent_name: impl Into<String>, session_id: Option<Uuid>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            session_id,
            status: RunStatus::Created,
            output: Vec::new(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Finish with the collected assistant parts as one output message
    pub fn complete(&mut self, parts: Vec<MessagePart>) {
        self.status = RunStatus::Completed;
        self.output = vec![Message::new("assistant", parts)];
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: ErrorResponse) {
        self.status = RunStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentManifest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentManifest>,
}

/// Payload of `run.created`, `run.completed` and `run.failed` events
#[derive(Debug, Serialize)]
pub struct RunEventPayload<'a> {
    pub run: &'a Run,
}

/// Payload of `generic` events: one `{key: value}` update
#[derive(Debug, Serialize)]
pub struct GenericEventPayload {
    pub generic: BTreeMap<String, String>,
}

/// Payload of `message.part` events
#[derive(Debug, Serialize)]
pub struct MessagePartPayload<'a> {
    pub part: &'a MessagePart,
}
