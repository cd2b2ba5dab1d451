//! Agent endpoints
//!
//! Each agent turns a list of ACP messages into a lazy stream of output
//! fragments: tagged intermediate updates and the final assistant message.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{future, pin_mut, Stream, StreamExt, TryStreamExt};
use uuid::Uuid;

use docagent_core::{
    create_react_agent, AgentError, GraphState, Message, ReActAgent, Result, RunEvent,
    SessionManager, TokenMemory, UpdateKey,
};

use crate::acp::{self, MessagePart};
use crate::adapter::framework_messages;

/// One item produced by an agent run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFragment {
    /// Intermediate state, tagged with the step field it came from
    Update { key: UpdateKey, value: String },
    /// Final assistant output
    Message(MessagePart),
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<OutputFragment>> + Send>>;

/// Per-request context
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub session_id: Option<Uuid>,
}

type AgentFn = fn(Arc<SessionManager>, Vec<acp::Message>, RunContext) -> FragmentStream;

/// A servable agent
pub struct AgentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub run: AgentFn,
}

impl AgentSpec {
    pub fn manifest(&self) -> acp::AgentManifest {
        acp::AgentManifest {
            name: self.name.into(),
            description: self.description.into(),
        }
    }
}

pub const AGENTS: &[AgentSpec] = &[
    AgentSpec {
        name: "chat_agent",
        description: "Conversational ReAct agent with memory that answers questions from the \
                      documentation tools, streaming its thoughts and tool calls as it goes.",
        run: chat_agent,
    },
    AgentSpec {
        name: "acp_doc_agent",
        description: "Tool-calling graph agent that answers a single question from the \
                      documentation tools.",
        run: doc_agent,
    },
];

pub fn find_agent(name: &str) -> Option<&'static AgentSpec> {
    AGENTS.iter().find(|agent| agent.name == name)
}

/// Map a run event onto an output fragment; anything else is dropped
pub fn route_event(event: RunEvent) -> Option<OutputFragment> {
    let RunEvent::Update(update) = event else {
        return None;
    };

    match update.key {
        UpdateKey::Thought | UpdateKey::ToolName | UpdateKey::ToolInput | UpdateKey::ToolOutput => {
            Some(OutputFragment::Update {
                key: update.key,
                value: update.value.to_text(),
            })
        }
        UpdateKey::FinalAnswer => Some(OutputFragment::Message(MessagePart::assistant(
            update.value.to_text(),
        ))),
    }
}

/// Relay a run event stream as fragments; the first error ends it
pub fn relay_events<S>(events: S) -> impl Stream<Item = Result<OutputFragment>>
where
    S: Stream<Item = Result<RunEvent>>,
{
    events.try_filter_map(|event| future::ready(Ok(route_event(event))))
}

/// Streaming ReAct agent over the shared session
pub fn chat_agent(
    session: Arc<SessionManager>,
    input: Vec<acp::Message>,
    context: RunContext,
) -> FragmentStream {
    Box::pin(chat_agent_stream(session, input, context))
}

fn chat_agent_stream(
    session: Arc<SessionManager>,
    input: Vec<acp::Message>,
    context: RunContext,
) -> impl Stream<Item = Result<OutputFragment>> + Send + 'static {
    try_stream! {
        if !session.is_initialized() {
            tracing::info!("Session not initialized, initializing now");
        }
        let ready = session.initialize().await?;

        let model = ready.model().clone();
        let mut memory = TokenMemory::new(model.clone());
        memory.add_many(framework_messages(&input)?);

        tracing::debug!(run_id = %context.run_id, session_id = ?context.session_id, messages = memory.len(), "Starting chat run");
        let mut agent = ReActAgent::new(model, ready.tools(), memory);

        let fragments = relay_events(agent.run());
        pin_mut!(fragments);
        while let Some(fragment) = fragments.next().await {
            yield fragment?;
        }
    }
}

/// Single-shot graph agent over the shared session
pub fn doc_agent(
    session: Arc<SessionManager>,
    input: Vec<acp::Message>,
    context: RunContext,
) -> FragmentStream {
    Box::pin(doc_agent_stream(session, input, context))
}

fn doc_agent_stream(
    session: Arc<SessionManager>,
    input: Vec<acp::Message>,
    context: RunContext,
) -> impl Stream<Item = Result<OutputFragment>> + Send + 'static {
    try_stream! {
        if !session.is_initialized() {
            tracing::info!("Session not initialized, initializing now");
        }
        let ready = session.initialize().await?;

        let question = input
            .first()
            .and_then(|m| m.parts.first())
            .and_then(|p| p.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::InvalidInput("expected a question in the first message part".into()))?;

        tracing::debug!(run_id = %context.run_id, session_id = ?context.session_id, question = %question, "Starting doc run");
        let agent = create_react_agent(ready.model().clone(), ready.tools());
        let state = agent.invoke(GraphState::from_messages([Message::user(question)])).await?;

        let answer = state
            .final_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        yield OutputFragment::Message(MessagePart::assistant(answer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docagent_core::testing::{scripted_model, CountingConnector, StaticModelFactory};
    use docagent_core::{ToolConnector, UpdateEvent};
    use futures::stream;

    fn context() -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            session_id: None,
        }
    }

    fn session(connector: &Arc<CountingConnector>, responses: &[&str]) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::clone(connector) as Arc<dyn ToolConnector>,
            Arc::new(StaticModelFactory::new(scripted_model(responses.iter().copied()))),
        ))
    }

    async fn collect(stream: FragmentStream) -> Result<Vec<OutputFragment>> {
        stream.try_collect().await
    }

    #[tokio::test]
    async fn test_thought_then_final_answer() {
        let events = stream::iter(vec![
            Ok(RunEvent::Start { iteration: 1 }),
            Ok(RunEvent::Update(UpdateEvent::text(UpdateKey::Thought, "I know this."))),
            Ok(RunEvent::Update(UpdateEvent::text(UpdateKey::FinalAnswer, "ACP is a protocol."))),
            Ok(RunEvent::Success {
                answer: "ACP is a protocol.".into(),
                iterations: 1,
            }),
        ]);

        let fragments: Vec<OutputFragment> = relay_events(events).try_collect().await.unwrap();

        assert_eq!(
            fragments,
            vec![
                OutputFragment::Update {
                    key: UpdateKey::Thought,
                    value: "I know this.".into(),
                },
                OutputFragment::Message(MessagePart::assistant("ACP is a protocol.")),
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_stops_at_first_error() {
        let events = stream::iter(vec![
            Ok(RunEvent::Update(UpdateEvent::text(UpdateKey::Thought, "hmm"))),
            Err(AgentError::Provider("down".into())),
            Ok(RunEvent::Update(UpdateEvent::text(UpdateKey::FinalAnswer, "late"))),
        ]);

        let result: Result<Vec<OutputFragment>> = relay_events(events).try_collect().await;
        assert!(matches!(result, Err(AgentError::Provider(_))));
    }

    #[tokio::test]
    async fn test_chat_agent_end_to_end() {
        let connector = Arc::new(CountingConnector::with_tools(["list_doc_sources", "fetch_docs"]));
        let session = session(
            &connector,
            &[
                "Thought: I should check the documentation sources.\nFunction Name: list_doc_sources\nFunction Input: {}",
                "Thought: I have what I need.\nFinal Answer: ACP is the Agent Communication Protocol.",
            ],
        );

        let fragments = collect(chat_agent(
            Arc::clone(&session),
            vec![acp::Message::user("What is ACP?")],
            context(),
        ))
        .await
        .unwrap();

        let ready = session.ready().await.unwrap();
        assert!(ready.tool_count() > 0);
        assert_eq!(connector.connects(), 1);

        let messages: Vec<&MessagePart> = fragments
            .iter()
            .filter_map(|f| match f {
                OutputFragment::Message(part) => Some(part),
                OutputFragment::Update { .. } => None,
            })
            .collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role.as_deref(), Some("assistant"));
        assert!(!messages[0].content.as_deref().unwrap_or_default().is_empty());

        assert!(fragments.contains(&OutputFragment::Update {
            key: UpdateKey::ToolOutput,
            value: "list_doc_sources result".into(),
        }));
    }

    #[tokio::test]
    async fn test_chat_agent_rejects_unsupported_role() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = session(&connector, &["Final Answer: unused"]);

        let input = vec![acp::Message::new("system", vec![MessagePart::text("be terse")])];
        let err = collect(chat_agent(session, input, context())).await.unwrap_err();

        assert!(matches!(err, AgentError::UnsupportedRole(role) if role == "system"));
    }

    #[tokio::test]
    async fn test_chat_agent_surfaces_initialization_failure() {
        let connector = Arc::new(CountingConnector::refusing());
        let session = session(&connector, &[]);

        let err = collect(chat_agent(session, vec![acp::Message::user("hi")], context()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_doc_agent_answers_once() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = session(
            &connector,
            &[
                "```tool\n{\"tool\": \"fetch_docs\", \"arguments\": {}}\n```",
                "ACP lets agents talk to each other over REST.",
            ],
        );

        let fragments = collect(doc_agent(
            session,
            vec![acp::Message::user("What is ACP?")],
            context(),
        ))
        .await
        .unwrap();

        assert_eq!(
            fragments,
            vec![OutputFragment::Message(MessagePart::assistant(
                "ACP lets agents talk to each other over REST."
            ))]
        );
    }

    #[tokio::test]
    async fn test_doc_agent_requires_input() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = session(&connector, &[]);

        let err = collect(doc_agent(session, Vec::new(), context())).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[test]
    fn test_catalog() {
        assert!(find_agent("chat_agent").is_some());
        assert_eq!(find_agent("acp_doc_agent").unwrap().manifest().name, "acp_doc_agent");
        assert!(find_agent("weather_agent").is_none());
    }
}
