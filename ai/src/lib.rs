//! Conversation orchestration against a hosted reasoning model.
//!
//! Core loop: question → run → poll run status → execute the tool calls
//! the model asks for → submit outputs as one batch → repeat until the
//! run reaches a terminal state, then hand back the final message text.

pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

// Re-export types that consumers will need to declare tools
pub use serde_json::{Value, json};

use crate::openai::{AssistantsClient, RunStatus};

/// Declaration of one callable tool, advertised to the model when the
/// assistant is registered. `parameters` is a JSON-Schema object.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Helper function to create a tool spec with the given name,
/// description, and parameter schema.
///
/// # Example
/// ```rust
/// use ai::{create_tool, json};
///
/// let tool = create_tool(
///     "run_query",
///     "Execute a SQL query against the database",
///     json!({
///         "type": "object",
///         "properties": {
///             "sql": {
///                 "type": "string",
///                 "description": "The SQL query to execute",
///             },
///         },
///         "required": ["sql"],
///     }),
/// );
/// assert_eq!(tool.name, "run_query");
/// ```
pub fn create_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: Value,
) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

/// A tool call issued by the model within a run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON text, exactly as the model produced it.
    pub arguments: String,
}

/// Serialized outcome of one invocation, paired with its call id.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// Boundary between the orchestrator and tool execution. There is no
/// error channel on purpose: implementations convert every failure into
/// a result value the model can read.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolOutput;
}

/// Identity of one ongoing conversation. The backing thread is created
/// lazily on the first question and reused afterwards, so follow-up
/// questions share context. Owned by the caller; the assistant itself
/// holds no conversation state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    thread_id: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume an existing conversation by thread id.
    #[must_use]
    pub fn with_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("request to model provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response from model provider: {0}")]
    Protocol(String),
}

/// A registered assistant plus the tool executor that answers its tool
/// calls. `ask` is the single entry point; it never fails outward.
pub struct Assistant {
    client: AssistantsClient,
    assistant_id: String,
    executor: Arc<dyn ToolExecutor>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("assistant_id", &self.assistant_id)
            .finish_non_exhaustive()
    }
}

impl Assistant {
    /// Register the assistant with the model provider, advertising
    /// `tools` as its callable surface.
    pub async fn new(
        client: AssistantsClient,
        conf: &config::AiConfig,
        instructions: &str,
        tools: Vec<ToolSpec>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<Self, AiError> {
        let assistant_id = client
            .create_assistant("Database Query Assistant", instructions, &conf.model, &tools)
            .await?;
        info!(assistant_id = %assistant_id, model = %conf.model, "assistant registered");

        Ok(Self {
            client,
            assistant_id,
            executor,
            poll_interval: Duration::from_millis(conf.poll_interval_ms),
        })
    }

    /// Ask a question within `session` and return the assistant's
    /// answer. All failure modes resolve to a string the caller can
    /// render as a normal assistant turn.
    pub async fn ask(&self, session: &mut Session, question: &str) -> String {
        match self.run_turn(session, question).await {
            Ok(answer) => answer,
            Err(e) => format!("Error: {e}"),
        }
    }

    async fn run_turn(&self, session: &mut Session, question: &str) -> Result<String, AiError> {
        let thread_id = match session.thread_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.client.create_thread().await?;
                debug!(thread_id = %id, "created conversation thread");
                session.thread_id = Some(id.clone());
                id
            }
        };

        self.client.add_user_message(&thread_id, question).await?;
        let run_id = self.client.create_run(&thread_id, &self.assistant_id).await?;
        debug!(run_id = %run_id, thread_id = %thread_id, "run started");

        loop {
            let run = self.client.run_snapshot(&thread_id, &run_id).await?;

            match run.status {
                RunStatus::Completed => break,
                RunStatus::RequiresAction => {
                    info!(count = run.tool_calls.len(), "model requested tool calls");

                    // All calls of the round resolve before submission;
                    // the protocol does not accept partial batches.
                    let mut outputs = Vec::with_capacity(run.tool_calls.len());
                    for invocation in &run.tool_calls {
                        outputs.push(self.executor.execute(invocation).await);
                    }
                    self.client
                        .submit_tool_outputs(&thread_id, &run_id, &outputs)
                        .await?;
                }
                RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => {
                    warn!(status = %run.status, "run ended without an answer");
                    return Ok(format!("Run failed with status: {}", run.status));
                }
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        match self.client.latest_message(&thread_id).await? {
            Some(text) => Ok(text),
            None => Ok("No response received from assistant.".to_string()),
        }
    }
}
