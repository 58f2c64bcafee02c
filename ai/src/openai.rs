//! Typed client for the hosted Assistants wire protocol: threads carry
//! the conversation, runs advance it, and a run that wants tool output
//! parks in `requires_action` until the outputs are submitted.

use std::fmt;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AiError, ToolInvocation, ToolOutput, ToolSpec};

const BETA_HEADER: &str = "assistants=v2";

pub struct AssistantsClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for AssistantsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AssistantsClient {
    #[must_use]
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
        tools: &[ToolSpec],
    ) -> Result<String, AiError> {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();

        let body = self
            .post(
                "/v1/assistants",
                &json!({
                    "name": name,
                    "instructions": instructions,
                    "model": model,
                    "tools": tools,
                }),
            )
            .await?;
        id_of(&body)
    }

    pub async fn create_thread(&self) -> Result<String, AiError> {
        let body = self.post("/v1/threads", &json!({})).await?;
        id_of(&body)
    }

    pub async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AiError> {
        self.post(
            &format!("/v1/threads/{thread_id}/messages"),
            &json!({ "role": "user", "content": content }),
        )
        .await?;
        Ok(())
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<String, AiError> {
        let body = self
            .post(
                &format!("/v1/threads/{thread_id}/runs"),
                &json!({ "assistant_id": assistant_id }),
            )
            .await?;
        id_of(&body)
    }

    /// Current status of a run, along with any tool calls the model is
    /// waiting on.
    pub async fn run_snapshot(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot, AiError> {
        let body = self
            .get(&format!("/v1/threads/{thread_id}/runs/{run_id}"))
            .await?;
        let run: RunObject =
            serde_json::from_value(body).map_err(|e| AiError::Protocol(e.to_string()))?;

        let tool_calls = run
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolInvocation {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(RunSnapshot {
            status: run.status,
            tool_calls,
        })
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<(), AiError> {
        self.post(
            &format!("/v1/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &json!({ "tool_outputs": outputs }),
        )
        .await?;
        Ok(())
    }

    /// Text of the most recent message on the thread, if any.
    pub async fn latest_message(&self, thread_id: &str) -> Result<Option<String>, AiError> {
        let body = self
            .get(&format!("/v1/threads/{thread_id}/messages?order=desc&limit=1"))
            .await?;

        let Some(blocks) = body["data"][0]["content"].as_array() else {
            return Ok(None);
        };
        for block in blocks {
            if let Some(text) = block["text"]["value"].as_str() {
                return Ok(Some(text.to_string()));
            }
        }
        Ok(None)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AiError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("openai-beta", BETA_HEADER)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, AiError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("openai-beta", BETA_HEADER)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, AiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        return Err(AiError::Protocol(format!("{status}: {message}")));
    }

    serde_json::from_str(&body).map_err(|e| AiError::Protocol(e.to_string()))
}

fn id_of(body: &Value) -> Result<String, AiError> {
    body["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AiError::Protocol("response missing object id".to_string()))
}

/// One request-response exchange with the model. Statuses outside this
/// vocabulary deserialize to `Unknown` and keep the poll loop alive
/// rather than tearing the run down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
    Expired,
    Incomplete,
    Unknown,
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "expired" => RunStatus::Expired,
            "incomplete" => RunStatus::Incomplete,
            _ => RunStatus::Unknown,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Run status plus the pending tool calls of a `requires_action` round.
#[derive(Debug)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub tool_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    status: RunStatus,
    #[serde(default)]
    required_action: Option<RequiredAction>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}
