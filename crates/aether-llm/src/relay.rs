use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use aether_core::{
    AgentId, AgentProvider, AgentReply, AgentRequest, ProviderEvent, ProviderFailure,
    ProviderStream,
};

use crate::chunking::{self, ChunkDelay};
use crate::prompts;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Total budget for the webhook round trip. Shorter than the streaming
/// backend's budget since the relay answers in one piece.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK_PACING: ChunkDelay = ChunkDelay::Fixed(Duration::from_millis(8));

/// Webhook backend: posts one flat prompt, receives one complete
/// response, and re-chunks it locally so the stream contract holds.
///
/// The webhook's reply shape varies by workflow, so extraction tries a
/// list of known envelope keys before falling back to the raw body.
pub struct RelayProvider {
    client: Client,
    webhook_url: String,
}

impl RelayProvider {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            webhook_url: webhook_url.to_string(),
        }
    }

    async fn fetch(&self, prompt: &str, session_id: &str) -> Result<String, ProviderFailure> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&RelayRequest {
                chat_input: prompt,
                session_id,
            })
            .send()
            .await
            .map_err(|err| ProviderFailure::backend(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ProviderFailure::backend(err.to_string()))?;

        if !status.is_success() {
            return Err(ProviderFailure::backend(error_message(
                status.as_u16(),
                &body,
            )));
        }
        Ok(body)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    chat_input: &'a str,
    session_id: &'a str,
}

#[async_trait]
impl AgentProvider for RelayProvider {
    fn name(&self) -> &str {
        "relay"
    }

    #[instrument(skip(self, request), fields(agent = %request.agent_id, round = request.round))]
    async fn generate(&self, request: AgentRequest) -> ProviderStream {
        let agent_id = request.agent_id;
        let prompt = prompts::flat_prompt(&request);
        let session_id = session_id(&request);

        let body = match tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.fetch(&prompt, &session_id),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(failure)) => return failed_stream(agent_id, failure),
            Err(_) => {
                return failed_stream(
                    agent_id,
                    ProviderFailure::Timeout {
                        budget_secs: REQUEST_TIMEOUT.as_secs(),
                    },
                )
            }
        };

        let reply = AgentReply {
            agent_id,
            content: extract_content(&body),
            sources: None,
        };
        chunking::stream_words(reply, CHUNK_PACING)
    }
}

/// One session per agent turn, so the workflow keys its memory per
/// run, agent, and round.
fn session_id(request: &AgentRequest) -> String {
    format!(
        "{}-{}-r{}",
        request.run_id, request.agent_id, request.round
    )
}

fn diagnostic_text(failure: &ProviderFailure) -> String {
    match failure {
        ProviderFailure::Timeout { budget_secs } => {
            format!("Request timed out after {budget_secs} seconds.")
        }
        ProviderFailure::Backend(msg) => format!("Error: {msg}"),
    }
}

fn failed_stream(agent_id: AgentId, failure: ProviderFailure) -> ProviderStream {
    warn!(agent = %agent_id, error = %failure, "relay request failed");
    let diagnostic = diagnostic_text(&failure);
    let reply = AgentReply {
        agent_id,
        content: diagnostic.clone(),
        sources: None,
    };
    Box::pin(stream::iter(vec![
        ProviderEvent::Chunk { text: diagnostic },
        ProviderEvent::Done { reply },
    ]))
}

/// Error detail from a non-success body, preferring the workflow's own
/// message fields over a generic status line.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        for key in ["content", "message"] {
            if let Some(text) = field_text(&parsed, key) {
                return text;
            }
        }
    }
    format!("Service returned status {status}")
}

/// Pull the reply text out of whichever envelope the workflow used.
fn extract_content(body: &str) -> String {
    if body.trim().is_empty() {
        return String::new();
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.trim().to_string(),
    };

    if let Value::String(text) = &parsed {
        return text.clone();
    }

    for key in ["output", "text", "response", "message", "content", "result", "answer"] {
        if let Some(text) = field_text(&parsed, key) {
            return text;
        }
    }

    if let Value::Array(items) = &parsed {
        if let Some(first) = items.first() {
            for key in ["output", "text", "response", "message", "content"] {
                if let Some(text) = field_text(first, key) {
                    return text;
                }
            }
            return first.to_string();
        }
    }

    parsed.to_string()
}

fn field_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
