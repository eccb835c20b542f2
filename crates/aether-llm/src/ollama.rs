use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Future, Stream};
use reqwest::Client;
use serde::Serialize;
use tracing::{instrument, warn};

use aether_core::{
    AgentId, AgentProvider, AgentReply, AgentRequest, ProviderEvent, ProviderFailure,
    ProviderStream,
};

use crate::ndjson::{self, LineBuffer};
use crate::prompts;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Total budget for one generation call, covering both the request and
/// the entire body read. Not an idle timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_MODEL: &str = "llama3.2";

/// Streaming backend speaking the local model server's NDJSON chat
/// protocol. Fragments are forwarded as they arrive on the wire.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: Option<&str>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[async_trait]
impl AgentProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(agent = %request.agent_id, round = request.round, model = %self.model))]
    async fn generate(&self, request: AgentRequest) -> ProviderStream {
        let agent_id = request.agent_id;
        let deadline = tokio::time::Instant::now() + REQUEST_TIMEOUT;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompts::system_prompt(agent_id).to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompts::chat_user_prompt(&request),
                },
            ],
            stream: true,
        };

        let send = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send();

        let response = match tokio::time::timeout_at(deadline, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                return failed_stream(agent_id, ProviderFailure::backend(err.to_string()))
            }
            Err(_) => return failed_stream(agent_id, timeout_failure()),
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = match tokio::time::timeout_at(deadline, response.text()).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            };
            return failed_stream(
                agent_id,
                ProviderFailure::backend(format!("Ollama returned {status}: {detail}")),
            );
        }

        Box::pin(OllamaStream::new(agent_id, response.bytes_stream(), deadline))
    }
}

fn timeout_failure() -> ProviderFailure {
    ProviderFailure::Timeout {
        budget_secs: REQUEST_TIMEOUT.as_secs(),
    }
}

fn diagnostic_text(failure: &ProviderFailure) -> String {
    match failure {
        ProviderFailure::Timeout { budget_secs } => {
            format!("Request timed out after {budget_secs} seconds.")
        }
        ProviderFailure::Backend(msg) => format!("Error connecting to Ollama: {msg}"),
    }
}

fn failed_stream(agent_id: AgentId, failure: ProviderFailure) -> ProviderStream {
    warn!(agent = %agent_id, error = %failure, "ollama request failed");
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

/// Decodes the NDJSON body into chunk events against one absolute
/// deadline. A deadline hit or a transport error mid-body discards the
/// partial text and ends the stream with the diagnostic instead, so the
/// reply content always matches what the terminal event carries.
struct OllamaStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    agent_id: AgentId,
    lines: LineBuffer,
    pending: VecDeque<ProviderEvent>,
    accumulated: String,
    deadline: Pin<Box<tokio::time::Sleep>>,
    ended: bool,
}

impl OllamaStream {
    fn new(
        agent_id: AgentId,
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        deadline: tokio::time::Instant,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            agent_id,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            accumulated: String::new(),
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            ended: false,
        }
    }

    fn push_line(&mut self, line: &str) {
        if let Some(text) = ndjson::content_of_line(line) {
            self.accumulated.push_str(&text);
            self.pending.push_back(ProviderEvent::Chunk { text });
        }
    }

    fn finish_with_failure(&mut self, failure: ProviderFailure) {
        warn!(agent = %self.agent_id, error = %failure, "ollama stream failed");
        let diagnostic = diagnostic_text(&failure);
        self.accumulated.clear();
        self.pending.push_back(ProviderEvent::Chunk {
            text: diagnostic.clone(),
        });
        self.pending.push_back(ProviderEvent::Done {
            reply: AgentReply {
                agent_id: self.agent_id,
                content: diagnostic,
                sources: None,
            },
        });
        self.ended = true;
    }

    fn finish_clean(&mut self) {
        if let Some(line) = self.lines.finish() {
            self.push_line(&line);
        }
        self.pending.push_back(ProviderEvent::Done {
            reply: AgentReply {
                agent_id: self.agent_id,
                content: std::mem::take(&mut self.accumulated),
                sources: None,
            },
        });
        self.ended = true;
    }
}

impl Stream for OllamaStream {
    type Item = ProviderEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return std::task::Poll::Ready(Some(event));
            }
            if self.ended {
                return std::task::Poll::Ready(None);
            }

            // Total budget, so the deadline is checked ahead of the body
            // even when data is still flowing.
            if self.deadline.as_mut().poll(cx).is_ready() {
                let failure = timeout_failure();
                self.finish_with_failure(failure);
                continue;
            }

            match self.inner.as_mut().poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(bytes))) => {
                    let lines = self.lines.push(&bytes);
                    for line in lines {
                        self.push_line(&line);
                    }
                }
                std::task::Poll::Ready(Some(Err(err))) => {
                    self.finish_with_failure(ProviderFailure::backend(err.to_string()));
                }
                std::task::Poll::Ready(None) => {
                    self.finish_clean();
                }
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}
