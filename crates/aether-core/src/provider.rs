use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::config::RunConfig;
use crate::ids::{RoomId, RunId, UserId};

/// Everything a provider needs to produce one agent's turn in one round.
#[derive(Clone, Debug)]
pub struct AgentRequest {
    pub run_id: RunId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub round: u32,
    pub agent_id: AgentId,
    /// The question that started the run.
    pub user_message: String,
    /// Role-tagged lines: recent room messages plus this round's outputs.
    pub room_history: Vec<String>,
    /// Synthesis outputs of earlier rounds, oldest first.
    pub prior_summaries: Vec<String>,
    pub config: RunConfig,
}

/// Final result of one provider call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentReply {
    pub agent_id: AgentId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Items yielded by a provider stream. Ordering contract:
///
/// Chunk* → Done, with exactly one Done, and the concatenation of all
/// chunk texts equal to the done reply's content. Providers that cannot
/// stream natively synthesize chunks by splitting the complete text.
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    Chunk { text: String },
    Done { reply: AgentReply },
}

impl ProviderEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = ProviderEvent> + Send>>;

/// Trait implemented by each generation backend (ollama, relay, mock).
///
/// `generate` is infallible by contract: backend errors and timeouts are
/// rendered into a diagnostic reply (still chunked) rather than returned,
/// so a failing backend degrades one agent's content instead of killing
/// the run.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: AgentRequest) -> ProviderStream;
}
