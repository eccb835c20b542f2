use serde::{Deserialize, Serialize};

use crate::agents::AgentId;

/// Lifecycle and content events published on a run's channel.
///
/// Events are ephemeral: broadcast to whoever is subscribed at emission
/// time, never persisted, never replayed. Within one run they arrive in
/// the exact order the round loop produced them, ending with `RunDone`
/// or `RunError` exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "run_started")]
    RunStarted,

    #[serde(rename = "agent_started")]
    AgentStarted { agent_id: AgentId, round: u32 },

    #[serde(rename = "agent_output_chunk")]
    AgentOutputChunk {
        agent_id: AgentId,
        round: u32,
        text: String,
    },

    #[serde(rename = "agent_done")]
    AgentDone {
        agent_id: AgentId,
        round: u32,
        content: String,
    },

    #[serde(rename = "round_summary")]
    RoundSummary {
        round: u32,
        best_answer: String,
        what_changed: String,
    },

    #[serde(rename = "best_answer_updated")]
    BestAnswerUpdated { best_answer: String },

    #[serde(rename = "run_done")]
    RunDone,

    #[serde(rename = "run_error")]
    RunError { error: String },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::AgentStarted { .. } => "agent_started",
            Self::AgentOutputChunk { .. } => "agent_output_chunk",
            Self::AgentDone { .. } => "agent_done",
            Self::RoundSummary { .. } => "round_summary",
            Self::BestAnswerUpdated { .. } => "best_answer_updated",
            Self::RunDone => "run_done",
            Self::RunError { .. } => "run_error",
        }
    }

    /// Terminal events end the stream; the channel survives only a short
    /// grace window afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunDone | Self::RunError { .. })
    }

    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Self::AgentStarted { agent_id, .. }
            | Self::AgentOutputChunk { agent_id, .. }
            | Self::AgentDone { agent_id, .. } => Some(*agent_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let events = vec![
            RunEvent::RunStarted,
            RunEvent::AgentStarted {
                agent_id: AgentId::Coordinator,
                round: 1,
            },
            RunEvent::AgentOutputChunk {
                agent_id: AgentId::Researcher,
                round: 2,
                text: "hello".into(),
            },
            RunEvent::AgentDone {
                agent_id: AgentId::Researcher,
                round: 2,
                content: "hello world".into(),
            },
            RunEvent::RoundSummary {
                round: 1,
                best_answer: "42".into(),
                what_changed: "Round 1 complete with input from 3 agents.".into(),
            },
            RunEvent::BestAnswerUpdated {
                best_answer: "42".into(),
            },
            RunEvent::RunDone,
            RunEvent::RunError {
                error: "store unavailable".into(),
            },
        ];

        for evt in &events {
            let json = serde_json::to_value(evt).unwrap();
            assert_eq!(json["type"], evt.event_type(), "for {evt:?}");
        }
    }

    #[test]
    fn terminal_classification() {
        assert!(RunEvent::RunDone.is_terminal());
        assert!(RunEvent::RunError { error: "x".into() }.is_terminal());
        assert!(!RunEvent::RunStarted.is_terminal());
        assert!(!RunEvent::RoundSummary {
            round: 1,
            best_answer: String::new(),
            what_changed: String::new(),
        }
        .is_terminal());
    }

    #[test]
    fn agent_id_accessor() {
        let evt = RunEvent::AgentDone {
            agent_id: AgentId::Coder,
            round: 3,
            content: "fn main() {}".into(),
        };
        assert_eq!(evt.agent_id(), Some(AgentId::Coder));
        assert_eq!(RunEvent::RunDone.agent_id(), None);
    }

    #[test]
    fn serde_roundtrip() {
        let evt = RunEvent::AgentOutputChunk {
            agent_id: AgentId::Writer,
            round: 1,
            text: "a fragment".into(),
        };
        let json = serde_json::to_string(&evt).unwrap();
        let parsed: RunEvent = serde_json::from_str(&json).unwrap();
        let json2 = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, json2);
    }
}
