//! The round loop.
//!
//! `RoundRunner` drives one run to completion: each round executes the
//! coordinator phase, then the remaining enabled agents in config
//! order, then the synthesis phase, streaming provider output as
//! events and persisting every non-empty reply. Stop requests are
//! honored at phase boundaries; the phase in flight always finishes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use aether_core::agents::AgentId;
use aether_core::events::RunEvent;
use aether_core::provider::{AgentProvider, AgentReply, AgentRequest, ProviderEvent};
use aether_store::messages::{MessageRepo, MessageRole, NewMessage};
use aether_store::runs::{RunRepo, RunRow, RunStatus};
use aether_store::Database;

use crate::channel::RunChannelRegistry;
use crate::error::EngineError;

/// Room history lines carry at most this many characters of content.
const HISTORY_SNIPPET_CHARS: usize = 200;
/// How many recent room messages seed the shared history at run start.
const HISTORY_SEED_MESSAGES: usize = 20;

pub(crate) const DEFAULT_MAX_RUN_DURATION: Duration = Duration::from_secs(30 * 60);

/// Parameters for one run's round loop. Rounds are numbered from the
/// run's `current_round` at creation, so a fresh run produces rounds
/// `1..=rounds` and a continuation picks up where its source left off.
pub struct RoundParams {
    pub run: RunRow,
    /// The question that started the run (or the source run, for
    /// continuations).
    pub user_message: String,
    /// Synthesis outputs carried over from a continued run.
    pub prior_summaries: Vec<String>,
}

enum LoopExit {
    Completed,
    Stopped,
}

pub struct RoundRunner {
    provider: Arc<dyn AgentProvider>,
    run_repo: RunRepo,
    message_repo: MessageRepo,
    channels: Arc<RunChannelRegistry>,
    max_run_duration: Duration,
}

impl RoundRunner {
    pub fn new(
        provider: Arc<dyn AgentProvider>,
        db: Database,
        channels: Arc<RunChannelRegistry>,
    ) -> Self {
        Self {
            provider,
            run_repo: RunRepo::new(db.clone()),
            message_repo: MessageRepo::new(db),
            channels,
            max_run_duration: DEFAULT_MAX_RUN_DURATION,
        }
    }

    pub fn with_max_run_duration(mut self, limit: Duration) -> Self {
        self.max_run_duration = limit;
        self
    }

    /// Execute the full round loop for one run. Emits `RunStarted`
    /// first and `RunDone` on success or stop; errors bubble up for
    /// the orchestrator to turn into `RunError`.
    #[instrument(skip_all, fields(run_id = %params.run.id))]
    pub async fn run_rounds(
        &self,
        params: RoundParams,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let RoundParams {
            run,
            user_message,
            mut prior_summaries,
        } = params;
        let started = Instant::now();

        self.channels.publish(&run.id, RunEvent::RunStarted);

        // Agents that take a turn after the coordinator, in config
        // order. The coordinator itself runs every round regardless of
        // the enabled set.
        let enabled: Vec<AgentId> = run
            .config
            .enabled_agents
            .iter()
            .copied()
            .filter(|a| *a != AgentId::Coordinator)
            .collect();
        let parallel: Vec<AgentId> = enabled
            .iter()
            .copied()
            .filter(|a| *a != AgentId::Summarizer)
            .collect();
        let run_summarizer = enabled.contains(&AgentId::Summarizer);

        // Shared history seeded from the room's recent messages. Only
        // coordinator output is appended as rounds progress.
        let mut room_history = self.seed_history(&run)?;

        let start_round = run.current_round;
        let rounds = run.config.rounds;
        let mut exit = LoopExit::Completed;

        for round in (start_round + 1)..=(start_round + rounds) {
            if cancel.is_cancelled() {
                exit = LoopExit::Stopped;
                break;
            }
            if started.elapsed() >= self.max_run_duration {
                return Err(EngineError::RunTimeout(self.max_run_duration));
            }

            self.run_repo
                .update_progress(&run.id, round, RunStatus::Running)?;

            // Outputs of this round so far, visible to later phases.
            let mut round_responses: Vec<String> = Vec::new();

            // 1. Coordinator frames the round.
            let reply = self
                .run_phase(
                    &run,
                    AgentId::Coordinator,
                    round,
                    &user_message,
                    room_history.clone(),
                    &prior_summaries,
                )
                .await?;
            if !reply.content.is_empty() {
                self.persist_reply(&run, round, &reply)?;
                round_responses.push(format!(
                    "[{}]: {}",
                    AgentId::Coordinator.display_name(),
                    reply.content
                ));
                room_history.push(format!(
                    "[{}]: {}",
                    AgentId::Coordinator,
                    snippet(&reply.content)
                ));
            }

            if cancel.is_cancelled() {
                exit = LoopExit::Stopped;
                break;
            }

            // 2. Remaining agents respond in config order, each seeing
            //    what this round already produced.
            for agent in &parallel {
                if cancel.is_cancelled() {
                    break;
                }
                let mut history = room_history.clone();
                history.extend(round_responses.iter().cloned());
                let reply = self
                    .run_phase(&run, *agent, round, &user_message, history, &prior_summaries)
                    .await?;
                if !reply.content.is_empty() {
                    self.persist_reply(&run, round, &reply)?;
                    round_responses.push(format!("[{agent}]: {}", reply.content));
                }
            }

            if cancel.is_cancelled() {
                exit = LoopExit::Stopped;
                break;
            }

            // 3. Synthesis closes the round when enabled.
            if run_summarizer {
                let mut history = room_history.clone();
                history.extend(round_responses.iter().cloned());
                let reply = self
                    .run_phase(
                        &run,
                        AgentId::Summarizer,
                        round,
                        &user_message,
                        history,
                        &prior_summaries,
                    )
                    .await?;
                if !reply.content.is_empty() {
                    self.persist_reply(&run, round, &reply)?;
                    let what_changed = format!(
                        "Round {round} complete with input from {} agents.",
                        round_responses.len() + 1
                    );
                    self.run_repo.update_best_answer(&run.id, &reply.content)?;
                    prior_summaries.push(reply.content.clone());
                    self.channels.publish(
                        &run.id,
                        RunEvent::RoundSummary {
                            round,
                            best_answer: reply.content.clone(),
                            what_changed,
                        },
                    );
                    self.channels.publish(
                        &run.id,
                        RunEvent::BestAnswerUpdated {
                            best_answer: reply.content,
                        },
                    );
                }
            }
        }

        match exit {
            LoopExit::Completed => {
                self.run_repo.update_status(&run.id, RunStatus::Done)?;
            }
            // Stop already wrote the terminal status.
            LoopExit::Stopped => {}
        }
        self.channels.publish(&run.id, RunEvent::RunDone);
        Ok(())
    }

    /// One agent phase: emit started, stream the provider, forward
    /// chunks, emit done. Providers render their own failures as
    /// diagnostic replies, so a missing terminal reply is a bug.
    async fn run_phase(
        &self,
        run: &RunRow,
        agent_id: AgentId,
        round: u32,
        user_message: &str,
        room_history: Vec<String>,
        prior_summaries: &[String],
    ) -> Result<AgentReply, EngineError> {
        self.channels
            .publish(&run.id, RunEvent::AgentStarted { agent_id, round });

        let request = AgentRequest {
            run_id: run.id.clone(),
            room_id: run.room_id.clone(),
            user_id: run.user_id.clone(),
            round,
            agent_id,
            user_message: user_message.to_string(),
            room_history,
            prior_summaries: prior_summaries.to_vec(),
            config: run.config.clone(),
        };

        let mut stream = self.provider.generate(request).await;
        let mut reply: Option<AgentReply> = None;

        while let Some(event) = stream.next().await {
            match event {
                ProviderEvent::Chunk { text } => {
                    self.channels.publish(
                        &run.id,
                        RunEvent::AgentOutputChunk {
                            agent_id,
                            round,
                            text,
                        },
                    );
                }
                ProviderEvent::Done { reply: r } => {
                    reply = Some(r);
                }
            }
        }

        let reply = reply.ok_or_else(|| {
            EngineError::Internal(format!("{agent_id} stream ended without a terminal reply"))
        })?;

        self.channels.publish(
            &run.id,
            RunEvent::AgentDone {
                agent_id,
                round,
                content: reply.content.clone(),
            },
        );

        Ok(reply)
    }

    fn persist_reply(&self, run: &RunRow, round: u32, reply: &AgentReply) -> Result<(), EngineError> {
        self.message_repo.create(NewMessage {
            room_id: run.room_id.clone(),
            run_id: Some(run.id.clone()),
            round: Some(round),
            agent_id: Some(reply.agent_id),
            role: MessageRole::Agent,
            content: reply.content.clone(),
            sources: reply.sources.clone(),
        })?;
        Ok(())
    }

    fn seed_history(&self, run: &RunRow) -> Result<Vec<String>, EngineError> {
        let messages = self.message_repo.list_for_room(&run.room_id)?;
        let skip = messages.len().saturating_sub(HISTORY_SEED_MESSAGES);
        Ok(messages[skip..]
            .iter()
            .map(|m| {
                let speaker = m.agent_id.map(|a| a.as_str()).unwrap_or("user");
                format!("[{speaker}]: {}", snippet(&m.content))
            })
            .collect())
    }
}

fn snippet(content: &str) -> String {
    content.chars().take(HISTORY_SNIPPET_CHARS).collect()
}
