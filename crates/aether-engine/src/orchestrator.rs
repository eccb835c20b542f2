//! Run lifecycle: start, stop, continue, subscribe.
//!
//! `RunOrchestrator` owns the active-run registry and the per-run
//! event channels. Starting a run validates inputs, persists the run
//! and the initiating user message, then spawns the round loop in the
//! background; the caller gets the run ID back before any round
//! executes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use aether_core::agents::AgentId;
use aether_core::config::RunConfig;
use aether_core::events::RunEvent;
use aether_core::ids::{RoomId, RunId, UserId};
use aether_core::provider::AgentProvider;
use aether_store::messages::{MessageRepo, MessageRole, NewMessage};
use aether_store::runs::{NewRun, RunRepo, RunRow, RunStatus};
use aether_store::{Database, StoreError};

use crate::channel::RunChannelRegistry;
use crate::error::EngineError;
use crate::runner::{RoundParams, RoundRunner, DEFAULT_MAX_RUN_DURATION};

/// How long a finished run's channel stays available to late
/// subscribers before it is removed.
const DEFAULT_CHANNEL_GRACE: Duration = Duration::from_secs(30);

/// Parameters for starting a run.
#[derive(Debug, Clone)]
pub struct StartParams {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub message: String,
    /// Defaults apply when absent.
    pub config: Option<RunConfig>,
}

/// Tracks an active run.
struct ActiveRun {
    cancel: CancellationToken,
    _started_at: Instant,
}

pub struct RunOrchestrator {
    provider: Arc<dyn AgentProvider>,
    db: Database,
    channels: Arc<RunChannelRegistry>,
    active_runs: Arc<DashMap<RunId, ActiveRun>>,
    max_run_duration: Duration,
    channel_grace: Duration,
}

impl RunOrchestrator {
    pub fn new(provider: Arc<dyn AgentProvider>, db: Database) -> Self {
        Self {
            provider,
            db,
            channels: Arc::new(RunChannelRegistry::default()),
            active_runs: Arc::new(DashMap::new()),
            max_run_duration: DEFAULT_MAX_RUN_DURATION,
            channel_grace: DEFAULT_CHANNEL_GRACE,
        }
    }

    pub fn with_max_run_duration(mut self, limit: Duration) -> Self {
        self.max_run_duration = limit;
        self
    }

    pub fn with_channel_grace(mut self, grace: Duration) -> Self {
        self.channel_grace = grace;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channels = Arc::new(RunChannelRegistry::new(capacity));
        self
    }

    /// Start a run. Validation and persistence failures surface here;
    /// everything after the spawn is reported through the run's event
    /// channel and final status.
    pub fn start(&self, params: StartParams) -> Result<RunId, EngineError> {
        if params.room_id.as_str().is_empty()
            || params.user_id.as_str().is_empty()
            || params.message.is_empty()
        {
            return Err(EngineError::InvalidInput(
                "room_id, user_id, and message are required".into(),
            ));
        }
        let config = params.config.unwrap_or_default();
        config.validate()?;

        let run = RunRepo::new(self.db.clone()).create(NewRun {
            room_id: params.room_id.clone(),
            user_id: params.user_id.clone(),
            status: RunStatus::Running,
            config: config.clone(),
            current_round: 0,
            max_rounds: config.rounds,
            best_answer: None,
        })?;

        MessageRepo::new(self.db.clone()).create(NewMessage {
            room_id: params.room_id,
            run_id: Some(run.id.clone()),
            round: Some(0),
            agent_id: None,
            role: MessageRole::User,
            content: params.message.clone(),
            sources: None,
        })?;

        let run_id = run.id.clone();
        self.spawn_loop(run, params.message, Vec::new());
        Ok(run_id)
    }

    /// Start a one-round continuation of an existing run. The new run
    /// reuses the source's question, carries its best answer and
    /// synthesis history, and picks up the round numbering where the
    /// source left off.
    pub fn continue_run(&self, run_id: &RunId) -> Result<RunId, EngineError> {
        let run_repo = RunRepo::new(self.db.clone());
        let source = run_repo.get(run_id).map_err(|e| match e {
            StoreError::NotFound(_) => EngineError::RunNotFound(run_id.to_string()),
            other => EngineError::Store(other),
        })?;

        let messages = MessageRepo::new(self.db.clone()).list_for_run(run_id)?;
        let prior_summaries: Vec<String> = messages
            .iter()
            .filter(|m| m.agent_id == Some(AgentId::Summarizer))
            .map(|m| m.content.clone())
            .collect();
        let user_message = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let config = RunConfig {
            rounds: 1,
            ..source.config
        };
        let run = run_repo.create(NewRun {
            room_id: source.room_id.clone(),
            user_id: source.user_id.clone(),
            status: RunStatus::Running,
            config,
            current_round: source.current_round,
            max_rounds: source.current_round + 1,
            best_answer: source.best_answer.clone(),
        })?;

        let new_id = run.id.clone();
        self.spawn_loop(run, user_message, prior_summaries);
        Ok(new_id)
    }

    /// Stop a run: flag the loop to exit at the next phase boundary
    /// and mark the run done immediately. Returns whether the run was
    /// active; stopping an inactive or unknown run is a no-op.
    pub fn stop(&self, run_id: &RunId) -> Result<bool, EngineError> {
        let was_active = match self.active_runs.remove(run_id) {
            Some((_, run)) => {
                run.cancel.cancel();
                true
            }
            None => false,
        };
        RunRepo::new(self.db.clone()).update_status(run_id, RunStatus::Done)?;
        Ok(was_active)
    }

    /// Subscribe to a run's event channel. Events published before
    /// this call are not replayed.
    pub fn subscribe(&self, run_id: &RunId) -> broadcast::Receiver<RunEvent> {
        self.channels.subscribe(run_id)
    }

    pub fn is_active(&self, run_id: &RunId) -> bool {
        self.active_runs.contains_key(run_id)
    }

    pub fn active_count(&self) -> usize {
        self.active_runs.len()
    }

    fn spawn_loop(&self, run: RunRow, user_message: String, prior_summaries: Vec<String>) {
        let cancel = CancellationToken::new();
        self.active_runs.insert(
            run.id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                _started_at: Instant::now(),
            },
        );

        let runner = RoundRunner::new(
            Arc::clone(&self.provider),
            self.db.clone(),
            Arc::clone(&self.channels),
        )
        .with_max_run_duration(self.max_run_duration);

        let run_id = run.id.clone();
        let run_repo = RunRepo::new(self.db.clone());
        let channels = Arc::clone(&self.channels);
        let active_runs = Arc::clone(&self.active_runs);
        let grace = self.channel_grace;

        tokio::spawn(async move {
            let params = RoundParams {
                run,
                user_message,
                prior_summaries,
            };
            let result = runner.run_rounds(params, &cancel).await;

            if let Err(ref e) = result {
                warn!(run_id = %run_id, error = %e, "run loop failed");
                if let Err(store_err) = run_repo.update_status(&run_id, RunStatus::Error) {
                    error!(run_id = %run_id, error = %store_err, "failed to record error status");
                }
                channels.publish(
                    &run_id,
                    RunEvent::RunError {
                        error: e.to_string(),
                    },
                );
            }

            active_runs.remove(&run_id);

            // Keep the channel around briefly so a late subscriber can
            // still observe the stream tail.
            tokio::time::sleep(grace).await;
            channels.remove(&run_id);
        });
    }
}
