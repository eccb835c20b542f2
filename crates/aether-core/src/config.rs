use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::ids::TriggerId;

pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 10;
pub const DEFAULT_ROUNDS: u32 = 3;

/// Configuration captured once at run start. Immutable for the run's
/// lifetime; a continuation carries a modified copy as a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub rounds: u32,
    pub always_latest: bool,
    pub citations_required: bool,
    /// Agents take their turn in this order within a round.
    pub enabled_agents: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<TriggerId>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            always_latest: true,
            citations_required: false,
            enabled_agents: AgentId::ALL.to_vec(),
            trigger_id: None,
        }
    }
}

impl RunConfig {
    /// Boundary validation. The round loop itself trusts the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds < MIN_ROUNDS || self.rounds > MAX_ROUNDS {
            return Err(ConfigError::RoundsOutOfRange(self.rounds));
        }
        if self.enabled_agents.is_empty() {
            return Err(ConfigError::NoAgentsEnabled);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rounds must be between {MIN_ROUNDS} and {MAX_ROUNDS}, got {0}")]
    RoundsOutOfRange(u32),

    #[error("at least one agent must be enabled")]
    NoAgentsEnabled,
}
