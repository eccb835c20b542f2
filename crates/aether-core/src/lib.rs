pub mod agents;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod provider;

pub use agents::AgentId;
pub use config::RunConfig;
pub use errors::ProviderFailure;
pub use events::RunEvent;
pub use provider::{AgentProvider, AgentReply, AgentRequest, ProviderEvent, ProviderStream};
