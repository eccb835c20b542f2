//! Run orchestration.
//!
//! Drives the fixed agent roster through N sequential rounds against a
//! generation backend: the round loop lives in [`runner`], per-run
//! event channels in [`channel`], and the start/stop/continue lifecycle
//! in [`orchestrator`].

pub mod channel;
pub mod error;
pub mod orchestrator;
pub mod runner;

pub use channel::RunChannelRegistry;
pub use error::EngineError;
pub use orchestrator::{RunOrchestrator, StartParams};
