//! First-boot fixtures: demo users, rooms, prompts, and trigger presets.

use aether_core::{AgentId, RunConfig};
use aether_store::prompts::{PromptRepo, PromptScope};
use aether_store::rooms::RoomRepo;
use aether_store::triggers::TriggerRepo;
use aether_store::users::{UserRepo, UserRole};
use aether_store::{Database, StoreError};

/// Populate an empty database with demo fixtures. A database that
/// already has users is left untouched. Returns whether seeding ran.
pub fn seed_if_empty(db: &Database) -> Result<bool, StoreError> {
    let users = UserRepo::new(db.clone());
    if users.any()? {
        return Ok(false);
    }

    users.create("Admin", UserRole::Admin, false)?;
    users.create("Alice Chen", UserRole::User, false)?;
    users.create("Bob Martinez", UserRole::User, false)?;
    users.create("Observer", UserRole::Viewer, false)?;

    let rooms = RoomRepo::new(db.clone());
    rooms.create("General Research")?;
    rooms.create("Code Review")?;
    rooms.create("Strategy Planning")?;

    let prompts = PromptRepo::new(db.clone());
    prompts.create(
        PromptScope::Global,
        None,
        "v1-default",
        "You are part of a multi-agent system called Aether Control Room. Work \
         collaboratively with other agents to provide the most accurate, thorough, \
         and well-reasoned answer possible. Be concise but comprehensive. Always \
         cite your reasoning.",
    )?;
    prompts.create(
        PromptScope::Agent,
        Some(AgentId::Researcher),
        "v1-default",
        "You are the Researcher agent. Your role is to gather evidence, find \
         relevant information, and provide well-sourced data to support the \
         team's analysis. Focus on accuracy and credibility.",
    )?;
    prompts.create(
        PromptScope::Agent,
        Some(AgentId::Skeptic),
        "v1-default",
        "You are the Skeptic agent. Your role is to critically evaluate claims, \
         identify logical fallacies, challenge assumptions, and ensure \
         intellectual rigor. Be constructively critical.",
    )?;

    let triggers = TriggerRepo::new(db.clone());
    triggers.create(
        "Quick Analysis",
        Some(&RunConfig {
            rounds: 1,
            enabled_agents: vec![
                AgentId::Coordinator,
                AgentId::Researcher,
                AgentId::Writer,
                AgentId::Summarizer,
            ],
            ..Default::default()
        }),
        None,
    )?;
    triggers.create(
        "Deep Research",
        Some(&RunConfig {
            rounds: 5,
            citations_required: true,
            ..Default::default()
        }),
        None,
    )?;
    triggers.create(
        "Code Focus",
        Some(&RunConfig {
            rounds: 3,
            enabled_agents: vec![
                AgentId::Coordinator,
                AgentId::Coder,
                AgentId::Skeptic,
                AgentId::Summarizer,
            ],
            ..Default::default()
        }),
        None,
    )?;

    Ok(true)
}
