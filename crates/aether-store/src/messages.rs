use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::{MessageId, RoomId, RunId};
use aether_core::AgentId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// One persisted utterance. Append-only: rows are never updated or
/// deleted. Round 0 with `agent_id` None is the initiating user message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub room_id: RoomId,
    pub run_id: Option<RunId>,
    pub round: Option<u32>,
    pub agent_id: Option<AgentId>,
    pub role: MessageRole,
    pub content: String,
    pub sources: Option<Vec<String>>,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub run_id: Option<RunId>,
    pub round: Option<u32>,
    pub agent_id: Option<AgentId>,
    pub role: MessageRole,
    pub content: String,
    pub sources: Option<Vec<String>>,
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message.
    #[instrument(skip(self, new), fields(room_id = %new.room_id, role = %new.role))]
    pub fn create(&self, new: NewMessage) -> Result<MessageRow, StoreError> {
        let id = MessageId::new();
        let now = Utc::now().to_rfc3339();
        let sources_json = match &new.sources {
            Some(sources) => Some(serde_json::to_string(sources)?),
            None => None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, run_id, round, agent_id, role, content, sources, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id.as_str(),
                    new.room_id.as_str(),
                    new.run_id.as_ref().map(|r| r.as_str()),
                    new.round,
                    new.agent_id.map(|a| a.as_str()),
                    new.role.to_string(),
                    new.content,
                    sources_json,
                    now,
                ],
            )?;

            Ok(MessageRow {
                id,
                room_id: new.room_id.clone(),
                run_id: new.run_id.clone(),
                round: new.round,
                agent_id: new.agent_id,
                role: new.role,
                content: new.content.clone(),
                sources: new.sources.clone(),
                created_at: now,
            })
        })
    }

    /// All messages in a room, oldest first.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn list_for_room(&self, room_id: &RoomId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, run_id, round, agent_id, role, content, sources, created_at
                 FROM messages WHERE room_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([room_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }

    /// All messages belonging to a run, oldest first.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub fn list_for_run(&self, run_id: &RunId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, run_id, round, agent_id, role, content, sources, created_at
                 FROM messages WHERE run_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([run_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    let role_str: String = row_helpers::get(row, 5, "messages", "role")?;
    let agent_id = match row_helpers::get_opt::<String>(row, 4, "messages", "agent_id")? {
        Some(raw) => Some(row_helpers::parse_enum(&raw, "messages", "agent_id")?),
        None => None,
    };
    let sources = match row_helpers::get_opt::<String>(row, 7, "messages", "sources")? {
        Some(raw) => Some(row_helpers::parse_json(&raw, "messages", "sources")?),
        None => None,
    };

    Ok(MessageRow {
        id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "messages", "id")?),
        room_id: RoomId::from_raw(row_helpers::get::<String>(row, 1, "messages", "room_id")?),
        run_id: row_helpers::get_opt::<String>(row, 2, "messages", "run_id")?.map(RunId::from_raw),
        round: row_helpers::get_opt::<i64>(row, 3, "messages", "round")?.map(|r| r as u32),
        agent_id,
        role: row_helpers::parse_enum(&role_str, "messages", "role")?,
        content: row_helpers::get(row, 6, "messages", "content")?,
        sources,
        created_at: row_helpers::get(row, 8, "messages", "created_at")?,
    })
}
