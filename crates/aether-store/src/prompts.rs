use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::PromptId;
use aether_core::AgentId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptScope {
    Global,
    Agent,
}

impl std::fmt::Display for PromptScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for PromptScope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown prompt scope: {other}")),
        }
    }
}

/// One immutable prompt version. Versions are monotonic per
/// (scope, agent_id); rows are never updated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptRow {
    pub id: PromptId,
    pub scope: PromptScope,
    pub agent_id: Option<AgentId>,
    pub version: u32,
    pub label: String,
    pub content: String,
    pub created_at: String,
}

pub struct PromptRepo {
    db: Database,
}

impl PromptRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the next version for the given scope. The version number is
    /// computed and inserted under one connection lock.
    #[instrument(skip(self, content), fields(scope = %scope, agent_id = ?agent_id))]
    pub fn create(
        &self,
        scope: PromptScope,
        agent_id: Option<AgentId>,
        label: &str,
        content: &str,
    ) -> Result<PromptRow, StoreError> {
        let id = PromptId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let version: u32 = match agent_id {
                Some(agent) => conn.query_row(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE scope = ?1 AND agent_id = ?2",
                    rusqlite::params![scope.to_string(), agent.as_str()],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE scope = ?1 AND agent_id IS NULL",
                    [scope.to_string()],
                    |row| row.get(0),
                )?,
            };

            conn.execute(
                "INSERT INTO prompts (id, scope, agent_id, version, label, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.as_str(),
                    scope.to_string(),
                    agent_id.map(|a| a.as_str()),
                    version,
                    label,
                    content,
                    now,
                ],
            )?;

            Ok(PromptRow {
                id,
                scope,
                agent_id,
                version,
                label: label.to_string(),
                content: content.to_string(),
                created_at: now,
            })
        })
    }

    /// All prompt versions, highest version first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<PromptRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, scope, agent_id, version, label, content, created_at
                 FROM prompts ORDER BY version DESC, created_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_prompt(row)?);
            }
            Ok(results)
        })
    }

    /// Latest version for a scope, if any.
    #[instrument(skip(self), fields(scope = %scope, agent_id = ?agent_id))]
    pub fn latest(
        &self,
        scope: PromptScope,
        agent_id: Option<AgentId>,
    ) -> Result<Option<PromptRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = match agent_id {
                Some(_) => conn.prepare(
                    "SELECT id, scope, agent_id, version, label, content, created_at
                     FROM prompts WHERE scope = ?1 AND agent_id = ?2
                     ORDER BY version DESC LIMIT 1",
                )?,
                None => conn.prepare(
                    "SELECT id, scope, agent_id, version, label, content, created_at
                     FROM prompts WHERE scope = ?1 AND agent_id IS NULL
                     ORDER BY version DESC LIMIT 1",
                )?,
            };
            let mut rows = match agent_id {
                Some(agent) => stmt.query(rusqlite::params![scope.to_string(), agent.as_str()])?,
                None => stmt.query([scope.to_string()])?,
            };
            match rows.next()? {
                Some(row) => Ok(Some(row_to_prompt(row)?)),
                None => Ok(None),
            }
        })
    }
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> Result<PromptRow, StoreError> {
    let scope_str: String = row_helpers::get(row, 1, "prompts", "scope")?;
    let agent_id = match row_helpers::get_opt::<String>(row, 2, "prompts", "agent_id")? {
        Some(raw) => Some(row_helpers::parse_enum(&raw, "prompts", "agent_id")?),
        None => None,
    };

    Ok(PromptRow {
        id: PromptId::from_raw(row_helpers::get::<String>(row, 0, "prompts", "id")?),
        scope: row_helpers::parse_enum(&scope_str, "prompts", "scope")?,
        agent_id,
        version: row_helpers::get::<i64>(row, 3, "prompts", "version")? as u32,
        label: row_helpers::get(row, 4, "prompts", "label")?,
        content: row_helpers::get(row, 5, "prompts", "content")?,
        created_at: row_helpers::get(row, 6, "prompts", "created_at")?,
    })
}
