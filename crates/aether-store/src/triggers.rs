use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::TriggerId;
use aether_core::RunConfig;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A saved launch preset: a run config plus optional per-agent prompt
/// overrides, selectable when starting a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerRow {
    pub id: TriggerId,
    pub name: String,
    pub config: Option<RunConfig>,
    pub prompt_overrides: Option<serde_json::Value>,
    pub created_at: String,
}

pub struct TriggerRepo {
    db: Database,
}

impl TriggerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, config, prompt_overrides), fields(name = %name))]
    pub fn create(
        &self,
        name: &str,
        config: Option<&RunConfig>,
        prompt_overrides: Option<&serde_json::Value>,
    ) -> Result<TriggerRow, StoreError> {
        let id = TriggerId::new();
        let now = Utc::now().to_rfc3339();
        let config_json = config.map(serde_json::to_string).transpose()?;
        let overrides_json = prompt_overrides.map(serde_json::to_string).transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO triggers (id, name, config, prompt_overrides, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), name, config_json, overrides_json, now],
            )?;
            Ok(())
        })?;

        Ok(TriggerRow {
            id,
            name: name.to_string(),
            config: config.cloned(),
            prompt_overrides: prompt_overrides.cloned(),
            created_at: now,
        })
    }

    #[instrument(skip(self), fields(trigger_id = %id))]
    pub fn get(&self, id: &TriggerId) -> Result<TriggerRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, config, prompt_overrides, created_at
                 FROM triggers WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_trigger(row),
                None => Err(StoreError::NotFound(format!("trigger {id}"))),
            }
        })
    }

    /// All triggers, newest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<TriggerRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, config, prompt_overrides, created_at
                 FROM triggers ORDER BY created_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_trigger(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(trigger_id = %id))]
    pub fn delete(&self, id: &TriggerId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM triggers WHERE id = ?1", [id.as_str()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("trigger {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_trigger(row: &rusqlite::Row<'_>) -> Result<TriggerRow, StoreError> {
    let config = match row_helpers::get_opt::<String>(row, 2, "triggers", "config")? {
        Some(raw) => Some(row_helpers::parse_json(&raw, "triggers", "config")?),
        None => None,
    };
    let prompt_overrides =
        match row_helpers::get_opt::<String>(row, 3, "triggers", "prompt_overrides")? {
            Some(raw) => Some(row_helpers::parse_json(&raw, "triggers", "prompt_overrides")?),
            None => None,
        };

    Ok(TriggerRow {
        id: TriggerId::from_raw(row_helpers::get::<String>(row, 0, "triggers", "id")?),
        name: row_helpers::get(row, 1, "triggers", "name")?,
        config,
        prompt_overrides,
        created_at: row_helpers::get(row, 4, "triggers", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::AgentId;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn create_and_get_roundtrips_config() {
        let repo = TriggerRepo::new(test_db());
        let config = RunConfig {
            rounds: 5,
            citations_required: true,
            enabled_agents: AgentId::ALL.to_vec(),
            ..RunConfig::default()
        };
        let created = repo.create("Deep Research", Some(&config), None).unwrap();
        assert!(created.id.as_str().starts_with("trig_"));

        let fetched = repo.get(&created.id).unwrap();
        assert_eq!(fetched.name, "Deep Research");
        let fetched_config = fetched.config.unwrap();
        assert_eq!(fetched_config.rounds, 5);
        assert!(fetched_config.citations_required);
        assert_eq!(fetched_config.enabled_agents.len(), 6);
    }

    #[test]
    fn config_is_optional() {
        let repo = TriggerRepo::new(test_db());
        let created = repo.create("Bare", None, None).unwrap();
        let fetched = repo.get(&created.id).unwrap();
        assert!(fetched.config.is_none());
        assert!(fetched.prompt_overrides.is_none());
    }

    #[test]
    fn prompt_overrides_roundtrip() {
        let repo = TriggerRepo::new(test_db());
        let overrides = serde_json::json!({ "researcher": "Cite at least three sources." });
        let created = repo.create("Cited", None, Some(&overrides)).unwrap();
        let fetched = repo.get(&created.id).unwrap();
        assert_eq!(fetched.prompt_overrides.unwrap(), overrides);
    }

    #[test]
    fn get_missing_is_not_found() {
        let repo = TriggerRepo::new(test_db());
        let err = repo.get(&TriggerId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_is_newest_first() {
        let repo = TriggerRepo::new(test_db());
        repo.create("first", None, None).unwrap();
        repo.create("second", None, None).unwrap();
        let names: Vec<String> = repo.list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn delete_removes_trigger() {
        let repo = TriggerRepo::new(test_db());
        let created = repo.create("gone soon", None, None).unwrap();
        repo.delete(&created.id).unwrap();
        assert!(matches!(
            repo.get(&created.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete(&created.id),
            Err(StoreError::NotFound(_))
        ));
    }
}
