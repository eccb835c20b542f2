use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::{RoomId, RunId, UserId};
use aether_core::RunConfig;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Run lifecycle. `done` and `error` are terminal; `paused` is reached
/// only through an external stop while running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRow {
    pub id: RunId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub status: RunStatus,
    pub config: RunConfig,
    pub current_round: u32,
    pub max_rounds: u32,
    pub best_answer: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a new run record. Continuations set a non-zero
/// `current_round` and carry the source run's best answer.
#[derive(Clone, Debug)]
pub struct NewRun {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub status: RunStatus,
    pub config: RunConfig,
    pub current_round: u32,
    pub max_rounds: u32,
    pub best_answer: Option<String>,
}

pub struct RunRepo {
    db: Database,
}

impl RunRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new run.
    #[instrument(skip(self, new), fields(room_id = %new.room_id, status = %new.status))]
    pub fn create(&self, new: NewRun) -> Result<RunRow, StoreError> {
        let id = RunId::new();
        let now = Utc::now().to_rfc3339();
        let config_json = serde_json::to_string(&new.config)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (id, room_id, user_id, status, config, current_round, max_rounds, best_answer, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    id.as_str(),
                    new.room_id.as_str(),
                    new.user_id.as_str(),
                    new.status.to_string(),
                    config_json,
                    new.current_round,
                    new.max_rounds,
                    new.best_answer,
                    now,
                    now,
                ],
            )?;

            Ok(RunRow {
                id,
                room_id: new.room_id.clone(),
                user_id: new.user_id.clone(),
                status: new.status,
                config: new.config.clone(),
                current_round: new.current_round,
                max_rounds: new.max_rounds,
                best_answer: new.best_answer.clone(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Get a run by ID.
    #[instrument(skip(self), fields(run_id = %id))]
    pub fn get(&self, id: &RunId) -> Result<RunRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, user_id, status, config, current_round, max_rounds,
                        best_answer, created_at, updated_at
                 FROM runs WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_run(row),
                None => Err(StoreError::NotFound(format!("run {id}"))),
            }
        })
    }

    /// List runs in a room, newest first.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn list_for_room(&self, room_id: &RoomId) -> Result<Vec<RunRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, user_id, status, config, current_round, max_rounds,
                        best_answer, created_at, updated_at
                 FROM runs WHERE room_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([room_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_run(row)?);
            }
            Ok(results)
        })
    }

    /// Most recent run in a room, if any.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn latest_for_room(&self, room_id: &RoomId) -> Result<Option<RunRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, user_id, status, config, current_round, max_rounds,
                        best_answer, created_at, updated_at
                 FROM runs WHERE room_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([room_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_run(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Advance the round counter and status together (start of a round).
    #[instrument(skip(self), fields(run_id = %id, round, status = %status))]
    pub fn update_progress(
        &self,
        id: &RunId,
        round: u32,
        status: RunStatus,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE runs SET current_round = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![round, status.to_string(), now, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Update run status.
    #[instrument(skip(self), fields(run_id = %id, status = %status))]
    pub fn update_status(&self, id: &RunId, status: RunStatus) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.to_string(), now, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Set the best answer (synthesis phase output).
    #[instrument(skip(self, best_answer), fields(run_id = %id))]
    pub fn update_best_answer(&self, id: &RunId, best_answer: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE runs SET best_answer = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![best_answer, now, id.as_str()],
            )?;
            Ok(())
        })
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> Result<RunRow, StoreError> {
    let status_str: String = row_helpers::get(row, 3, "runs", "status")?;
    let config_json: String = row_helpers::get(row, 4, "runs", "config")?;

    Ok(RunRow {
        id: RunId::from_raw(row_helpers::get::<String>(row, 0, "runs", "id")?),
        room_id: RoomId::from_raw(row_helpers::get::<String>(row, 1, "runs", "room_id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "runs", "user_id")?),
        status: row_helpers::parse_enum(&status_str, "runs", "status")?,
        config: row_helpers::parse_json(&config_json, "runs", "config")?,
        current_round: row_helpers::get::<i64>(row, 5, "runs", "current_round")? as u32,
        max_rounds: row_helpers::get::<i64>(row, 6, "runs", "max_rounds")? as u32,
        best_answer: row_helpers::get_opt(row, 7, "runs", "best_answer")?,
        created_at: row_helpers::get(row, 8, "runs", "created_at")?,
        updated_at: row_helpers::get(row, 9, "runs", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::RoomRepo;
    use crate::users::{UserRepo, UserRole};

    fn setup() -> (Database, RoomId, UserId) {
        let db = Database::in_memory().unwrap();
        let room = RoomRepo::new(db.clone()).create("Test Room").unwrap();
        let user = UserRepo::new(db.clone())
            .create("Tester", UserRole::User, false)
            .unwrap();
        (db, room.id, user.id)
    }

    fn new_run(room_id: &RoomId, user_id: &UserId) -> NewRun {
        NewRun {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            status: RunStatus::Running,
            config: RunConfig::default(),
            current_round: 0,
            max_rounds: 3,
            best_answer: None,
        }
    }

    #[test]
    fn create_run() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let run = repo.create(new_run(&room_id, &user_id)).unwrap();
        assert!(run.id.as_str().starts_with("run_"));
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_round, 0);
        assert_eq!(run.max_rounds, 3);
        assert!(run.best_answer.is_none());
    }

    #[test]
    fn get_run_roundtrips_config() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let mut new = new_run(&room_id, &user_id);
        new.config.rounds = 5;
        new.config.citations_required = true;
        let run = repo.create(new).unwrap();

        let fetched = repo.get(&run.id).unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.config.rounds, 5);
        assert!(fetched.config.citations_required);
    }

    #[test]
    fn get_nonexistent_fails() {
        let (db, _, _) = setup();
        let repo = RunRepo::new(db);
        let result = repo.get(&RunId::from_raw("run_nonexistent"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn latest_for_room() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        assert!(repo.latest_for_room(&room_id).unwrap().is_none());

        repo.create(new_run(&room_id, &user_id)).unwrap();
        let second = repo.create(new_run(&room_id, &user_id)).unwrap();

        let latest = repo.latest_for_room(&room_id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[test]
    fn list_for_room_newest_first() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let first = repo.create(new_run(&room_id, &user_id)).unwrap();
        let second = repo.create(new_run(&room_id, &user_id)).unwrap();

        let runs = repo.list_for_room(&room_id).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }

    #[test]
    fn update_progress() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let run = repo.create(new_run(&room_id, &user_id)).unwrap();

        repo.update_progress(&run.id, 2, RunStatus::Running).unwrap();
        let fetched = repo.get(&run.id).unwrap();
        assert_eq!(fetched.current_round, 2);
        assert_eq!(fetched.status, RunStatus::Running);
    }

    #[test]
    fn update_status() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let run = repo.create(new_run(&room_id, &user_id)).unwrap();

        repo.update_status(&run.id, RunStatus::Done).unwrap();
        assert_eq!(repo.get(&run.id).unwrap().status, RunStatus::Done);
    }

    #[test]
    fn update_best_answer() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let run = repo.create(new_run(&room_id, &user_id)).unwrap();

        repo.update_best_answer(&run.id, "the answer is 42").unwrap();
        let fetched = repo.get(&run.id).unwrap();
        assert_eq!(fetched.best_answer.as_deref(), Some("the answer is 42"));
    }

    #[test]
    fn continuation_fields_persist() {
        let (db, room_id, user_id) = setup();
        let repo = RunRepo::new(db);
        let mut new = new_run(&room_id, &user_id);
        new.current_round = 3;
        new.max_rounds = 4;
        new.best_answer = Some("carried forward".into());
        let run = repo.create(new).unwrap();

        let fetched = repo.get(&run.id).unwrap();
        assert_eq!(fetched.current_round, 3);
        assert_eq!(fetched.max_rounds, 4);
        assert_eq!(fetched.best_answer.as_deref(), Some("carried forward"));
    }

    #[test]
    fn status_terminal_classification() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Idle.is_terminal());
    }

    #[test]
    fn invalid_status_returns_corrupt_row() {
        let (db, room_id, user_id) = setup();
        let run_id = RunId::new();
        let now = chrono::Utc::now().to_rfc3339();
        let config = serde_json::to_string(&RunConfig::default()).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (id, room_id, user_id, status, config, current_round, max_rounds, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'INVALID_STATUS', ?4, 0, 3, ?5, ?5)",
                rusqlite::params![run_id.as_str(), room_id.as_str(), user_id.as_str(), config, now],
            )?;
            Ok(())
        })
        .unwrap();

        let repo = RunRepo::new(db);
        let result = repo.get(&run_id);
        assert!(matches!(result, Err(StoreError::CorruptRow { .. })));
    }
}
