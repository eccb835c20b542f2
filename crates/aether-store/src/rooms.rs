use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::RoomId;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomRow {
    pub id: RoomId,
    pub name: String,
    pub archived: bool,
    pub created_at: String,
}

pub struct RoomRepo {
    db: Database,
}

impl RoomRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(name))]
    pub fn create(&self, name: &str) -> Result<RoomRow, StoreError> {
        let id = RoomId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, name, archived, created_at) VALUES (?1, ?2, 0, ?3)",
                rusqlite::params![id.as_str(), name, now],
            )?;

            Ok(RoomRow {
                id,
                name: name.to_string(),
                archived: false,
                created_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(room_id = %id))]
    pub fn get(&self, id: &RoomId) -> Result<RoomRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, archived, created_at FROM rooms WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(RoomRow {
                        id: RoomId::from_raw(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        archived: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .map_err(|_| StoreError::NotFound(format!("room {id}")))
        })
    }

    /// List all rooms, newest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<RoomRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, archived, created_at FROM rooms ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RoomRow {
                        id: RoomId::from_raw(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        archived: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial update; absent fields keep their value.
    #[instrument(skip(self), fields(room_id = %id))]
    pub fn update(
        &self,
        id: &RoomId,
        name: Option<&str>,
        archived: Option<bool>,
    ) -> Result<RoomRow, StoreError> {
        let current = self.get(id)?;
        let name = name.unwrap_or(&current.name);
        let archived = archived.unwrap_or(current.archived);

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE rooms SET name = ?1, archived = ?2 WHERE id = ?3",
                rusqlite::params![name, archived, id.as_str()],
            )?;
            Ok(())
        })?;

        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn create_room() {
        let repo = RoomRepo::new(test_db());
        let room = repo.create("General Research").unwrap();
        assert!(room.id.as_str().starts_with("room_"));
        assert_eq!(room.name, "General Research");
        assert!(!room.archived);
    }

    #[test]
    fn get_room() {
        let repo = RoomRepo::new(test_db());
        let room = repo.create("Code Review").unwrap();
        let fetched = repo.get(&room.id).unwrap();
        assert_eq!(fetched.id, room.id);
        assert_eq!(fetched.name, "Code Review");
    }

    #[test]
    fn get_nonexistent_fails() {
        let repo = RoomRepo::new(test_db());
        assert!(matches!(
            repo.get(&RoomId::from_raw("room_missing")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_rooms_newest_first() {
        let repo = RoomRepo::new(test_db());
        repo.create("First").unwrap();
        let second = repo.create("Second").unwrap();
        let rooms = repo.list().unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, second.id);
    }

    #[test]
    fn archive_room() {
        let repo = RoomRepo::new(test_db());
        let room = repo.create("Strategy Planning").unwrap();
        let updated = repo.update(&room.id, None, Some(true)).unwrap();
        assert!(updated.archived);
        assert_eq!(updated.name, "Strategy Planning");
    }
}
