use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use aether_core::ids::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
    Viewer,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub disabled: bool,
    pub created_at: String,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(name, role = %role))]
    pub fn create(&self, name: &str, role: UserRole, disabled: bool) -> Result<UserRow, StoreError> {
        let id = UserId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, role, disabled, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), name, role.to_string(), disabled, now],
            )?;

            Ok(UserRow {
                id,
                name: name.to_string(),
                role,
                disabled,
                created_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, role, disabled, created_at FROM users WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user {id}"))),
            }
        })
    }

    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, role, disabled, created_at FROM users ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_user(row)?);
            }
            Ok(results)
        })
    }

    /// Partial update; absent fields keep their value.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn update(
        &self,
        id: &UserId,
        name: Option<&str>,
        role: Option<UserRole>,
        disabled: Option<bool>,
    ) -> Result<UserRow, StoreError> {
        let current = self.get(id)?;
        let name = name.unwrap_or(&current.name);
        let role = role.unwrap_or(current.role);
        let disabled = disabled.unwrap_or(current.disabled);

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET name = ?1, role = ?2, disabled = ?3 WHERE id = ?4",
                rusqlite::params![name, role.to_string(), disabled, id.as_str()],
            )?;
            Ok(())
        })?;

        self.get(id)
    }

    /// Whether any users exist (seed guard).
    pub fn any(&self) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(count > 0)
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    let role_str: String = row_helpers::get(row, 2, "users", "role")?;
    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        name: row_helpers::get(row, 1, "users", "name")?,
        role: row_helpers::parse_enum(&role_str, "users", "role")?,
        disabled: row_helpers::get(row, 3, "users", "disabled")?,
        created_at: row_helpers::get(row, 4, "users", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn create_user() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("Alice Chen", UserRole::User, false).unwrap();
        assert!(user.id.as_str().starts_with("user_"));
        assert_eq!(user.name, "Alice Chen");
        assert_eq!(user.role, UserRole::User);
        assert!(!user.disabled);
    }

    #[test]
    fn get_user() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("Admin", UserRole::Admin, false).unwrap();
        let fetched = repo.get(&user.id).unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.role, UserRole::Admin);
    }

    #[test]
    fn get_nonexistent_fails() {
        let repo = UserRepo::new(test_db());
        assert!(repo.get(&UserId::from_raw("user_missing")).is_err());
    }

    #[test]
    fn list_users() {
        let repo = UserRepo::new(test_db());
        repo.create("A", UserRole::Admin, false).unwrap();
        repo.create("B", UserRole::Viewer, false).unwrap();
        let users = repo.list().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "A");
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("Bob Martinez", UserRole::User, false).unwrap();

        let updated = repo.update(&user.id, None, None, Some(true)).unwrap();
        assert_eq!(updated.name, "Bob Martinez");
        assert_eq!(updated.role, UserRole::User);
        assert!(updated.disabled);

        let renamed = repo.update(&user.id, Some("Bob M."), Some(UserRole::Viewer), None).unwrap();
        assert_eq!(renamed.name, "Bob M.");
        assert_eq!(renamed.role, UserRole::Viewer);
        assert!(renamed.disabled);
    }

    #[test]
    fn update_nonexistent_fails() {
        let repo = UserRepo::new(test_db());
        let result = repo.update(&UserId::from_raw("user_missing"), Some("x"), None, None);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn any_reflects_population() {
        let repo = UserRepo::new(test_db());
        assert!(!repo.any().unwrap());
        repo.create("Observer", UserRole::Viewer, false).unwrap();
        assert!(repo.any().unwrap());
    }
}
