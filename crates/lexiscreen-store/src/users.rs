use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lexiscreen_core::ids::UserId;
use lexiscreen_core::record::Role;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user. Emails are unique; a duplicate reports Conflict.
    #[instrument(skip(self))]
    pub fn create(&self, name: &str, email: &str, role: Role) -> Result<UserRow, StoreError> {
        let id = UserId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), name, email, role.to_string(), now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("user with email {email} already exists"))
                }
                other => StoreError::from(other),
            })?;

            Ok(UserRow {
                id: id.clone(),
                name: name.to_string(),
                email: email.to_string(),
                role,
                created_at: now.clone(),
            })
        })
    }

    /// Get a user by ID.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, role, created_at FROM users WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user {id}"))),
            }
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    let role_str: String = row_helpers::get(row, 3, "users", "role")?;

    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        name: row_helpers::get(row, 1, "users", "name")?,
        email: row_helpers::get(row, 2, "users", "email")?,
        role: row_helpers::parse_enum(&role_str, "users", "role")?,
        created_at: row_helpers::get(row, 4, "users", "created_at")?,
    })
}
