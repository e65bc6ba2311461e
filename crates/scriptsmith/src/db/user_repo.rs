//! User repository for the `users` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw user row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            role: row.get("role")?,
            password_hash: row.get("password_hash")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a user and returns its assigned id.
pub fn insert(
    db: &Database,
    username: &str,
    role: &str,
    password_hash: &str,
    created_at: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (username, role, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, role, password_hash, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a user by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<UserRow>, DatabaseError> {
    find_one(db, "SELECT * FROM users WHERE id = ?1", params![id])
}

/// Finds a user by username.
pub fn find_by_username(db: &Database, username: &str) -> Result<Option<UserRow>, DatabaseError> {
    find_one(db, "SELECT * FROM users WHERE username = ?1", params![username])
}

fn find_one(
    db: &Database,
    sql: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(args, UserRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all users ordered by id.
pub fn list(db: &Database) -> Result<Vec<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY id")?;
        let rows = stmt
            .query_map([], UserRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a user. History rows owned by the user go with it.
///
/// Returns `false` when no such user existed.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}
