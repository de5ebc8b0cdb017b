use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::User;

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: super::parse_datetime(&row.get::<_, String>(4)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(5)?),
    })
}

const SELECT: &str =
    "SELECT id, email, password_hash, active, created_at, updated_at FROM users";

pub fn create_user(conn: &Connection, email: &str, password_hash: &str) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::now_v7().to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        active: true,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, email, password_hash, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.email,
            user.password_hash,
            user.active as i64,
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All users with `active = 1`, ordered by id — the scheduler iterates this
/// set every P1 tick to run `send_next_invitation` per user.
pub fn list_active_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE active = 1 ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_user)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}
