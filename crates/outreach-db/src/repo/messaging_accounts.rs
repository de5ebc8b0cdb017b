use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;
use std::str::FromStr;

use crate::error::Result;
use crate::types::{ConnectionState, MessagingAccount};

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessagingAccount> {
    Ok(MessagingAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        external_account_id: row.get(2)?,
        connected: row.get::<_, i64>(3)? != 0,
        connection_state: ConnectionState::from_str(&row.get::<_, String>(4)?)
            .unwrap_or_default(),
        pending_checkpoint_type: row.get(5)?,
        created_at: super::parse_datetime(&row.get::<_, String>(6)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(7)?),
    })
}

const SELECT: &str = "SELECT id, user_id, external_account_id, connected, connection_state, \
     pending_checkpoint_type, created_at, updated_at FROM messaging_accounts";

pub fn get_by_user(conn: &Connection, user_id: &str) -> Result<Option<MessagingAccount>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE user_id = ?1"))?;
    match stmt.query_row(params![user_id], row_to_account) {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert(
    conn: &Connection,
    user_id: &str,
    external_account_id: &str,
    connected: bool,
    connection_state: ConnectionState,
) -> Result<MessagingAccount> {
    let now = Utc::now();
    let existing = get_by_user(conn, user_id)?;
    let account = MessagingAccount {
        id: existing.as_ref().map(|a| a.id.clone()).unwrap_or_else(|| Uuid::now_v7().to_string()),
        user_id: user_id.to_string(),
        external_account_id: external_account_id.to_string(),
        connected,
        connection_state,
        pending_checkpoint_type: None,
        created_at: existing.map(|a| a.created_at).unwrap_or(now),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO messaging_accounts
            (id, user_id, external_account_id, connected, connection_state, pending_checkpoint_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(user_id) DO UPDATE SET
            external_account_id = excluded.external_account_id,
            connected = excluded.connected,
            connection_state = excluded.connection_state,
            updated_at = excluded.updated_at",
        params![
            account.id,
            account.user_id,
            account.external_account_id,
            account.connected as i64,
            account.connection_state.to_string(),
            account.pending_checkpoint_type,
            account.created_at.to_rfc3339(),
            account.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(account)
}
