use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

use crate::error::Result;
use crate::types::{MessageStrategy, Sequence, SequenceMode, SequenceStatus};

fn row_to_sequence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sequence> {
    Ok(Sequence {
        id: row.get(0)?,
        name: row.get(1)?,
        status: SequenceStatus::from_str(&row.get::<_, String>(2)?).unwrap_or_default(),
        mode: SequenceMode::from_str(&row.get::<_, String>(3)?).unwrap_or(SequenceMode::Classic),
        business_profile_id: row.get(4)?,
        message_strategy: MessageStrategy::from_str(&row.get::<_, String>(5)?)
            .unwrap_or(MessageStrategy::Hybrid),
        enrolled_count: row.get(6)?,
        active_count: row.get(7)?,
        replied_count: row.get(8)?,
        completed_count: row.get(9)?,
        meeting_count: row.get(10)?,
        parked_count: row.get(11)?,
        created_at: super::parse_datetime(&row.get::<_, String>(12)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(13)?),
    })
}

const SELECT: &str = "SELECT id, name, status, mode, business_profile_id, message_strategy, \
     enrolled_count, active_count, replied_count, completed_count, meeting_count, \
     parked_count, created_at, updated_at FROM sequences";

pub fn get(conn: &Connection, id: &str) -> Result<Option<Sequence>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    stmt.query_row(params![id], row_to_sequence)
        .optional()
        .map_err(Into::into)
}

pub fn update_counts(conn: &Connection, seq: &Sequence) -> Result<()> {
    conn.execute(
        "UPDATE sequences SET
            status = ?2, enrolled_count = ?3, active_count = ?4, replied_count = ?5,
            completed_count = ?6, meeting_count = ?7, parked_count = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            seq.id,
            seq.status.to_string(),
            seq.enrolled_count,
            seq.active_count,
            seq.replied_count,
            seq.completed_count,
            seq.meeting_count,
            seq.parked_count,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}
