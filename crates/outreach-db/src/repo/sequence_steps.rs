use rusqlite::{params, Connection};
use std::str::FromStr;

use crate::error::Result;
use crate::types::{SequenceStep, StepType};

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<SequenceStep> {
    Ok(SequenceStep {
        id: row.get(0)?,
        sequence_id: row.get(1)?,
        step_order: row.get(2)?,
        step_type: StepType::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(StepType::ConnectionRequest),
        delay_days: row.get(4)?,
        prompt_context: row.get(5)?,
    })
}

const SELECT: &str =
    "SELECT id, sequence_id, step_order, step_type, delay_days, prompt_context FROM sequence_steps";

/// Ordered 1..N, contiguous — callers index by
/// `step_order` directly against this vec.
pub fn list_for_sequence(conn: &Connection, sequence_id: &str) -> Result<Vec<SequenceStep>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE sequence_id = ?1 ORDER BY step_order"))?;
    let rows = stmt.query_map(params![sequence_id], row_to_step)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn get_step(
    conn: &Connection,
    sequence_id: &str,
    step_order: u32,
) -> Result<Option<SequenceStep>> {
    let mut stmt =
        conn.prepare(&format!("{SELECT} WHERE sequence_id = ?1 AND step_order = ?2"))?;
    match stmt.query_row(params![sequence_id, step_order], row_to_step) {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
