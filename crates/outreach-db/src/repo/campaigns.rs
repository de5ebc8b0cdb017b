use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::Campaign;

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        business_profile_id: row.get(3)?,
        total_leads: row.get(4)?,
        verified_leads: row.get(5)?,
        contacted_leads: row.get(6)?,
        created_at: super::parse_datetime(&row.get::<_, String>(7)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(8)?),
    })
}

const SELECT: &str = "SELECT id, name, description, business_profile_id, total_leads, \
     verified_leads, contacted_leads, created_at, updated_at FROM campaigns";

pub fn get(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_campaign) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn increment_contacted(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE campaigns SET contacted_leads = contacted_leads + 1, updated_at = ?2 WHERE id = ?1",
        params![id, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
