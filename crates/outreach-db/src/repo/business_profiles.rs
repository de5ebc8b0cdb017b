use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::BusinessProfile;

fn csv_field(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<BusinessProfile> {
    Ok(BusinessProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        ideal_customer: row.get(4)?,
        target_industries: csv_field(row, 5)?,
        target_company_sizes: csv_field(row, 6)?,
        target_job_titles: csv_field(row, 7)?,
        target_locations: csv_field(row, 8)?,
        value_proposition: row.get(9)?,
        key_benefits: csv_field(row, 10)?,
        sender_name: row.get(11)?,
        sender_role: row.get(12)?,
        sender_company: row.get(13)?,
        sender_context: row.get(14)?,
        is_default: row.get::<_, i64>(15)? != 0,
    })
}

const SELECT: &str = "SELECT id, user_id, name, description, ideal_customer, target_industries, \
     target_company_sizes, target_job_titles, target_locations, value_proposition, \
     key_benefits, sender_name, sender_role, sender_company, sender_context, is_default \
     FROM business_profiles";

pub fn get(conn: &Connection, id: &str) -> Result<Option<BusinessProfile>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_profile) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The single profile marked `is_default` for a user, if any — operations
/// that require a profile fail when this returns `None`.
pub fn get_default_for_user(conn: &Connection, user_id: &str) -> Result<Option<BusinessProfile>> {
    let mut stmt =
        conn.prepare(&format!("{SELECT} WHERE user_id = ?1 AND is_default = 1 LIMIT 1"))?;
    match stmt.query_row(params![user_id], row_to_profile) {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
