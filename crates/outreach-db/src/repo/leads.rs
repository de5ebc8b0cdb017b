use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

use crate::error::Result;
use crate::types::{Lead, LeadStatus, ScoreLabel};

fn row_to_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        full_name: row.get(4)?,
        email: row.get(5)?,
        email_verified: row.get::<_, i64>(6)? != 0,
        job_title: row.get(7)?,
        headline: row.get(8)?,
        company_name: row.get(9)?,
        company_industry: row.get(10)?,
        company_size: row.get(11)?,
        city: row.get(12)?,
        country: row.get(13)?,
        external_profile_url: row.get(14)?,
        external_chat_id: row.get(15)?,
        status: row
            .get::<_, Option<String>>(16)?
            .and_then(|s| LeadStatus::from_str(&s).ok())
            .unwrap_or_default(),
        score: row.get(17)?,
        score_label: row
            .get::<_, Option<String>>(18)?
            .and_then(|s| ScoreLabel::from_str(&s).ok()),
        score_reason: row.get(19)?,
        connection_message: row.get(20)?,
        connection_sent_at: super::parse_datetime_opt(row.get(21)?),
        connected_at: super::parse_datetime_opt(row.get(22)?),
        last_message_at: super::parse_datetime_opt(row.get(23)?),
        active_sequence_id: row.get(24)?,
        created_at: super::parse_datetime(&row.get::<_, String>(25)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(26)?),
    })
}

const SELECT: &str = "SELECT id, campaign_id, first_name, last_name, full_name, email, \
     email_verified, job_title, headline, company_name, company_industry, company_size, \
     city, country, external_profile_url, external_chat_id, status, score, score_label, \
     score_reason, connection_message, connection_sent_at, connected_at, last_message_at, \
     active_sequence_id, created_at, updated_at FROM leads";

pub fn get(conn: &Connection, id: &str) -> Result<Option<Lead>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    stmt.query_row(params![id], row_to_lead)
        .optional()
        .map_err(Into::into)
}

/// Used by connection-acceptance detection: the lead whose extracted
/// provider handle matches a handle seen in the account's chat list
/// (case-insensitive).
pub fn list_awaiting_acceptance(conn: &Connection) -> Result<Vec<Lead>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE status = 'invitation_sent' AND external_chat_id IS NULL ORDER BY connection_sent_at"
    ))?;
    let rows = stmt.query_map([], row_to_lead)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn update(conn: &Connection, lead: &Lead) -> Result<()> {
    conn.execute(
        "UPDATE leads SET
            campaign_id = ?2, first_name = ?3, last_name = ?4, full_name = ?5, email = ?6,
            email_verified = ?7, job_title = ?8, headline = ?9, company_name = ?10,
            company_industry = ?11, company_size = ?12, city = ?13, country = ?14,
            external_profile_url = ?15, external_chat_id = ?16, status = ?17, score = ?18,
            score_label = ?19, score_reason = ?20, connection_message = ?21,
            connection_sent_at = ?22, connected_at = ?23, last_message_at = ?24,
            active_sequence_id = ?25, updated_at = ?26
         WHERE id = ?1",
        params![
            lead.id,
            lead.campaign_id,
            lead.first_name,
            lead.last_name,
            lead.full_name,
            lead.email,
            lead.email_verified as i64,
            lead.job_title,
            lead.headline,
            lead.company_name,
            lead.company_industry,
            lead.company_size,
            lead.city,
            lead.country,
            lead.external_profile_url,
            lead.external_chat_id,
            lead.status.to_string(),
            lead.score,
            lead.score_label.map(|l| l.to_string()),
            lead.score_reason,
            lead.connection_message,
            lead.connection_sent_at.map(|d| d.to_rfc3339()),
            lead.connected_at.map(|d| d.to_rfc3339()),
            lead.last_message_at.map(|d| d.to_rfc3339()),
            lead.active_sequence_id,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}
