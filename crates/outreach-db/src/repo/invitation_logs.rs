use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::InvitationLog;

/// Append-only — there is no update/delete. Written regardless of whether
/// the send succeeded: the log is the precise record,
/// enrollment state only advances on success.
pub fn insert(
    conn: &Connection,
    user_id: &str,
    lead_id: &str,
    campaign_id: Option<&str>,
    success: bool,
    message_preview: &str,
    status_code: Option<i32>,
    error: Option<&str>,
) -> Result<InvitationLog> {
    let log = InvitationLog {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        lead_id: lead_id.to_string(),
        campaign_id: campaign_id.map(String::from),
        success,
        message_preview: message_preview.to_string(),
        status_code,
        error: error.map(String::from),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO invitation_logs
            (id, user_id, lead_id, campaign_id, success, message_preview, status_code, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            log.id,
            log.user_id,
            log.lead_id,
            log.campaign_id,
            log.success as i64,
            log.message_preview,
            log.status_code,
            log.error,
            log.created_at.to_rfc3339(),
        ],
    )?;
    Ok(log)
}
