use chrono::{NaiveDate, Utc};
use outreach_core::config::AutomationDefaultsConfig;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::types::AutomationSettings;

fn row_to_settings(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutomationSettings> {
    let target_statuses_raw: String = row.get(12)?;
    Ok(AutomationSettings {
        user_id: row.get(0)?,
        enabled: row.get::<_, i64>(1)? != 0,
        work_start_hour: row.get(2)?,
        work_start_minute: row.get(3)?,
        work_end_hour: row.get(4)?,
        work_end_minute: row.get(5)?,
        working_days: row.get(6)?,
        timezone: row.get(7)?,
        daily_limit: row.get(8)?,
        min_delay_seconds: row.get(9)?,
        max_delay_seconds: row.get(10)?,
        min_lead_score: row.get(11)?,
        target_statuses: serde_json::from_str(&target_statuses_raw).unwrap_or_default(),
        target_campaign_id: row.get(13)?,
        invitations_sent_today: row.get(14)?,
        last_invitation_at: row
            .get::<_, Option<String>>(15)?
            .map(|s| super::parse_datetime(&s)),
        last_reset_date: row
            .get::<_, Option<String>>(16)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
    })
}

const SELECT: &str =
    "SELECT user_id, enabled, work_start_hour, work_start_minute, work_end_hour, \
     work_end_minute, working_days, timezone, daily_limit, min_delay_seconds, \
     max_delay_seconds, min_lead_score, target_statuses, target_campaign_id, \
     invitations_sent_today, last_invitation_at, last_reset_date FROM automation_settings";

pub fn get(conn: &Connection, user_id: &str) -> Result<Option<AutomationSettings>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE user_id = ?1"))?;
    stmt.query_row(params![user_id], row_to_settings)
        .optional()
        .map_err(Into::into)
}

/// Read a user's settings, creating a row from the process defaults on
/// first access (mirrors the reference scheduler, which always has a
/// settings row to read from by the time automation runs).
pub fn get_or_create_default(
    conn: &Connection,
    user_id: &str,
    defaults: &AutomationDefaultsConfig,
) -> Result<AutomationSettings> {
    if let Some(existing) = get(conn, user_id)? {
        return Ok(existing);
    }
    let settings = AutomationSettings {
        user_id: user_id.to_string(),
        enabled: false,
        work_start_hour: defaults.work_start_hour,
        work_start_minute: defaults.work_start_minute,
        work_end_hour: defaults.work_end_hour,
        work_end_minute: defaults.work_end_minute,
        working_days: defaults.working_days,
        timezone: defaults.timezone.clone(),
        daily_limit: defaults.daily_limit.min(outreach_core::config::DEFAULT_DAILY_LIMIT),
        min_delay_seconds: defaults.min_delay_seconds,
        max_delay_seconds: defaults.max_delay_seconds,
        min_lead_score: None,
        target_statuses: vec![],
        target_campaign_id: None,
        invitations_sent_today: 0,
        last_invitation_at: None,
        last_reset_date: None,
    };
    insert(conn, &settings)?;
    Ok(settings)
}

fn insert(conn: &Connection, s: &AutomationSettings) -> Result<()> {
    conn.execute(
        "INSERT INTO automation_settings
            (user_id, enabled, work_start_hour, work_start_minute, work_end_hour,
             work_end_minute, working_days, timezone, daily_limit, min_delay_seconds,
             max_delay_seconds, min_lead_score, target_statuses, target_campaign_id,
             invitations_sent_today, last_invitation_at, last_reset_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            s.user_id,
            s.enabled as i64,
            s.work_start_hour,
            s.work_start_minute,
            s.work_end_hour,
            s.work_end_minute,
            s.working_days,
            s.timezone,
            s.daily_limit,
            s.min_delay_seconds,
            s.max_delay_seconds,
            s.min_lead_score,
            serde_json::to_string(&s.target_statuses)?,
            s.target_campaign_id,
            s.invitations_sent_today,
            s.last_invitation_at.map(|d| d.to_rfc3339()),
            s.last_reset_date.map(|d| d.format("%Y-%m-%d").to_string()),
        ],
    )?;
    Ok(())
}

pub fn update_counters(conn: &Connection, s: &AutomationSettings) -> Result<()> {
    conn.execute(
        "UPDATE automation_settings SET
            invitations_sent_today = ?2, last_invitation_at = ?3, last_reset_date = ?4
         WHERE user_id = ?1",
        params![
            s.user_id,
            s.invitations_sent_today,
            s.last_invitation_at.map(|d| d.to_rfc3339()),
            s.last_reset_date.map(|d| d.format("%Y-%m-%d").to_string()),
        ],
    )?;
    Ok(())
}

/// `now` is injected so callers can test with a fixed clock rather than depending on the wall clock.
pub fn reset_counter_if_new_day(
    conn: &Connection,
    s: &mut AutomationSettings,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let today = now.date_naive();
    if s.last_reset_date.map(|d| d < today).unwrap_or(true) {
        s.invitations_sent_today = 0;
        s.last_reset_date = Some(today);
        update_counters(conn, s)?;
    }
    Ok(())
}
