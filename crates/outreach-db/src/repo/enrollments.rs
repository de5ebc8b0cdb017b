use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{EnrollmentStatus, PhaseAnalysis, PipelinePhase, SequenceEnrollment};

fn row_to_enrollment(row: &rusqlite::Row<'_>) -> rusqlite::Result<SequenceEnrollment> {
    let messages_sent_raw: String = row.get(7)?;
    let phase_analysis_raw: Option<String> = row.get(16)?;
    Ok(SequenceEnrollment {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        sequence_id: row.get(2)?,
        status: EnrollmentStatus::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(EnrollmentStatus::Active),
        current_step_order: row.get(4)?,
        next_step_due_at: row
            .get::<_, Option<String>>(5)?
            .map(|s| super::parse_datetime(&s)),
        last_step_completed_at: row
            .get::<_, Option<String>>(6)?
            .map(|s| super::parse_datetime(&s)),
        messages_sent: serde_json::from_str(&messages_sent_raw).unwrap_or_default(),
        failed_reason: row.get(8)?,
        consecutive_failures: row.get(9)?,
        enrolled_at: super::parse_datetime(&row.get::<_, String>(10)?),
        completed_at: row
            .get::<_, Option<String>>(11)?
            .map(|s| super::parse_datetime(&s)),
        current_phase: row
            .get::<_, Option<String>>(12)?
            .and_then(|s| PipelinePhase::from_str(&s).ok()),
        phase_entered_at: row
            .get::<_, Option<String>>(13)?
            .map(|s| super::parse_datetime(&s)),
        last_response_at: row
            .get::<_, Option<String>>(14)?
            .map(|s| super::parse_datetime(&s)),
        last_response_text: row.get(15)?,
        phase_analysis: phase_analysis_raw.and_then(|s| serde_json::from_str(&s).ok()),
        messages_in_phase: row.get(17)?,
        nurture_count: row.get(18)?,
        reactivation_count: row.get(19)?,
        total_messages_sent: row.get(20)?,
    })
}

const SELECT: &str = "SELECT id, lead_id, sequence_id, status, current_step_order, \
     next_step_due_at, last_step_completed_at, messages_sent, failed_reason, \
     consecutive_failures, enrolled_at, completed_at, current_phase, phase_entered_at, \
     last_response_at, last_response_text, phase_analysis, messages_in_phase, \
     nurture_count, reactivation_count, total_messages_sent FROM sequence_enrollments";

pub fn get(conn: &Connection, id: &str) -> Result<Option<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE id = ?1"))?;
    stmt.query_row(params![id], row_to_enrollment)
        .optional()
        .map_err(Into::into)
}

pub fn get_active_for_lead(conn: &Connection, lead_id: &str) -> Result<Option<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!("{SELECT} WHERE lead_id = ?1 AND status = 'active'"))?;
    stmt.query_row(params![lead_id], row_to_enrollment)
        .optional()
        .map_err(Into::into)
}

/// Enrolls one lead into one sequence. Returns the existing
/// enrollment id unmodified (and the caller counts it as skipped) if the
/// unique `(lead_id, sequence_id)` constraint would be violated, or if the
/// lead is already in a *different* active enrollment.
pub fn enroll(conn: &Connection, lead_id: &str, sequence_id: &str) -> Result<SequenceEnrollment> {
    if let Some(active) = get_active_for_lead(conn, lead_id)? {
        if active.sequence_id == sequence_id {
            return Ok(active);
        }
        return Err(DbError::AlreadyActivelyEnrolled {
            lead_id: lead_id.to_string(),
        });
    }

    let now = Utc::now();
    let enrollment = SequenceEnrollment {
        id: Uuid::now_v7().to_string(),
        lead_id: lead_id.to_string(),
        sequence_id: sequence_id.to_string(),
        status: EnrollmentStatus::Active,
        current_step_order: 1,
        next_step_due_at: Some(now),
        last_step_completed_at: None,
        messages_sent: vec![],
        failed_reason: None,
        consecutive_failures: 0,
        enrolled_at: now,
        completed_at: None,
        current_phase: None,
        phase_entered_at: None,
        last_response_at: None,
        last_response_text: None,
        phase_analysis: None,
        messages_in_phase: 0,
        nurture_count: 0,
        reactivation_count: 0,
        total_messages_sent: 0,
    };
    insert(conn, &enrollment)?;
    conn.execute(
        "UPDATE leads SET active_sequence_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![lead_id, enrollment.id, now.to_rfc3339()],
    )?;
    Ok(enrollment)
}

/// Flips the enrollment to `withdrawn` and clears the lead's
/// `active_sequence_id` link.
pub fn unenroll(conn: &Connection, enrollment_id: &str) -> Result<()> {
    let Some(mut enrollment) = get(conn, enrollment_id)? else {
        return Err(DbError::NotFound(enrollment_id.to_string()));
    };
    enrollment.status = EnrollmentStatus::Withdrawn;
    update(conn, &enrollment)?;
    conn.execute(
        "UPDATE leads SET active_sequence_id = NULL, updated_at = ?2 WHERE id = ?1",
        params![enrollment.lead_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn insert(conn: &Connection, e: &SequenceEnrollment) -> Result<()> {
    conn.execute(
        "INSERT INTO sequence_enrollments
            (id, lead_id, sequence_id, status, current_step_order, next_step_due_at,
             last_step_completed_at, messages_sent, failed_reason, consecutive_failures,
             enrolled_at, completed_at, current_phase, phase_entered_at, last_response_at,
             last_response_text, phase_analysis, messages_in_phase, nurture_count,
             reactivation_count, total_messages_sent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        enrollment_params(e)?,
    )?;
    Ok(())
}

pub fn update(conn: &Connection, e: &SequenceEnrollment) -> Result<()> {
    conn.execute(
        "UPDATE sequence_enrollments SET
            status = ?4, current_step_order = ?5, next_step_due_at = ?6,
            last_step_completed_at = ?7, messages_sent = ?8, failed_reason = ?9,
            consecutive_failures = ?10, completed_at = ?12, current_phase = ?13,
            phase_entered_at = ?14, last_response_at = ?15, last_response_text = ?16,
            phase_analysis = ?17, messages_in_phase = ?18, nurture_count = ?19,
            reactivation_count = ?20, total_messages_sent = ?21
         WHERE id = ?1",
        enrollment_params(e)?,
    )?;
    Ok(())
}

fn enrollment_params(
    e: &SequenceEnrollment,
) -> Result<Vec<Box<dyn rusqlite::ToSql>>> {
    let params: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(e.id.clone()),
        Box::new(e.lead_id.clone()),
        Box::new(e.sequence_id.clone()),
        Box::new(e.status.to_string()),
        Box::new(e.current_step_order),
        Box::new(e.next_step_due_at.map(|d| d.to_rfc3339())),
        Box::new(e.last_step_completed_at.map(|d| d.to_rfc3339())),
        Box::new(serde_json::to_string(&e.messages_sent)?),
        Box::new(e.failed_reason.clone()),
        Box::new(e.consecutive_failures),
        Box::new(e.enrolled_at.to_rfc3339()),
        Box::new(e.completed_at.map(|d| d.to_rfc3339())),
        Box::new(e.current_phase.map(|p| p.to_string())),
        Box::new(e.phase_entered_at.map(|d| d.to_rfc3339())),
        Box::new(e.last_response_at.map(|d| d.to_rfc3339())),
        Box::new(e.last_response_text.clone()),
        Box::new(
            e.phase_analysis
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ),
        Box::new(e.messages_in_phase),
        Box::new(e.nurture_count),
        Box::new(e.reactivation_count),
        Box::new(e.total_messages_sent),
    ];
    Ok(params)
}

/// Enrollments whose connection-request step (order 1) is due — the P1
/// invitation-sending pass, scoped to one user via the
/// campaign -> business_profile -> user_id chain. Ordered FIFO by `enrolled_at`.
pub fn list_invitation_due(
    conn: &Connection,
    user_id: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN leads l ON l.id = se.lead_id
            LEFT JOIN campaigns c ON c.id = l.campaign_id
            LEFT JOIN business_profiles bp ON bp.id = c.business_profile_id
            JOIN sequence_steps step1
                ON step1.sequence_id = se.sequence_id AND step1.step_order = 1
            WHERE se.status = 'active'
              AND se.current_step_order = 1
              AND step1.step_type = 'connection_request'
              AND (se.next_step_due_at IS NULL OR se.next_step_due_at <= ?2)
              AND bp.user_id = ?1
         )
         ORDER BY enrolled_at
         LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![user_id, now.to_rfc3339(), limit as i64],
        row_to_enrollment,
    )?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Classic enrollments with a due follow-up step (order > 1) — does not
/// filter by user since the classic engine resolves the owning user per
/// enrollment when it needs automation settings.
pub fn list_classic_followup_due(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN sequences s ON s.id = se.sequence_id
            WHERE se.status = 'active'
              AND s.mode = 'classic'
              AND se.current_step_order > 1
              AND se.next_step_due_at IS NOT NULL
              AND se.next_step_due_at <= ?1
         )
         ORDER BY next_step_due_at, id
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![now.to_rfc3339(), limit as i64], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Classic enrollments awaiting connection acceptance (P2 scan input).
pub fn list_classic_awaiting_acceptance(conn: &Connection) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN sequences s ON s.id = se.sequence_id
            WHERE se.status = 'active'
              AND s.mode = 'classic'
              AND se.current_step_order = 1
              AND se.next_step_due_at IS NULL
         )"
    ))?;
    let rows = stmt.query_map([], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Pipeline enrollments awaiting connection acceptance (P2 scan input).
pub fn list_pipeline_awaiting_acceptance(conn: &Connection) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN sequences s ON s.id = se.sequence_id
            WHERE se.status = 'active'
              AND s.mode = 'smart_pipeline'
              AND se.current_phase IS NULL
         )"
    ))?;
    let rows = stmt.query_map([], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Active classic enrollments, for the P3 reply-detection scan.
pub fn list_classic_active(conn: &Connection) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN sequences s ON s.id = se.sequence_id
            WHERE se.status = 'active' AND s.mode = 'classic'
         )"
    ))?;
    let rows = stmt.query_map([], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Active pipeline enrollments with a phase set, for the P4 reply-detection
/// scan.
pub fn list_pipeline_active(conn: &Connection) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT}
         WHERE id IN (
            SELECT se.id FROM sequence_enrollments se
            JOIN sequences s ON s.id = se.sequence_id
            WHERE se.status = 'active' AND s.mode = 'smart_pipeline'
              AND se.current_phase IS NOT NULL
         )"
    ))?;
    let rows = stmt.query_map([], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// `current_phase = NURTURE AND next_step_due_at <= now`.
pub fn list_nurture_due(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE current_phase = 'nurture' AND next_step_due_at IS NOT NULL \
         AND next_step_due_at <= ?1 ORDER BY next_step_due_at LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![now.to_rfc3339(), limit as i64], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// `current_phase IN {apertura, calificacion, valor}` candidates for the
/// silent-in-progression time trigger; the 30-day silence threshold itself
/// is evaluated by the caller against `phase_entered_at`/`last_response_at`
/// since that comparison needs no extra index.
pub fn list_in_progression(conn: &Connection, limit: usize) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE current_phase IN ('apertura', 'calificacion', 'valor') \
         ORDER BY phase_entered_at LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// `current_phase = APERTURA AND messages_in_phase = 0 AND next_step_due_at <= now`
/// — the deferred-APERTURA time trigger.
pub fn list_deferred_apertura(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<SequenceEnrollment>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT} WHERE current_phase = 'apertura' AND messages_in_phase = 0 \
         AND next_step_due_at IS NOT NULL AND next_step_due_at <= ?1 \
         ORDER BY next_step_due_at LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![now.to_rfc3339(), limit as i64], row_to_enrollment)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}
