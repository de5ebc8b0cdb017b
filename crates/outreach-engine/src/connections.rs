//! Connection-acceptance detection (P2). Classic reply detection (P3) lives
//! in [`crate::classic::detect_replies`]; pipeline reply detection and time
//! triggers (P4) live in [`crate::pipeline`].

use chrono::{DateTime, Utc};
use outreach_core::config::OutreachConfig;
use outreach_db::repo::{enrollments, leads, sequence_steps};
use outreach_db::types::{EnrollmentStatus, Lead, LeadStatus, SequenceEnrollment};
use outreach_lm::provider::LlmProvider;
use outreach_messaging::types::Chat;
use outreach_messaging::{extract_provider_id, ResponseCache};
use rusqlite::Connection;
use tracing::info;

use crate::classic::bump_sequence;
use crate::context::{get_chats_cached, resolve_owning_user, MessagingClientFactory};
use crate::error::Result;
use crate::pipeline;

/// Scans classic and pipeline enrollments awaiting LinkedIn acceptance and
/// matches each lead's extracted provider handle against its owning user's
/// chat list, case-insensitively. On a match the classic
/// enrollment advances to its follow-up step; the pipeline enrollment enters
/// APERTURA and sends its opening message synchronously if working hours
/// allow, otherwise defers to the deferred-APERTURA time trigger (P4).
pub async fn detect_connection_changes(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut accepted = 0usize;

    for enrollment in enrollments::list_classic_awaiting_acceptance(conn)? {
        if accept_if_connected(conn, factory, cache, enrollment, now, Mode::Classic, lm, config).await? {
            accepted += 1;
        }
    }
    for enrollment in enrollments::list_pipeline_awaiting_acceptance(conn)? {
        if accept_if_connected(conn, factory, cache, enrollment, now, Mode::Pipeline, lm, config).await? {
            accepted += 1;
        }
    }

    Ok(accepted)
}

enum Mode {
    Classic,
    Pipeline,
}

async fn accept_if_connected(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    cache: &ResponseCache,
    mut enrollment: SequenceEnrollment,
    now: DateTime<Utc>,
    mode: Mode,
    lm: &dyn LlmProvider,
    config: &OutreachConfig,
) -> Result<bool> {
    let Some(mut lead) = leads::get(conn, &enrollment.lead_id)? else {
        return Ok(false);
    };
    if lead.external_chat_id.is_some() {
        return Ok(false); // already connected from an earlier pass
    }
    let Some(profile_url) = lead.external_profile_url.clone() else {
        return Ok(false);
    };
    let Some(provider_id) = extract_provider_id(&profile_url) else {
        return Ok(false);
    };
    let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
        return Ok(false);
    };

    let messaging = factory.client_for_user(conn, &user_id)?;
    let chats = get_chats_cached(messaging.as_ref(), cache, &user_id, now).await?;
    let Some(chat) = find_matching_chat(&chats, &provider_id) else {
        return Ok(false);
    };

    lead.external_chat_id = Some(chat.id.clone());
    lead.status = LeadStatus::Connected;
    lead.connected_at = Some(now);
    leads::update(conn, &lead)?;

    match mode {
        Mode::Classic => advance_classic_past_acceptance(conn, &mut enrollment, &lead, now)?,
        Mode::Pipeline => {
            pipeline::enter_apertura(conn, &mut enrollment, &lead, messaging.as_ref(), cache, lm, config, now).await?;
        }
    }

    info!(lead_id = %lead.id, chat_id = %chat.id, "connection accepted");
    Ok(true)
}

fn find_matching_chat<'a>(chats: &'a [Chat], provider_id: &str) -> Option<&'a Chat> {
    chats.iter().find(|c| {
        c.attendee_provider_id
            .as_deref()
            .map(|id| id.eq_ignore_ascii_case(provider_id))
            .unwrap_or(false)
    })
}

fn advance_classic_past_acceptance(
    conn: &Connection,
    enrollment: &mut SequenceEnrollment,
    lead: &Lead,
    now: DateTime<Utc>,
) -> Result<()> {
    let next_order = enrollment.current_step_order + 1;
    if let Some(next_step) = sequence_steps::get_step(conn, &enrollment.sequence_id, next_order)? {
        enrollment.current_step_order = next_order;
        enrollment.next_step_due_at = Some(now + chrono::Duration::days(next_step.delay_days as i64));
        enrollments::update(conn, enrollment)?;
    } else {
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.completed_at = Some(now);
        enrollment.next_step_due_at = None;
        enrollments::update(conn, enrollment)?;

        let mut lead = lead.clone();
        lead.active_sequence_id = None;
        leads::update(conn, &lead)?;

        bump_sequence(conn, &enrollment.sequence_id, |seq| {
            seq.completed_count += 1;
            seq.active_count = seq.active_count.saturating_sub(1);
        })?;
    }
    Ok(())
}
