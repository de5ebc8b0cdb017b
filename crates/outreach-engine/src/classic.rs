//! Classic sequence engine: fixed connection-request-then-follow-up
//! progression.

use chrono::{DateTime, Utc};
use outreach_core::config::OutreachConfig;
use outreach_db::repo::{
    automation_settings, business_profiles, campaigns, enrollments, invitation_logs, leads,
    sequence_steps, sequences,
};
use outreach_db::types::{AutomationSettings, EnrollmentStatus, Lead, LeadStatus, Sequence, SequenceEnrollment};
use outreach_gate::{can_send_invitation, in_working_hours};
use outreach_lm::analyzer::{generate_connection_message, generate_follow_up};
use outreach_lm::provider::LlmProvider;
use outreach_messaging::{extract_provider_id, MessagingError, MessagingProvider, ResponseCache};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::context::{get_chat_messages_cached, lead_context, resolve_owning_user, sender_context, MessagingClientFactory};
use crate::error::Result;

/// Sends the due connection-request step for one user's enrollments,
/// stopping early once the daily quota or working-hours window closes —
/// both are rechecked before every send since the batch can straddle the
/// boundary.
pub async fn process_due_invitations(
    conn: &Connection,
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    config: &OutreachConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut settings = automation_settings::get_or_create_default(conn, user_id, &config.automation)?;
    automation_settings::reset_counter_if_new_day(conn, &mut settings, now)?;

    if !can_send_invitation(&settings, now) {
        return Ok(0);
    }

    let due = enrollments::list_invitation_due(conn, user_id, now, config.scheduler.max_batch_per_tick)?;
    let mut sent = 0usize;

    for enrollment in due {
        if !can_send_invitation(&settings, now) {
            break;
        }
        if !cache.can_make_api_call(min_api_call_interval(), now) {
            break;
        }
        if execute_connection_request(conn, messaging, cache, lm, &mut settings, enrollment, now).await? {
            sent += 1;
        }
    }

    Ok(sent)
}

fn min_api_call_interval() -> chrono::Duration {
    chrono::Duration::seconds(outreach_core::config::MIN_API_CALL_INTERVAL_SECS)
}

/// Mirrors `_execute_connection_request`: always logs the attempt, advances
/// the enrollment only on success, and fails it outright after
/// `MAX_CONSECUTIVE_FAILURES` transient failures of this same step.
async fn execute_connection_request(
    conn: &Connection,
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    settings: &mut AutomationSettings,
    mut enrollment: SequenceEnrollment,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(mut lead) = leads::get(conn, &enrollment.lead_id)? else {
        return Ok(false);
    };
    let Some(sequence) = sequences::get(conn, &enrollment.sequence_id)? else {
        return Ok(false);
    };

    let Some(profile_url) = lead.external_profile_url.clone() else {
        warn!(lead_id = %lead.id, "missing linkedin profile url, failing enrollment");
        fail_enrollment(conn, &mut enrollment, &mut lead, "missing linkedin profile url")?;
        return Ok(false);
    };
    let Some(provider_id) = extract_provider_id(&profile_url) else {
        warn!(lead_id = %lead.id, %profile_url, "could not extract provider id, failing enrollment");
        fail_enrollment(conn, &mut enrollment, &mut lead, "unrecognized profile url")?;
        return Ok(false);
    };

    let business = sequence
        .business_profile_id
        .as_deref()
        .and_then(|id| business_profiles::get(conn, id).ok().flatten());
    let sender = business.as_ref().map(sender_context).unwrap_or_default();
    let message = generate_connection_message(
        lm,
        &lead_context(&lead),
        &sender,
        &sequence.message_strategy.to_string(),
    )
    .await?;

    cache.record_api_call(now);
    let send_result = messaging.send_invitation(&provider_id, &message).await;
    let (success, status_code, error_text) = match &send_result {
        Ok(()) => (true, None, None),
        Err(e) => (false, status_code_of(e), Some(e.to_string())),
    };

    invitation_logs::insert(
        conn,
        &settings.user_id,
        &lead.id,
        lead.campaign_id.as_deref(),
        success,
        &message,
        status_code,
        error_text.as_deref(),
    )?;

    if success {
        lead.status = LeadStatus::InvitationSent;
        lead.connection_message = Some(message.clone());
        lead.connection_sent_at = Some(now);
        leads::update(conn, &lead)?;

        if let Some(campaign_id) = &lead.campaign_id {
            campaigns::increment_contacted(conn, campaign_id)?;
        }

        settings.invitations_sent_today += 1;
        settings.last_invitation_at = Some(now);
        automation_settings::update_counters(conn, settings)?;

        enrollment.next_step_due_at = None; // wait for connection acceptance
        enrollment.last_step_completed_at = Some(now);
        enrollment.consecutive_failures = 0;
        enrollments::update(conn, &enrollment)?;

        info!(lead_id = %lead.id, "connection request sent");
        Ok(true)
    } else {
        enrollment.consecutive_failures += 1;
        if enrollment.consecutive_failures >= outreach_core::config::MAX_CONSECUTIVE_FAILURES {
            fail_enrollment(conn, &mut enrollment, &mut lead, "too many consecutive send failures")?;
        } else {
            enrollments::update(conn, &enrollment)?;
        }
        warn!(lead_id = %lead.id, error = error_text.as_deref().unwrap_or(""), "connection request failed");
        Ok(false)
    }
}

fn status_code_of(err: &MessagingError) -> Option<i32> {
    match err {
        MessagingError::SendFailed { status, .. } => Some(*status as i32),
        _ => None,
    }
}

fn fail_enrollment(
    conn: &Connection,
    enrollment: &mut SequenceEnrollment,
    lead: &mut Lead,
    reason: &str,
) -> Result<()> {
    enrollment.status = EnrollmentStatus::Failed;
    enrollment.failed_reason = Some(reason.to_string());
    enrollment.completed_at = Some(Utc::now());
    enrollment.next_step_due_at = None;
    enrollments::update(conn, enrollment)?;

    lead.active_sequence_id = None;
    leads::update(conn, lead)?;

    if let Some(mut sequence) = sequences::get(conn, &enrollment.sequence_id)? {
        sequence.active_count = sequence.active_count.saturating_sub(1);
        sequences::update_counts(conn, &sequence)?;
    }
    Ok(())
}

/// Sends the due follow-up step for classic enrollments (`current_step_order
/// > 1`). Ownership and automation settings are resolved per enrollment
/// rather than per a single caller-supplied user, since the due set spans
/// every user with an active classic enrollment.
pub async fn process_due_followups(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let due = enrollments::list_classic_followup_due(conn, now, config.scheduler.max_batch_per_tick)?;
    let mut sent = 0usize;

    for enrollment in due {
        let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
            continue;
        };
        let mut settings = automation_settings::get_or_create_default(conn, &user_id, &config.automation)?;
        automation_settings::reset_counter_if_new_day(conn, &mut settings, now)?;
        if !in_working_hours(&settings, now) {
            continue; // outside working hours, retry next tick
        }

        let Some(lead) = leads::get(conn, &enrollment.lead_id)? else {
            continue;
        };
        if lead.external_chat_id.is_none() {
            continue; // no chat id yet, wait for acceptance scan
        }

        if !cache.can_make_api_call(min_api_call_interval(), now) {
            continue;
        }

        let messaging = factory.client_for_user(conn, &user_id)?;
        if execute_follow_up(conn, messaging.as_ref(), cache, lm, enrollment, lead, now).await? {
            sent += 1;
        }
    }

    Ok(sent)
}

async fn execute_follow_up(
    conn: &Connection,
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    mut enrollment: SequenceEnrollment,
    mut lead: Lead,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(chat_id) = lead.external_chat_id.clone() else {
        return Ok(false);
    };
    let Some(sequence) = sequences::get(conn, &enrollment.sequence_id)? else {
        return Ok(false);
    };
    let Some(step) = sequence_steps::get_step(conn, &sequence.id, enrollment.current_step_order)? else {
        return Ok(false);
    };
    let total_steps = sequence_steps::list_for_sequence(conn, &sequence.id)?.len() as u32;

    let business = sequence
        .business_profile_id
        .as_deref()
        .and_then(|id| business_profiles::get(conn, id).ok().flatten());
    let sender = business.as_ref().map(sender_context).unwrap_or_default();

    let history = get_chat_messages_cached(messaging, cache, &chat_id, 20, now, false)
        .await
        .ok();
    let formatted = history
        .as_ref()
        .map(|m| crate::context::format_conversation(m, 10, "Them"))
        .filter(|s| !s.is_empty());

    let message = generate_follow_up(
        lm,
        &lead_context(&lead),
        &sender,
        step.prompt_context.as_deref(),
        formatted.as_deref(),
        enrollment.current_step_order,
        total_steps,
    )
    .await?;

    cache.record_api_call(now);
    match messaging.send_message(&chat_id, &message).await {
        Ok(()) => {
            enrollment.messages_sent.push(message.clone());
            enrollment.consecutive_failures = 0;
            enrollment.last_step_completed_at = Some(now);
            lead.last_message_at = Some(now);

            let next_order = enrollment.current_step_order + 1;
            if let Some(next_step) = sequence_steps::get_step(conn, &sequence.id, next_order)? {
                enrollment.current_step_order = next_order;
                enrollment.next_step_due_at = Some(now + chrono::Duration::days(next_step.delay_days as i64));
                enrollments::update(conn, &enrollment)?;
                leads::update(conn, &lead)?;
            } else {
                enrollment.status = EnrollmentStatus::Completed;
                enrollment.completed_at = Some(now);
                enrollment.next_step_due_at = None;
                enrollments::update(conn, &enrollment)?;

                lead.active_sequence_id = None;
                leads::update(conn, &lead)?;

                bump_sequence(conn, &sequence.id, |seq| {
                    seq.completed_count += 1;
                    seq.active_count = seq.active_count.saturating_sub(1);
                })?;
            }

            info!(lead_id = %lead.id, step = enrollment.current_step_order, "follow-up sent");
            Ok(true)
        }
        Err(e) => {
            enrollment.consecutive_failures += 1;
            warn!(lead_id = %lead.id, error = %e, "follow-up send failed");
            if enrollment.consecutive_failures >= outreach_core::config::MAX_CONSECUTIVE_FAILURES {
                fail_enrollment(conn, &mut enrollment, &mut lead, "too many consecutive send failures")?;
            } else {
                enrollments::update(conn, &enrollment)?;
            }
            Ok(false)
        }
    }
}

/// Auto-exit on any inbound reply for active classic enrollments
///.
pub async fn detect_replies(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    cache: &ResponseCache,
    now: DateTime<Utc>,
) -> Result<usize> {
    let active = enrollments::list_classic_active(conn)?;
    let mut replied = 0usize;

    for mut enrollment in active {
        let Some(mut lead) = leads::get(conn, &enrollment.lead_id)? else {
            continue;
        };
        let Some(chat_id) = lead.external_chat_id.clone() else {
            continue;
        };
        let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
            continue;
        };
        let messaging = factory.client_for_user(conn, &user_id)?;

        let messages = match get_chat_messages_cached(messaging.as_ref(), cache, &chat_id, 20, now, true).await {
            Ok(m) => m,
            Err(_) => continue,
        };

        let reference = enrollment.last_step_completed_at.unwrap_or(enrollment.enrolled_at);
        let has_reply = messages
            .iter()
            .filter(|m| !m.is_sender)
            .filter_map(|m| m.timestamp.parse::<DateTime<Utc>>().ok())
            .any(|ts| ts > reference);

        if !has_reply {
            continue;
        }

        enrollment.status = EnrollmentStatus::Replied;
        enrollment.completed_at = Some(now);
        enrollment.next_step_due_at = None;
        enrollments::update(conn, &enrollment)?;

        lead.status = LeadStatus::InConversation;
        lead.active_sequence_id = None;
        leads::update(conn, &lead)?;

        bump_sequence(conn, &enrollment.sequence_id, |seq| {
            seq.replied_count += 1;
            seq.active_count = seq.active_count.saturating_sub(1);
        })?;

        info!(lead_id = %lead.id, "reply detected, exiting classic sequence");
        replied += 1;
    }

    Ok(replied)
}

pub(crate) fn bump_sequence(conn: &Connection, sequence_id: &str, f: impl FnOnce(&mut Sequence)) -> Result<()> {
    if let Some(mut seq) = sequences::get(conn, sequence_id)? {
        f(&mut seq);
        sequences::update_counts(conn, &seq)?;
    }
    Ok(())
}
