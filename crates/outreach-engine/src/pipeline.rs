//! Smart pipeline engine: phase-by-phase AI-qualified conversation
//! progression. Connection acceptance (P2) lives in
//! [`crate::connections`]; this module owns everything after a lead enters
//! APERTURA — reply-driven transitions and the three time-based triggers
//! (nurture cadence, reactivation after silence, deferred apertura).

use chrono::{DateTime, Utc};
use outreach_core::config::{
    OutreachConfig, MAX_NURTURE_TOUCHES, MAX_REACTIVATION_ATTEMPTS, NURTURE_MAX_DAYS,
    NURTURE_MIN_DAYS, REACTIVATION_SILENCE_DAYS,
};
use outreach_db::repo::{automation_settings, business_profiles, enrollments, leads, sequences};
use outreach_db::types::{EnrollmentStatus, Lead, LeadStatus, PhaseAnalysis, PipelinePhase, SequenceEnrollment};
use outreach_gate::in_working_hours;
use outreach_lm::analyzer::{analyze_phase_response, generate_phase_message};
use outreach_lm::provider::LlmProvider;
use outreach_lm::types::PhaseAnalysisOutput;
use outreach_messaging::{MessagingProvider, ResponseCache};
use rand::Rng;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::classic::bump_sequence;
use crate::context::{
    get_chat_messages_cached, lead_context, resolve_owning_user, sender_context, MessagingClientFactory,
};
use crate::error::Result;

/// Moves a freshly accepted pipeline enrollment into APERTURA and sends the
/// opening message immediately if the owning user's working-hours window is
/// open; otherwise the message waits for the deferred-APERTURA time trigger
///.
#[allow(clippy::too_many_arguments)]
pub async fn enter_apertura(
    conn: &Connection,
    enrollment: &mut SequenceEnrollment,
    lead: &Lead,
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    enrollment.current_phase = Some(PipelinePhase::Apertura);
    enrollment.phase_entered_at = Some(now);
    enrollment.messages_in_phase = 0;

    if owning_user_in_working_hours(conn, &enrollment.sequence_id, config, now)? {
        if let Err(e) = send_phase_message(conn, enrollment, lead, messaging, cache, lm, now, "", None).await {
            warn!(lead_id = %lead.id, error = %e, "apertura send failed, deferring to next tick");
            enrollment.next_step_due_at = Some(now);
            enrollments::update(conn, enrollment)?;
        }
    } else {
        enrollment.next_step_due_at = Some(now);
        enrollments::update(conn, enrollment)?;
    }
    Ok(())
}

fn owning_user_in_working_hours(
    conn: &Connection,
    sequence_id: &str,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(user_id) = resolve_owning_user(conn, sequence_id)? else {
        return Ok(false);
    };
    let settings = automation_settings::get_or_create_default(conn, &user_id, &config.automation)?;
    Ok(in_working_hours(&settings, now))
}

/// Generates and sends the next message for the enrollment's current phase,
/// then persists the counters. Shared by the opening send, the reply-driven
/// advance branch, and every time-based trigger.
#[allow(clippy::too_many_arguments)]
async fn send_phase_message(
    conn: &Connection,
    enrollment: &mut SequenceEnrollment,
    lead: &Lead,
    messaging: &dyn MessagingProvider,
    cache: &ResponseCache,
    lm: &dyn LlmProvider,
    now: DateTime<Utc>,
    conversation_history: &str,
    suggested_angle: Option<&str>,
) -> Result<()> {
    let Some(chat_id) = lead.external_chat_id.clone() else {
        return Ok(());
    };
    let Some(phase) = enrollment.current_phase else {
        return Ok(());
    };
    let Some(sequence) = sequences::get(conn, &enrollment.sequence_id)? else {
        return Ok(());
    };
    let business = sequence
        .business_profile_id
        .as_deref()
        .and_then(|id| business_profiles::get(conn, id).ok().flatten());
    let sender = business.as_ref().map(sender_context).unwrap_or_default();

    let message = generate_phase_message(
        lm,
        &phase.to_string(),
        &lead_context(lead),
        &sender,
        conversation_history,
        suggested_angle,
        enrollment.messages_in_phase,
    )
    .await?;

    if !cache.can_make_api_call(
        chrono::Duration::seconds(outreach_core::config::MIN_API_CALL_INTERVAL_SECS),
        now,
    ) {
        return Err(crate::error::EngineError::RateLimited(chat_id.clone()));
    }
    cache.record_api_call(now);
    messaging.send_message(&chat_id, &message).await?;

    enrollment.messages_in_phase += 1;
    enrollment.total_messages_sent += 1;
    enrollment.next_step_due_at = None;
    enrollment.last_step_completed_at = Some(now);
    enrollments::update(conn, enrollment)?;

    let mut lead = lead.clone();
    lead.last_message_at = Some(now);
    leads::update(conn, &lead)?;

    info!(lead_id = %lead.id, phase = %phase, "phase message sent");
    Ok(())
}

fn to_db_phase_analysis(out: &PhaseAnalysisOutput) -> PhaseAnalysis {
    PhaseAnalysis {
        outcome: out.outcome.clone(),
        next_phase: out.next_phase.clone(),
        sentiment: out.sentiment.clone(),
        buying_signals: out.buying_signals.clone(),
        signal_strength: out.signal_strength.clone(),
        suggested_angle: out.suggested_angle.clone(),
        reason: out.reason.clone(),
    }
}

fn random_nurture_delay() -> chrono::Duration {
    let days = rand::thread_rng().gen_range(NURTURE_MIN_DAYS..=NURTURE_MAX_DAYS);
    chrono::Duration::days(days)
}

/// Scans active pipeline enrollments for an inbound message newer than the
/// last one this engine has seen, analyzes it, and applies whichever of the
/// six phase-transition outcomes the analyzer returns.
pub async fn detect_pipeline_replies(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let active = enrollments::list_pipeline_active(conn)?;
    let mut transitioned = 0usize;

    for enrollment in active {
        let Some(lead) = leads::get(conn, &enrollment.lead_id)? else {
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

        let reference = enrollment
            .last_response_at
            .or(enrollment.phase_entered_at)
            .unwrap_or(enrollment.enrolled_at);
        let Some(latest) = messages
            .iter()
            .filter(|m| !m.is_sender)
            .filter_map(|m| m.timestamp.parse::<DateTime<Utc>>().ok().map(|ts| (ts, m)))
            .filter(|(ts, _)| *ts > reference)
            .max_by_key(|(ts, _)| *ts)
        else {
            continue;
        };
        let (message_ts, message) = latest;

        let Some(phase) = enrollment.current_phase else {
            continue;
        };
        let history = crate::context::format_conversation(&messages, 10, "Them");
        let sequence = sequences::get(conn, &enrollment.sequence_id)?;
        let business = sequence
            .as_ref()
            .and_then(|s| s.business_profile_id.as_deref())
            .and_then(|id| business_profiles::get(conn, id).ok().flatten());
        let sender = business.as_ref().map(sender_context).unwrap_or_default();

        let analysis = analyze_phase_response(
            lm,
            &history,
            &phase.to_string(),
            &lead_context(&lead),
            &sender,
            enrollment.messages_in_phase,
        )
        .await?;

        apply_transition(
            conn,
            factory,
            lm,
            cache,
            enrollment,
            lead,
            analysis,
            message.text.clone().unwrap_or_default(),
            message_ts,
            now,
        )
        .await?;
        transitioned += 1;
    }

    Ok(transitioned)
}

#[allow(clippy::too_many_arguments)]
async fn apply_transition(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    mut enrollment: SequenceEnrollment,
    mut lead: Lead,
    analysis: PhaseAnalysisOutput,
    message_text: String,
    message_ts: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    enrollment.last_response_at = Some(message_ts);
    enrollment.last_response_text = Some(message_text);
    enrollment.phase_analysis = Some(to_db_phase_analysis(&analysis));
    bump_sequence(conn, &enrollment.sequence_id, |seq| seq.replied_count += 1)?;

    match analysis.outcome.as_str() {
        "advance" => {
            let next_phase = analysis
                .next_phase
                .as_deref()
                .and_then(|s| s.parse::<PipelinePhase>().ok())
                .or_else(|| enrollment.current_phase.and_then(PipelinePhase::next_in_progression))
                .unwrap_or(PipelinePhase::Nurture);
            enrollment.current_phase = Some(next_phase);
            enrollment.phase_entered_at = Some(now);
            enrollment.messages_in_phase = 0;
            enrollments::update(conn, &enrollment)?;

            if let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? {
                let messaging = factory.client_for_user(conn, &user_id)?;
                let formatted = if let Some(cid) = lead.external_chat_id.clone() {
                    get_chat_messages_cached(messaging.as_ref(), cache, &cid, 20, now, false)
                        .await
                        .map(|m| crate::context::format_conversation(&m, 10, "Them"))
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                if let Err(e) = send_phase_message(
                    conn,
                    &mut enrollment,
                    &lead,
                    messaging.as_ref(),
                    cache,
                    lm,
                    now,
                    &formatted,
                    Some(&analysis.suggested_angle),
                )
                .await
                {
                    warn!(lead_id = %lead.id, error = %e, "phase-advance send failed");
                }
            }
        }
        "stay" => {
            enrollments::update(conn, &enrollment)?;
        }
        "nurture" => {
            enrollment.current_phase = Some(PipelinePhase::Nurture);
            enrollment.phase_entered_at = Some(now);
            enrollment.messages_in_phase = 0;
            enrollment.next_step_due_at = Some(now + random_nurture_delay());
            enrollments::update(conn, &enrollment)?;
        }
        "meeting" => {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(now);
            enrollment.next_step_due_at = None;
            enrollments::update(conn, &enrollment)?;

            lead.status = LeadStatus::MeetingScheduled;
            lead.active_sequence_id = None;
            leads::update(conn, &lead)?;

            bump_sequence(conn, &enrollment.sequence_id, |seq| {
                seq.meeting_count += 1;
                seq.active_count = seq.active_count.saturating_sub(1);
            })?;
        }
        "park" => {
            enrollment.status = EnrollmentStatus::Parked;
            enrollment.completed_at = Some(now);
            enrollment.next_step_due_at = None;
            enrollments::update(conn, &enrollment)?;

            lead.active_sequence_id = None;
            leads::update(conn, &lead)?;

            bump_sequence(conn, &enrollment.sequence_id, |seq| {
                seq.parked_count += 1;
                seq.active_count = seq.active_count.saturating_sub(1);
            })?;
        }
        _ => {
            // "exit" (explicit rejection) and any unrecognized outcome.
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.completed_at = Some(now);
            enrollment.next_step_due_at = None;
            enrollments::update(conn, &enrollment)?;

            lead.active_sequence_id = None;
            leads::update(conn, &lead)?;

            bump_sequence(conn, &enrollment.sequence_id, |seq| {
                seq.completed_count += 1;
                seq.active_count = seq.active_count.saturating_sub(1);
            })?;
        }
    }

    info!(lead_id = %lead.id, outcome = %analysis.outcome, "pipeline phase transition applied");
    Ok(())
}

/// The three time-based triggers that don't wait on an inbound reply
///: nurture cadence, silent-in-progression
/// reactivation, and deferred APERTURA.
pub async fn process_time_based_pipeline_transitions(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut handled = 0usize;
    handled += process_nurture_due(conn, factory, lm, cache, config, now).await?;
    handled += process_reactivation_due(conn, factory, lm, cache, config, now).await?;
    handled += process_deferred_apertura(conn, factory, lm, cache, config, now).await?;
    Ok(handled)
}

async fn process_nurture_due(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let due = enrollments::list_nurture_due(conn, now, config.scheduler.max_batch_per_tick)?;
    let mut handled = 0usize;

    for mut enrollment in due {
        let Some(mut lead) = leads::get(conn, &enrollment.lead_id)? else {
            continue;
        };

        if enrollment.nurture_count >= MAX_NURTURE_TOUCHES {
            enrollment.status = EnrollmentStatus::Parked;
            enrollment.completed_at = Some(now);
            enrollment.next_step_due_at = None;
            enrollments::update(conn, &enrollment)?;

            lead.active_sequence_id = None;
            leads::update(conn, &lead)?;

            bump_sequence(conn, &enrollment.sequence_id, |seq| {
                seq.parked_count += 1;
                seq.active_count = seq.active_count.saturating_sub(1);
            })?;
            handled += 1;
            continue;
        }

        let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
            continue;
        };
        let messaging = factory.client_for_user(conn, &user_id)?;
        let history = match lead.external_chat_id.clone() {
            Some(cid) => get_chat_messages_cached(messaging.as_ref(), cache, &cid, 20, now, false)
                .await
                .map(|m| crate::context::format_conversation(&m, 10, "Them"))
                .unwrap_or_default(),
            None => String::new(),
        };

        match send_phase_message(conn, &mut enrollment, &lead, messaging.as_ref(), cache, lm, now, &history, None).await {
            Ok(()) => {
                enrollment.nurture_count += 1;
                enrollment.next_step_due_at = Some(now + random_nurture_delay());
                enrollments::update(conn, &enrollment)?;
                handled += 1;
            }
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "nurture touch send failed, retrying next cycle");
                enrollment.next_step_due_at = Some(now + random_nurture_delay());
                enrollments::update(conn, &enrollment)?;
            }
        }
    }

    Ok(handled)
}

async fn process_reactivation_due(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let candidates = enrollments::list_in_progression(conn, config.scheduler.max_batch_per_tick)?;
    let mut handled = 0usize;

    for mut enrollment in candidates {
        let silence_ref = enrollment
            .last_response_at
            .or(enrollment.phase_entered_at)
            .unwrap_or(enrollment.enrolled_at);
        if now - silence_ref < chrono::Duration::days(REACTIVATION_SILENCE_DAYS) {
            continue;
        }

        let Some(mut lead) = leads::get(conn, &enrollment.lead_id)? else {
            continue;
        };

        if enrollment.reactivation_count >= MAX_REACTIVATION_ATTEMPTS {
            enrollment.status = EnrollmentStatus::Parked;
            enrollment.completed_at = Some(now);
            enrollment.next_step_due_at = None;
            enrollments::update(conn, &enrollment)?;

            lead.active_sequence_id = None;
            leads::update(conn, &lead)?;

            bump_sequence(conn, &enrollment.sequence_id, |seq| {
                seq.parked_count += 1;
                seq.active_count = seq.active_count.saturating_sub(1);
            })?;
            handled += 1;
            continue;
        }

        let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
            continue;
        };
        let messaging = factory.client_for_user(conn, &user_id)?;

        let prev_phase = enrollment.current_phase;
        let prev_entered_at = enrollment.phase_entered_at;
        let prev_messages_in_phase = enrollment.messages_in_phase;

        enrollment.current_phase = Some(PipelinePhase::Reactivacion);
        enrollment.phase_entered_at = Some(now);
        enrollment.messages_in_phase = 0;

        match send_phase_message(conn, &mut enrollment, &lead, messaging.as_ref(), cache, lm, now, "", None).await {
            Ok(()) => {
                enrollment.reactivation_count += 1;
                enrollments::update(conn, &enrollment)?;
                handled += 1;
            }
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "reactivation send failed, reverting phase");
                enrollment.current_phase = prev_phase;
                enrollment.phase_entered_at = prev_entered_at;
                enrollment.messages_in_phase = prev_messages_in_phase;
                enrollments::update(conn, &enrollment)?;
            }
        }
    }

    Ok(handled)
}

async fn process_deferred_apertura(
    conn: &Connection,
    factory: &dyn MessagingClientFactory,
    lm: &dyn LlmProvider,
    cache: &ResponseCache,
    config: &OutreachConfig,
    now: DateTime<Utc>,
) -> Result<usize> {
    let due = enrollments::list_deferred_apertura(conn, now, config.scheduler.max_batch_per_tick)?;
    let mut handled = 0usize;

    for mut enrollment in due {
        let Some(lead) = leads::get(conn, &enrollment.lead_id)? else {
            continue;
        };
        if !owning_user_in_working_hours(conn, &enrollment.sequence_id, config, now)? {
            enrollment.next_step_due_at = Some(now + chrono::Duration::hours(1));
            enrollments::update(conn, &enrollment)?;
            continue;
        }

        let Some(user_id) = resolve_owning_user(conn, &enrollment.sequence_id)? else {
            continue;
        };
        let messaging = factory.client_for_user(conn, &user_id)?;

        match send_phase_message(conn, &mut enrollment, &lead, messaging.as_ref(), cache, lm, now, "", None).await {
            Ok(()) => handled += 1,
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "deferred apertura send failed, retrying next cycle");
                enrollment.next_step_due_at = Some(now + chrono::Duration::hours(1));
                enrollments::update(conn, &enrollment)?;
            }
        }
    }

    Ok(handled)
}
