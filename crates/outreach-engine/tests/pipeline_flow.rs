//! Smart pipeline engine: entering APERTURA, every reply-driven phase
//! transition outcome, and the nurture/reactivation time triggers.

mod support;

use std::sync::Arc;

use chrono::Utc;
use outreach_db::repo::{enrollments, leads, sequences};
use outreach_db::types::{EnrollmentStatus, LeadStatus, PipelinePhase};
use outreach_engine::pipeline;
use outreach_messaging::ResponseCache;
use support::{
    enroll, inbound_message, new_business_profile, new_lead, new_sequence, new_user, open_db,
    FakeFactory, FakeLlm, FakeMessaging,
};

fn working_hours_now() -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339("2026-07-29T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn phase_analysis_json(outcome: &str, next_phase: Option<&str>) -> String {
    format!(
        r#"{{"outcome":"{outcome}","reason":"test","sentiment":"warm","buying_signals":[],"signal_strength":"moderate","next_phase":{},"suggested_angle":"ask about their roadmap"}}"#,
        next_phase.map(|p| format!("\"{p}\"")).unwrap_or_else(|| "null".to_string()),
    )
}

/// Builds a pipeline enrollment that has already accepted the connection
/// and is sitting in `phase` with one inbound message waiting.
fn setup_active_pipeline_enrollment(
    conn: &rusqlite::Connection,
    phase: PipelinePhase,
) -> (String, String, outreach_db::types::SequenceEnrollment) {
    let user_id = new_user(conn);
    let bp_id = new_business_profile(conn, &user_id);
    let seq_id = new_sequence(conn, &bp_id, "smart_pipeline");
    let lead_id = new_lead(conn, Some("https://www.linkedin.com/in/jordan"), Some("chat-1"));
    let mut enrollment = enroll(conn, &lead_id, &seq_id);

    enrollment.current_phase = Some(phase);
    enrollment.phase_entered_at = Some(working_hours_now() - chrono::Duration::days(1));
    enrollment.messages_in_phase = 1;
    enrollments::update(conn, &enrollment).unwrap();

    (user_id, lead_id, enrollment)
}

#[tokio::test]
async fn enter_apertura_sends_opening_message_in_working_hours() {
    let conn = open_db();
    let user_id = new_user(&conn);
    let bp_id = new_business_profile(&conn, &user_id);
    let seq_id = new_sequence(&conn, &bp_id, "smart_pipeline");
    let lead_id = new_lead(&conn, Some("https://www.linkedin.com/in/jordan"), Some("chat-1"));
    let mut enrollment = enroll(&conn, &lead_id, &seq_id);
    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();

    let messaging = FakeMessaging::new();
    let lm = FakeLlm::new(vec!["What's been the biggest challenge scaling your team this year?"]);
    let cache = ResponseCache::new();

    pipeline::enter_apertura(&conn, &mut enrollment, &lead, &messaging, &cache, &lm, &Default::default(), working_hours_now())
        .await
        .unwrap();

    assert_eq!(enrollment.current_phase, Some(PipelinePhase::Apertura));
    assert_eq!(messaging.sent_messages.lock().unwrap().len(), 1);

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.messages_in_phase, 1);
    assert_eq!(stored.total_messages_sent, 1);
}

#[tokio::test]
async fn advance_outcome_moves_to_next_phase_and_sends_next_message() {
    let conn = open_db();
    let (_, lead_id, enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Apertura);

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(
        FakeMessaging::new().with_messages(vec![inbound_message(
            "Honestly hiring has been brutal, we're scaling fast",
            "2026-07-29T10:30:00Z",
        )]),
    );
    let factory = FakeFactory(messaging.clone());
    let lm = FakeLlm::new(vec![
        &phase_analysis_json("advance", Some("calificacion")),
        "Sounds like a lot, are you actively investing in hiring tooling right now?",
    ]);
    let cache = ResponseCache::new();

    let transitioned = pipeline::detect_pipeline_replies(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();
    assert_eq!(transitioned, 1);

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.current_phase, Some(PipelinePhase::Calificacion));
    assert_eq!(stored.messages_in_phase, 1);
    assert_eq!(messaging.sent_messages.lock().unwrap().len(), 1);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert!(lead.active_sequence_id.is_some(), "still in progress, not exited");
}

#[tokio::test]
async fn meeting_outcome_completes_enrollment_and_marks_lead() {
    let conn = open_db();
    let (_, lead_id, enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Valor);
    let seq_id = enrollment.sequence_id.clone();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(
        FakeMessaging::new().with_messages(vec![inbound_message("Let's book a call this week", "2026-07-29T10:30:00Z")]),
    );
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![&phase_analysis_json("meeting", None)]);
    let cache = ResponseCache::new();

    pipeline::detect_pipeline_replies(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Completed);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::MeetingScheduled);
    assert!(lead.active_sequence_id.is_none());

    let sequence = sequences::get(&conn, &seq_id).unwrap().unwrap();
    assert_eq!(sequence.meeting_count, 1);
}

#[tokio::test]
async fn park_outcome_parks_enrollment() {
    let conn = open_db();
    let (_, lead_id, enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Calificacion);
    let seq_id = enrollment.sequence_id.clone();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(
        FakeMessaging::new().with_messages(vec![inbound_message("Not a priority for us this year", "2026-07-29T10:30:00Z")]),
    );
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![&phase_analysis_json("park", None)]);
    let cache = ResponseCache::new();

    pipeline::detect_pipeline_replies(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Parked);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert!(lead.active_sequence_id.is_none());

    let sequence = sequences::get(&conn, &seq_id).unwrap().unwrap();
    assert_eq!(sequence.parked_count, 1);
}

#[tokio::test]
async fn exit_outcome_completes_enrollment_without_a_meeting() {
    let conn = open_db();
    let (_, lead_id, enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Valor);
    let seq_id = enrollment.sequence_id.clone();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(
        FakeMessaging::new().with_messages(vec![inbound_message("Please stop contacting me", "2026-07-29T10:30:00Z")]),
    );
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![&phase_analysis_json("exit", None)]);
    let cache = ResponseCache::new();

    pipeline::detect_pipeline_replies(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Completed);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert_ne!(lead.status, LeadStatus::MeetingScheduled);

    let sequence = sequences::get(&conn, &seq_id).unwrap().unwrap();
    assert_eq!(sequence.completed_count, 1);
    assert_eq!(sequence.meeting_count, 0);
}

#[tokio::test]
async fn nurture_outcome_schedules_next_touch_in_budget_window() {
    let conn = open_db();
    let (_, _, enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Calificacion);

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(
        FakeMessaging::new().with_messages(vec![inbound_message("Maybe check back in a couple months", "2026-07-29T10:30:00Z")]),
    );
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![&phase_analysis_json("nurture", Some("nurture"))]);
    let cache = ResponseCache::new();

    pipeline::detect_pipeline_replies(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.current_phase, Some(PipelinePhase::Nurture));
    assert_eq!(stored.status, EnrollmentStatus::Active);

    let due_at = stored.next_step_due_at.expect("nurture touch scheduled");
    let delay = due_at - working_hours_now();
    assert!(delay >= chrono::Duration::days(outreach_core::config::NURTURE_MIN_DAYS));
    assert!(delay <= chrono::Duration::days(outreach_core::config::NURTURE_MAX_DAYS));
}

#[tokio::test]
async fn nurture_touch_beyond_budget_parks_instead_of_sending() {
    let conn = open_db();
    let (_, lead_id, mut enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Nurture);
    enrollment.nurture_count = outreach_core::config::MAX_NURTURE_TOUCHES;
    enrollment.next_step_due_at = Some(working_hours_now() - chrono::Duration::hours(1));
    enrollments::update(&conn, &enrollment).unwrap();
    let seq_id = enrollment.sequence_id.clone();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> = Arc::new(FakeMessaging::new());
    let factory = FakeFactory(messaging.clone());
    let lm = FakeLlm::new(vec![]);
    let cache = ResponseCache::new();

    let handled = pipeline::process_time_based_pipeline_transitions(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();
    assert_eq!(handled, 1);
    assert!(messaging.sent_messages.lock().unwrap().is_empty(), "budget exhausted, no send");

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Parked);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert!(lead.active_sequence_id.is_none());

    let sequence = sequences::get(&conn, &seq_id).unwrap().unwrap();
    assert_eq!(sequence.parked_count, 1);
}

#[tokio::test]
async fn reactivation_send_failure_reverts_phase_instead_of_stranding_enrollment() {
    let conn = open_db();
    let (_, _, mut enrollment) = setup_active_pipeline_enrollment(&conn, PipelinePhase::Valor);
    enrollment.phase_entered_at = Some(working_hours_now() - chrono::Duration::days(35));
    enrollment.messages_in_phase = 2;
    enrollments::update(&conn, &enrollment).unwrap();

    let messaging = Arc::new(FakeMessaging::new());
    messaging.set_fail_sends(true);
    let factory = FakeFactory(messaging.clone());
    let lm = FakeLlm::new(vec!["a fresh angle after the silence"]);
    let cache = ResponseCache::new();

    let handled = pipeline::process_time_based_pipeline_transitions(&conn, &factory, &lm, &cache, &Default::default(), working_hours_now())
        .await
        .unwrap();
    assert_eq!(handled, 0);

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    // Reverted, not left parked mid-phase-switch.
    assert_eq!(stored.current_phase, Some(PipelinePhase::Valor));
    assert_eq!(stored.messages_in_phase, 2);
    assert_eq!(stored.reactivation_count, 0);
}
