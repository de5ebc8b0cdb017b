//! Connection-acceptance scan: classic advances past the connection-request
//! step, pipeline enters APERTURA.

mod support;

use std::sync::Arc;

use chrono::Utc;
use outreach_db::repo::{enrollments, leads, sequences};
use outreach_db::types::{EnrollmentStatus, LeadStatus, PipelinePhase};
use outreach_engine::connections::detect_connection_changes;
use outreach_messaging::ResponseCache;
use support::{
    chat, enroll, new_business_profile, new_lead, new_sequence, new_sequence_step, new_user,
    open_db, FakeFactory, FakeLlm, FakeMessaging,
};

fn now() -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339("2026-07-29T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn classic_acceptance_advances_to_follow_up_step() {
    let conn = open_db();
    let user_id = new_user(&conn);
    let bp_id = new_business_profile(&conn, &user_id);
    let seq_id = new_sequence(&conn, &bp_id, "classic");
    new_sequence_step(&conn, &seq_id, 1, "connection_request", 0);
    new_sequence_step(&conn, &seq_id, 2, "follow_up_message", 3);

    let lead_id = new_lead(&conn, Some("https://www.linkedin.com/in/jordan"), None);
    let mut enrollment = enroll(&conn, &lead_id, &seq_id);
    enrollment.next_step_due_at = None;
    enrollments::update(&conn, &enrollment).unwrap();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> =
        Arc::new(FakeMessaging::new().with_chats(vec![chat("chat-1", "jordan")]));
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![]);
    let cache = ResponseCache::new();

    let accepted = detect_connection_changes(&conn, &factory, &lm, &cache, &Default::default(), now())
        .await
        .unwrap();
    assert_eq!(accepted, 1);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Connected);
    assert_eq!(lead.external_chat_id.as_deref(), Some("chat-1"));

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.current_step_order, 2);
    assert!(stored.next_step_due_at.is_some());
    assert_eq!(stored.status, EnrollmentStatus::Active);
}

#[tokio::test]
async fn classic_acceptance_completes_sequence_when_it_was_the_only_step() {
    let conn = open_db();
    let user_id = new_user(&conn);
    let bp_id = new_business_profile(&conn, &user_id);
    let seq_id = new_sequence(&conn, &bp_id, "classic");
    new_sequence_step(&conn, &seq_id, 1, "connection_request", 0);

    let lead_id = new_lead(&conn, Some("https://www.linkedin.com/in/jordan"), None);
    let mut enrollment = enroll(&conn, &lead_id, &seq_id);
    enrollment.next_step_due_at = None;
    enrollments::update(&conn, &enrollment).unwrap();
    let seq_id_clone = seq_id.clone();

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> =
        Arc::new(FakeMessaging::new().with_chats(vec![chat("chat-1", "jordan")]));
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![]);
    let cache = ResponseCache::new();

    detect_connection_changes(&conn, &factory, &lm, &cache, &Default::default(), now())
        .await
        .unwrap();

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Completed);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert!(lead.active_sequence_id.is_none());

    let sequence = sequences::get(&conn, &seq_id_clone).unwrap().unwrap();
    assert_eq!(sequence.completed_count, 1);
}

#[tokio::test]
async fn pipeline_acceptance_enters_apertura_and_sends_opening_message() {
    let conn = open_db();
    let user_id = new_user(&conn);
    let bp_id = new_business_profile(&conn, &user_id);
    let seq_id = new_sequence(&conn, &bp_id, "smart_pipeline");

    let lead_id = new_lead(&conn, Some("https://www.linkedin.com/in/jordan"), None);
    let enrollment = enroll(&conn, &lead_id, &seq_id);

    let messaging: Arc<dyn outreach_messaging::MessagingProvider> =
        Arc::new(FakeMessaging::new().with_chats(vec![chat("chat-1", "jordan")]));
    let factory = FakeFactory(messaging.clone());
    let lm = FakeLlm::new(vec!["Thanks for connecting, how's the quarter going so far?"]);
    let cache = ResponseCache::new();

    let accepted = detect_connection_changes(&conn, &factory, &lm, &cache, &Default::default(), now())
        .await
        .unwrap();
    assert_eq!(accepted, 1);

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.current_phase, Some(PipelinePhase::Apertura));
    assert_eq!(stored.messages_in_phase, 1);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Connected);

    let sent = messaging.sent_messages.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "chat-1");
}

#[tokio::test]
async fn no_matching_chat_leaves_enrollment_untouched() {
    let conn = open_db();
    let user_id = new_user(&conn);
    let bp_id = new_business_profile(&conn, &user_id);
    let seq_id = new_sequence(&conn, &bp_id, "classic");
    new_sequence_step(&conn, &seq_id, 1, "connection_request", 0);

    let lead_id = new_lead(&conn, Some("https://www.linkedin.com/in/jordan"), None);
    let mut enrollment = enroll(&conn, &lead_id, &seq_id);
    enrollment.next_step_due_at = None;
    enrollments::update(&conn, &enrollment).unwrap();

    // Chat list has no attendee matching "jordan".
    let messaging: Arc<dyn outreach_messaging::MessagingProvider> =
        Arc::new(FakeMessaging::new().with_chats(vec![chat("chat-9", "someone-else")]));
    let factory = FakeFactory(messaging);
    let lm = FakeLlm::new(vec![]);
    let cache = ResponseCache::new();

    let accepted = detect_connection_changes(&conn, &factory, &lm, &cache, &Default::default(), now())
        .await
        .unwrap();
    assert_eq!(accepted, 0);

    let lead = leads::get(&conn, &lead_id).unwrap().unwrap();
    assert!(lead.external_chat_id.is_none());

    let stored = enrollments::get(&conn, &enrollment.id).unwrap().unwrap();
    assert_eq!(stored.current_step_order, 1);
}
